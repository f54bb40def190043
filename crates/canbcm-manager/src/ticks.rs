//! Conversion between wall-clock durations and scheduler ticks.
//!
//! A tick count of zero means "timer disabled" and is never produced for a
//! non-zero duration.

use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Ticks needed for at least `duration` to elapse, saturating at `u64::MAX`.
pub fn duration_to_ticks(duration: Duration, tick_hz: u32) -> u64 {
    if duration.is_zero() {
        return 0;
    }
    let scaled = duration.as_nanos() * u128::from(tick_hz);
    let ticks = scaled.div_ceil(NANOS_PER_SEC);
    u64::try_from(ticks).unwrap_or(u64::MAX)
}

/// Elapsed time at which tick `ticks` begins, or `None` if it is not
/// representable as a `Duration`.
pub fn ticks_to_duration(ticks: u64, tick_hz: u32) -> Option<Duration> {
    if tick_hz == 0 {
        return None;
    }
    let nanos = (u128::from(ticks) * NANOS_PER_SEC).div_ceil(u128::from(tick_hz));
    let secs = u64::try_from(nanos / NANOS_PER_SEC).ok()?;
    // Remainder is below one second.
    let subsec = (nanos % NANOS_PER_SEC) as u32;
    Some(Duration::new(secs, subsec))
}

/// Whole ticks contained in `elapsed` (the current tick of a clock started
/// `elapsed` ago).
pub fn elapsed_ticks(elapsed: Duration, tick_hz: u32) -> u64 {
    let ticks = elapsed.as_nanos() * u128::from(tick_hz) / NANOS_PER_SEC;
    u64::try_from(ticks).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_disabled() {
        assert_eq!(duration_to_ticks(Duration::ZERO, 1000), 0);
    }

    #[test]
    fn rounds_up() {
        assert_eq!(duration_to_ticks(Duration::from_nanos(1), 1000), 1);
        assert_eq!(duration_to_ticks(Duration::from_micros(1500), 1000), 2);
        assert_eq!(duration_to_ticks(Duration::from_millis(10), 1000), 10);
        assert_eq!(duration_to_ticks(Duration::from_millis(10), 100), 1);
        assert_eq!(duration_to_ticks(Duration::from_millis(11), 100), 2);
    }

    #[test]
    fn saturates_instead_of_wrapping() {
        assert_eq!(duration_to_ticks(Duration::MAX, u32::MAX), u64::MAX);
        assert_eq!(elapsed_ticks(Duration::MAX, u32::MAX), u64::MAX);
    }

    #[test]
    fn tick_start_times() {
        assert_eq!(ticks_to_duration(0, 1000), Some(Duration::ZERO));
        assert_eq!(ticks_to_duration(50, 1000), Some(Duration::from_millis(50)));
        assert_eq!(ticks_to_duration(1, 3), Some(Duration::from_nanos(333_333_334)));
        assert_eq!(ticks_to_duration(1, 0), None);
        assert_eq!(
            ticks_to_duration(u64::MAX, 1),
            Some(Duration::from_secs(u64::MAX))
        );
    }

    #[test]
    fn deadline_is_reached_by_clock() {
        for hz in [1, 3, 100, 1000, 44_100] {
            for ticks in [1u64, 7, 999, 123_456] {
                let at = ticks_to_duration(ticks, hz).unwrap();
                assert!(elapsed_ticks(at, hz) >= ticks, "hz={hz} ticks={ticks}");
            }
        }
    }
}
