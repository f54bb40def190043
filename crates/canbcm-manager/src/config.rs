use canbcm_frame::DEFAULT_MAX_FRAMES;

use crate::error::{BcmError, Result};

/// Default scheduler resolution in ticks per second.
pub const DEFAULT_TICK_HZ: u32 = 1000;
/// Default depth of the owner notification queue.
pub const DEFAULT_NOTIFY_QUEUE_DEPTH: usize = 256;
/// Default depth of the transport-to-driver queue.
pub const DEFAULT_INBOUND_QUEUE_DEPTH: usize = 1024;

/// Per-channel configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BcmConfig {
    /// Scheduler ticks per second. Intervals are rounded up to whole ticks.
    pub tick_hz: u32,
    /// Capacity of the notification queue read by the owner. Notifications
    /// that do not fit are dropped and counted.
    pub notify_queue_depth: usize,
    /// Capacity of the queue between transport callbacks and the channel.
    /// Frames that do not fit are dropped and counted as overruns.
    pub inbound_queue_depth: usize,
    /// Maximum frames accepted in one control message.
    pub max_frames: u32,
}

impl Default for BcmConfig {
    fn default() -> Self {
        Self {
            tick_hz: DEFAULT_TICK_HZ,
            notify_queue_depth: DEFAULT_NOTIFY_QUEUE_DEPTH,
            inbound_queue_depth: DEFAULT_INBOUND_QUEUE_DEPTH,
            max_frames: DEFAULT_MAX_FRAMES,
        }
    }
}

impl BcmConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_hz == 0 {
            return Err(BcmError::InvalidConfig("tick_hz must be positive"));
        }
        if self.notify_queue_depth == 0 {
            return Err(BcmError::InvalidConfig("notify_queue_depth must be positive"));
        }
        if self.inbound_queue_depth == 0 {
            return Err(BcmError::InvalidConfig(
                "inbound_queue_depth must be positive",
            ));
        }
        if self.max_frames == 0 {
            return Err(BcmError::InvalidConfig("max_frames must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = BcmConfig::default();
        assert_eq!(cfg.tick_hz, 1000);
        assert_eq!(cfg.notify_queue_depth, 256);
        assert_eq!(cfg.inbound_queue_depth, 1024);
        assert_eq!(cfg.max_frames, 256);
        cfg.validate().unwrap();
    }

    #[test]
    fn zero_values_rejected() {
        let cfg = BcmConfig {
            tick_hz: 0,
            ..BcmConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(BcmError::InvalidConfig(_))));

        let cfg = BcmConfig {
            notify_queue_depth: 0,
            ..BcmConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
