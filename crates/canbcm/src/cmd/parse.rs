//! Text forms accepted on the command line.
//!
//! Identifiers and payloads are hexadecimal as in the usual CAN tooling:
//! `123` is a standard identifier, eight digits (or anything above `7FF`)
//! an extended one, and a frame is written `ID#DATA` or `ID#R` for a remote
//! request.

use std::time::Duration;

use canbcm_frame::{Flags, Opcode, Timeval};
use canbcm_transport::{CanFrame, CanId, CAN_EFF_FLAG, CAN_EFF_MASK, CAN_RTR_FLAG, CAN_SFF_MASK};

use crate::exit::{CliError, CliResult};

pub fn parse_can_id(input: &str) -> CliResult<CanId> {
    let input = input.trim();
    let digits = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);
    if digits.is_empty() || digits.len() > 8 {
        return Err(CliError::usage(format!("invalid CAN identifier: {input}")));
    }
    let raw = u32::from_str_radix(digits, 16)
        .map_err(|_| CliError::usage(format!("invalid CAN identifier: {input}")))?;
    if raw > CAN_EFF_MASK {
        return Err(CliError::usage(format!(
            "CAN identifier out of range: {input}"
        )));
    }
    if digits.len() == 8 || raw > CAN_SFF_MASK {
        Ok(CanId(raw | CAN_EFF_FLAG))
    } else {
        Ok(CanId(raw))
    }
}

pub fn parse_data(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input.chars().filter(|c| *c != '.' && *c != ' ').collect();
    if !digits.is_ascii() {
        return Err(CliError::usage(format!("invalid hex payload: {input}")));
    }
    if digits.len() % 2 != 0 {
        return Err(CliError::usage(format!(
            "payload needs an even number of hex digits: {input}"
        )));
    }
    let bytes = (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16))
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|_| CliError::usage(format!("invalid hex payload: {input}")))?;
    if bytes.len() > canbcm_transport::CAN_MAX_DLEN {
        return Err(CliError::usage(format!(
            "payload longer than 8 bytes: {input}"
        )));
    }
    Ok(bytes)
}

pub fn parse_frame(input: &str) -> CliResult<CanFrame> {
    let (id, data) = input
        .split_once('#')
        .ok_or_else(|| CliError::usage(format!("frame must be ID#DATA: {input}")))?;
    let mut id = parse_can_id(id)?;
    let payload = if data.eq_ignore_ascii_case("r") {
        id = CanId(id.raw() | CAN_RTR_FLAG);
        Vec::new()
    } else {
        parse_data(data)?
    };
    CanFrame::new(id, &payload).map_err(|err| CliError::usage(format!("{input}: {err}")))
}

pub fn parse_opcode(input: &str) -> CliResult<Opcode> {
    Opcode::from_name(input.trim())
        .ok_or_else(|| CliError::usage(format!("unknown opcode: {input}")))
}

pub fn parse_flags(names: &[String]) -> CliResult<Flags> {
    names.iter().try_fold(Flags::empty(), |acc, name| {
        Flags::from_name(name.trim())
            .map(|flag| acc | flag)
            .ok_or_else(|| CliError::usage(format!("unknown flag: {name}")))
    })
}

/// Durations such as `250ms`, `2s` or `1500us`. A bare number is seconds.
/// Zero is accepted and means "disabled".
pub fn parse_interval(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("us") {
        (num, "us")
    } else if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    Ok(match unit {
        "us" => Duration::from_micros(value),
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}

pub fn parse_timeval(input: &str) -> CliResult<Timeval> {
    parse_interval(input).map(Timeval::from_duration)
}

/// Like [`parse_interval`] but rejects zero.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let duration = parse_interval(input)?;
    if duration.is_zero() {
        return Err(CliError::usage("duration must be greater than zero"));
    }
    Ok(duration)
}
