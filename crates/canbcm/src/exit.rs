use std::fmt;
use std::io;

use canbcm_frame::FrameError;
use canbcm_manager::BcmError;
use canbcm_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::PayloadTooLong(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::UnknownOpcode(_)
        | FrameError::InvalidFrameLength(_)
        | FrameError::InvalidTimeval { .. }
        | FrameError::TooManyFrames { .. }
        | FrameError::ConnectionClosed => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}

pub fn bcm_error(context: &str, err: BcmError) -> CliError {
    match err {
        BcmError::Protocol(err) => frame_error(context, err),
        BcmError::Transport(err) => transport_error(context, err),
        BcmError::InvalidMessage(_) | BcmError::Capacity { .. } | BcmError::InvalidConfig(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        BcmError::NotFound { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_input_is_invalid_data() {
        let err = frame_error("decode failed", FrameError::ConnectionClosed);
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.starts_with("decode failed: "));
    }

    #[test]
    fn manager_errors_unwrap_their_source() {
        let err = bcm_error(
            "setup failed",
            BcmError::Protocol(FrameError::UnknownOpcode(99)),
        );
        assert_eq!(err.code, DATA_INVALID);

        let err = bcm_error("setup failed", BcmError::InvalidConfig("tick_hz must be positive"));
        assert_eq!(err.code, USAGE);

        let err = bcm_error(
            "connect failed",
            BcmError::Transport(TransportError::Shutdown),
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
    }

    #[test]
    fn permission_denied_maps_to_its_code() {
        let err = io_error(
            "open failed",
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        );
        assert_eq!(err.code, PERMISSION_DENIED);
    }
}
