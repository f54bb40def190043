use std::fs::File;
use std::io::Write;

use canbcm_frame::{message_size, BcmMessage, MessageWriter, MsgHead};
use tracing::info;

use crate::cmd::parse::{parse_can_id, parse_flags, parse_frame, parse_opcode, parse_timeval};
use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(args: EncodeArgs, _format: OutputFormat) -> CliResult<i32> {
    let msg = build_message(&args)?;

    match &args.out {
        Some(path) => {
            let file = File::create(path)
                .map_err(|err| io_error(&format!("failed creating {}", path.display()), err))?;
            write_message(file, &msg)?;
            info!(
                opcode = %msg.opcode(),
                can_id = %msg.head.can_id,
                bytes = message_size(msg.frames.len()),
                path = %path.display(),
                "message written"
            );
        }
        None => write_message(std::io::stdout().lock(), &msg)?,
    }
    Ok(SUCCESS)
}

fn build_message(args: &EncodeArgs) -> CliResult<BcmMessage> {
    let mut head = MsgHead::new(parse_opcode(&args.opcode)?, parse_can_id(&args.can_id)?);
    head.flags = parse_flags(&args.flags)?;
    head.count = args.count;
    head.ival1 = parse_timeval(&args.ival1)?;
    head.ival2 = parse_timeval(&args.ival2)?;

    let frames = args
        .frames
        .iter()
        .map(|frame| parse_frame(frame))
        .collect::<CliResult<Vec<_>>>()?;
    Ok(BcmMessage::new(head, frames))
}

fn write_message<W: Write>(out: W, msg: &BcmMessage) -> CliResult<()> {
    MessageWriter::new(out)
        .write_message(msg)
        .map_err(|err| frame_error("write failed", err))
}

#[cfg(test)]
mod tests {
    use canbcm_frame::{decode_message_slice, Flags, Opcode, Timeval, DEFAULT_MAX_FRAMES};
    use canbcm_transport::CanId;

    use super::*;

    fn args() -> EncodeArgs {
        EncodeArgs {
            opcode: "tx_setup".to_string(),
            can_id: "123".to_string(),
            flags: vec!["SET_TIMER".to_string(), "START_TIMER".to_string()],
            count: 5,
            ival1: "10ms".to_string(),
            ival2: "1s".to_string(),
            frames: vec!["123#0102".to_string(), "123#0304".to_string()],
            out: None,
        }
    }

    #[test]
    fn builds_header_and_frames() {
        let msg = build_message(&args()).unwrap();
        assert_eq!(msg.opcode(), Opcode::TxSetup);
        assert_eq!(msg.head.can_id, CanId(0x123));
        assert_eq!(msg.head.flags, Flags::SET_TIMER | Flags::START_TIMER);
        assert_eq!(msg.head.count, 5);
        assert_eq!(msg.head.ival1, Timeval::from_millis(10));
        assert_eq!(msg.head.ival2, Timeval { sec: 1, usec: 0 });
        assert_eq!(msg.head.nframes, 2);
    }

    #[test]
    fn written_bytes_decode_back() {
        let msg = build_message(&args()).unwrap();
        let mut out = Vec::new();
        write_message(&mut out, &msg).unwrap();
        assert_eq!(out.len(), message_size(2));
        assert_eq!(decode_message_slice(&out, DEFAULT_MAX_FRAMES).unwrap(), msg);
    }

    #[test]
    fn bad_frame_is_a_usage_error() {
        let mut bad = args();
        bad.frames = vec!["nonsense".to_string()];
        assert_eq!(build_message(&bad).unwrap_err().code, crate::exit::USAGE);
    }
}
