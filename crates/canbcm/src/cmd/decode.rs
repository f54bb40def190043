use std::fs::File;
use std::io::{self, Read};

use canbcm_frame::{CodecConfig, MessageReader};
use tracing::debug;

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let input: Box<dyn Read> = if args.input == "-" {
        Box::new(io::stdin().lock())
    } else {
        let file = File::open(&args.input)
            .map_err(|err| io_error(&format!("failed opening {}", args.input), err))?;
        Box::new(file)
    };

    let config = CodecConfig {
        max_frames: args.max_frames,
    };
    let mut reader = MessageReader::with_config(input, config);
    let mut decoded = 0usize;

    // Stop at the first bad message; the stream cannot be resynchronised.
    while let Some(msg) = reader
        .next_message()
        .map_err(|err| frame_error(&format!("message {} invalid", decoded + 1), err))?
    {
        print_message(&msg, format);
        decoded += 1;
    }

    debug!(messages = decoded, "input decoded");
    Ok(SUCCESS)
}
