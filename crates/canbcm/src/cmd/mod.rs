use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod parse;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a control message and write its binary form.
    Encode(EncodeArgs),
    /// Read binary control messages and print them.
    Decode(DecodeArgs),
    /// Run a cyclic sender and a change-detecting receiver on a virtual bus.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Opcode name, e.g. TX_SETUP or rx_delete.
    #[arg(long, short = 'o')]
    pub opcode: String,
    /// CAN identifier in hex (eight digits or above 7FF for extended).
    #[arg(long, short = 'i')]
    pub can_id: String,
    /// Header flags by name (comma-separated or repeated).
    #[arg(long = "flag", short = 'f', value_delimiter = ',')]
    pub flags: Vec<String>,
    /// Phase-1 count.
    #[arg(long, default_value = "0")]
    pub count: u32,
    /// Interval 1 (e.g. 10ms, 1s).
    #[arg(long, default_value = "0")]
    pub ival1: String,
    /// Interval 2 (e.g. 100ms).
    #[arg(long, default_value = "0")]
    pub ival2: String,
    /// Frame in ID#DATA notation (repeatable).
    #[arg(long = "frame")]
    pub frames: Vec<String>,
    /// Write to this file instead of stdout.
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Input file, or `-` for stdin.
    #[arg(default_value = "-")]
    pub input: String,
    /// Maximum frames accepted per message.
    #[arg(long, env = "CANBCM_MAX_FRAMES", default_value_t = canbcm_frame::DEFAULT_MAX_FRAMES)]
    pub max_frames: u32,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Identifier of the cyclic transmission and the receive filter.
    #[arg(long, short = 'i', default_value = "123")]
    pub can_id: String,
    /// Payloads in hex, sent in turn (comma-separated).
    #[arg(long, value_delimiter = ',', default_value = "0011223344556677")]
    pub data: Vec<String>,
    /// Transmissions at interval 1 before switching to interval 2.
    #[arg(long, default_value = "0")]
    pub count: u32,
    /// Phase-1 transmit interval.
    #[arg(long, default_value = "0")]
    pub ival1: String,
    /// Steady transmit interval; 0 stops after the count.
    #[arg(long, default_value = "100ms")]
    pub ival2: String,
    /// Relevant-bits mask in hex. Without it every frame is reported.
    #[arg(long)]
    pub mask: Option<String>,
    /// Report RX_TIMEOUT after this much silence.
    #[arg(long)]
    pub timeout: Option<String>,
    /// Minimum spacing between RX_CHANGED notifications.
    #[arg(long)]
    pub throttle: Option<String>,
    /// How long to run.
    #[arg(long, default_value = "1s")]
    pub duration: String,
    /// Scheduler ticks per second.
    #[arg(long, env = "CANBCM_TICK_HZ", default_value_t = canbcm_manager::DEFAULT_TICK_HZ)]
    pub tick_hz: u32,
    /// Notification queue depth per socket.
    #[arg(long, env = "CANBCM_QUEUE_DEPTH", default_value_t = canbcm_manager::DEFAULT_NOTIFY_QUEUE_DEPTH)]
    pub queue_depth: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
