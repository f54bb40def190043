use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use canbcm_frame::{BcmMessage, Timeval};
use canbcm_manager::{ChannelReport, Delivery, Fault};
use canbcm_transport::{CanFrame, IfIndex};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput {
    can_id: String,
    len: u8,
    data: String,
}

impl FrameOutput {
    fn new(frame: &CanFrame) -> Self {
        Self {
            can_id: frame.id.to_string(),
            len: frame.len(),
            data: hex(frame.payload()),
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    opcode: &'static str,
    flags: String,
    count: u32,
    ival1_us: u64,
    ival2_us: u64,
    can_id: String,
    frames: Vec<FrameOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ifindex: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp_us: Option<u64>,
}

#[derive(Serialize)]
struct FaultOutput<'a> {
    source: &'a str,
    fault: &'static str,
    ifindex: u32,
}

#[derive(Serialize)]
struct ReportOutput<'a> {
    source: &'a str,
    report: &'a ChannelReport,
}

/// Print a decoded control message.
pub fn print_message(msg: &BcmMessage, format: OutputFormat) {
    print_message_from(msg, None, None, None, format);
}

/// Print something a socket delivered; `source` names the socket.
pub fn print_delivery(delivery: &Delivery, source: &str, format: OutputFormat) {
    match delivery {
        Delivery::Message(note) => print_message_from(
            &note.message,
            Some(source),
            Some(note.ifindex),
            note.timestamp.map(unix_micros),
            format,
        ),
        Delivery::Fault(fault) => {
            let (name, ifindex) = match fault {
                Fault::InterfaceDown(ifindex) => ("interface-down", *ifindex),
                Fault::InterfaceRemoved(ifindex) => ("interface-removed", *ifindex),
            };
            match format {
                OutputFormat::Json => print_json(&FaultOutput {
                    source,
                    fault: name,
                    ifindex: ifindex.0,
                }),
                OutputFormat::Table | OutputFormat::Pretty => {
                    println!("[{source}] fault {name} on {ifindex}");
                }
            }
        }
    }
}

fn print_message_from(
    msg: &BcmMessage,
    source: Option<&str>,
    ifindex: Option<IfIndex>,
    timestamp_us: Option<u64>,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let head = &msg.head;
            print_json(&MessageOutput {
                source,
                opcode: head.opcode.name(),
                flags: head.flags.to_string(),
                count: head.count,
                ival1_us: micros(head.ival1),
                ival2_us: micros(head.ival2),
                can_id: head.can_id.to_string(),
                frames: msg.frames.iter().map(FrameOutput::new).collect(),
                ifindex: ifindex.map(|i| i.0),
                timestamp_us,
            });
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SOURCE", "OPCODE", "ID", "FLAGS", "COUNT", "IVAL1", "IVAL2", "FRAMES"])
                .add_row(vec![
                    source.unwrap_or("-").to_string(),
                    msg.head.opcode.to_string(),
                    msg.head.can_id.to_string(),
                    msg.head.flags.to_string(),
                    msg.head.count.to_string(),
                    msg.head.ival1.to_string(),
                    msg.head.ival2.to_string(),
                    msg.frames
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("\n"),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let prefix = source.map(|s| format!("[{s}] ")).unwrap_or_default();
            match ifindex {
                Some(ifindex) => println!("{prefix}{msg} on {ifindex}"),
                None => println!("{prefix}{msg}"),
            }
            for frame in &msg.frames {
                println!("    {frame}");
            }
        }
    }
}

/// Print the status report of a socket.
pub fn print_report(report: &ChannelReport, source: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ReportOutput { source, report }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SOURCE", "DIR", "ID", "IF", "FRAMES", "TICKS", "ACTIVITY"]);
            for op in &report.tx_ops {
                table.add_row(vec![
                    source.to_string(),
                    "tx".to_string(),
                    op.can_id.clone(),
                    IfIndex(op.ifindex).to_string(),
                    op.frames.to_string(),
                    format!("t1={} t2={}", op.interval1_ticks, op.interval2_ticks),
                    format!("sent {}", op.sent),
                ]);
            }
            for op in &report.rx_ops {
                table.add_row(vec![
                    source.to_string(),
                    "rx".to_string(),
                    op.can_id.clone(),
                    IfIndex(op.ifindex).to_string(),
                    op.frames.to_string(),
                    format!("timeo={} thr={}", op.timeout_ticks, op.throttle_ticks),
                    format!(
                        "recv {} ({}) reduction {}%",
                        op.notified, op.received, op.reduction
                    ),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("[{source}]");
            print!("{report}");
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

fn micros(tv: Timeval) -> u64 {
    u64::try_from(tv.to_duration().as_micros()).unwrap_or(u64::MAX)
}

fn unix_micros(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_is_upper_case_without_separators() {
        assert_eq!(hex(&[0x0A, 0xFF, 0x00]), "0AFF00");
        assert_eq!(hex(&[]), "");
    }

    #[test]
    fn frame_output_fields() {
        let frame = CanFrame::new(0x123, &[1, 2]).unwrap();
        let out = serde_json::to_value(FrameOutput::new(&frame)).unwrap();
        assert_eq!(out["can_id"], "123");
        assert_eq!(out["len"], 2);
        assert_eq!(out["data"], "0102");
    }

    #[test]
    fn interval_in_microseconds() {
        assert_eq!(micros(Timeval { sec: 1, usec: 5 }), 1_000_005);
    }
}
