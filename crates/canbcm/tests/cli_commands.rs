#![cfg(feature = "cli")]

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

fn canbcm() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_canbcm"));
    cmd.arg("--log-level").arg("error");
    cmd
}

fn unique_temp_file(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "canbcm-{tag}-{}-{}.bin",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ))
}

fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("every line should be json"))
        .collect()
}

fn opcodes(lines: &[serde_json::Value]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.get("opcode").and_then(|v| v.as_str()))
        .map(str::to_string)
        .collect()
}

#[test]
fn version_prints_package_version() {
    let output = canbcm().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("canbcm {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn encode_to_file_then_decode() {
    let path = unique_temp_file("encode");
    let status = canbcm()
        .args(["encode", "--opcode", "tx_setup", "--can-id", "123"])
        .args(["--flag", "SET_TIMER,START_TIMER", "--ival2", "100ms"])
        .args(["--frame", "123#DEADBEEF", "--frame", "123#R"])
        .arg("--out")
        .arg(&path)
        .status()
        .expect("encode should run");
    assert!(status.success());
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 44 + 2 * 16);

    let output = canbcm()
        .args(["--format", "json", "decode"])
        .arg(&path)
        .output()
        .expect("decode should run");
    assert!(output.status.success());

    let lines = json_lines(&output);
    assert_eq!(lines.len(), 1);
    let msg = &lines[0];
    assert_eq!(msg["opcode"], "TX_SETUP");
    assert_eq!(msg["can_id"], "123");
    assert_eq!(msg["flags"], "SET_TIMER|START_TIMER");
    assert_eq!(msg["ival2_us"], 100_000);
    assert_eq!(msg["frames"][0]["data"], "DEADBEEF");
    assert_eq!(msg["frames"][1]["can_id"], "123#R");

    let _ = std::fs::remove_file(&path);
}

#[test]
fn decode_reads_concatenated_messages_from_stdin() {
    let mut bytes = Vec::new();
    for opcode in ["rx_setup", "rx_delete"] {
        let output = canbcm()
            .args(["encode", "--opcode", opcode, "--can-id", "1ABCDEF0"])
            .output()
            .expect("encode should run");
        assert!(output.status.success());
        bytes.extend_from_slice(&output.stdout);
    }

    let mut child = canbcm()
        .args(["--format", "json", "decode", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("decode should start");
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(&bytes)
        .expect("stdin should accept input");
    let output = child.wait_with_output().expect("decode should finish");

    assert!(output.status.success());
    let lines = json_lines(&output);
    assert_eq!(opcodes(&lines), vec!["RX_SETUP", "RX_DELETE"]);
    assert_eq!(lines[0]["can_id"], "1ABCDEF0");
}

#[test]
fn decode_truncated_input_is_invalid_data() {
    let path = unique_temp_file("truncated");
    std::fs::write(&path, [1u8, 0, 0, 0, 0, 0]).unwrap();

    let output = canbcm()
        .arg("decode")
        .arg(&path)
        .output()
        .expect("decode should run");
    assert_eq!(output.status.code(), Some(60));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn encode_rejects_unknown_opcode() {
    let output = canbcm()
        .args(["encode", "--opcode", "tx_launch", "--can-id", "1"])
        .output()
        .expect("encode should run");
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown opcode"));
}

#[test]
fn simulate_reports_every_cycle_without_mask() {
    let output = canbcm()
        .args(["--format", "json", "simulate"])
        .args(["--data", "01,02", "--ival2", "20ms", "--duration", "300ms"])
        .output()
        .expect("simulate should run");
    assert!(output.status.success());

    let lines = json_lines(&output);
    let changed = lines
        .iter()
        .filter(|line| line["opcode"] == "RX_CHANGED")
        .count();
    assert!(changed >= 5, "expected several notifications, got {changed}");

    let reports: Vec<&serde_json::Value> =
        lines.iter().filter(|line| line.get("report").is_some()).collect();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["source"], "tx");
    assert_eq!(reports[0]["report"]["tx_ops"][0]["can_id"], "123");
    assert_eq!(reports[1]["source"], "rx");
}

#[test]
fn simulate_count_expiry_and_timeout() {
    let output = canbcm()
        .args(["--format", "json", "simulate"])
        .args(["--count", "2", "--ival1", "10ms", "--ival2", "0"])
        .args(["--mask", "FF", "--timeout", "100ms", "--duration", "400ms"])
        .output()
        .expect("simulate should run");
    assert!(output.status.success());

    let ops = opcodes(&json_lines(&output));
    assert!(ops.contains(&"TX_EXPIRED".to_string()), "{ops:?}");
    assert!(ops.contains(&"RX_TIMEOUT".to_string()), "{ops:?}");
    // Constant payload under a mask changes only once.
    assert_eq!(ops.iter().filter(|op| *op == "RX_CHANGED").count(), 1);
}

#[test]
fn simulate_rejects_zero_tick_rate() {
    let output = canbcm()
        .args(["simulate", "--tick-hz", "0"])
        .output()
        .expect("simulate should run");
    assert_eq!(output.status.code(), Some(64));
}
