// TimerBlink - Overflow-Driven Blinker
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .to_path_buf()
}

fn temp_dir(prefix: &str) -> PathBuf {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir()
        .join("timerblink-tests")
        .join(format!("{}-{}", prefix, nonce));
    std::fs::create_dir_all(&dir).expect("Failed to create temp dir");
    dir
}

fn timerblink() -> Command {
    Command::new(env!("CARGO_BIN_EXE_timerblink"))
}

fn read_json(path: PathBuf) -> serde_json::Value {
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read {:?}: {}", path, e));
    serde_json::from_str(&text).expect("Invalid JSON")
}

#[test]
fn test_run_json_summary() {
    let output = timerblink()
        .args(["run", "--overflows", "400", "--json"])
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout
        .lines()
        .rfind(|l| l.starts_with('{'))
        .unwrap_or_else(|| panic!("No JSON summary in output: {}", stdout));
    let json: serde_json::Value = serde_json::from_str(line).unwrap();

    assert_eq!(json["stop_reason"], "max_overflows");
    assert_eq!(json["serviced_overflows"], 400);
    assert_eq!(json["cycles"], 400 * 65_536);
    assert_eq!(json["toggles"].as_array().unwrap().len(), 10);
    assert_eq!(json["toggles"][0]["cycle"], 40 * 65_536);
    assert_eq!(json["toggles"][0]["level"], "high");
}

#[test]
fn test_run_writes_vcd_and_snapshot() {
    let dir = temp_dir("run");
    let vcd = dir.join("blink.vcd");
    let snapshot = dir.join("snapshot.json");

    let output = timerblink()
        .args([
            "run",
            "--board",
            repo_root().join("configs/arduino-uno.yaml").to_str().unwrap(),
            "--duration-ms",
            "500",
            "--vcd",
            vcd.to_str().unwrap(),
            "--snapshot",
            snapshot.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());

    let content = std::fs::read_to_string(&vcd).expect("VCD file was not generated");
    assert!(content.contains("$timescale"), "VCD header missing");
    assert!(content.contains("PB5"), "indicator wire missing");

    let snap = read_json(snapshot);
    assert_eq!(snap["name"], "arduino-uno");
    assert_eq!(snap["cycles"], 8_000_000);
    assert_eq!(snap["interrupts_enabled"], true);
    assert!(snap["peripherals"]["timer0"].is_object());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_vcd_respects_size_cap() {
    let dir = temp_dir("vcd-cap");
    let vcd = dir.join("capped.vcd");

    let output = timerblink()
        .args([
            "run",
            "--overflows",
            "4000",
            "--vcd",
            vcd.to_str().unwrap(),
            "--max-vcd-size",
            "1KB",
        ])
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());
    let len = std::fs::metadata(&vcd).unwrap().len();
    assert!(len <= 1000, "VCD is {} bytes", len);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_script_passes_and_writes_result() {
    let dir = temp_dir("pass");
    let script = repo_root().join("configs/scripts/blink-3600-overflows.yaml");

    let output = timerblink()
        .args([
            "test",
            "--script",
            script.to_str().unwrap(),
            "--output-dir",
            dir.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute command");
    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let result = read_json(dir.join("result.json"));
    assert_eq!(result["status"], "pass");
    assert_eq!(result["serviced_overflows"], 3600);
    assert_eq!(result["toggles"], 90);
    assert_eq!(result["stop_reason"], "max_overflows");
    assert_eq!(
        result["stop_reason_details"]["triggered_limit"]["name"],
        "max_overflows"
    );
    assert_eq!(result["board_hash"].as_str().unwrap().len(), 64);
    assert!(dir.join("snapshot.json").exists());
    assert!(dir.join("trace.vcd").exists());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_duration_script() {
    let script = repo_root().join("configs/scripts/blink-one-second.yaml");
    let status = timerblink()
        .args(["test", "--script", script.to_str().unwrap()])
        .status()
        .expect("Failed to execute command");
    assert_eq!(status.code(), Some(0));
}

#[test]
fn test_failed_assertion_exit_code() {
    let dir = temp_dir("fail");
    let script = repo_root().join("configs/scripts/blink-expect-fail.yaml");

    let output = timerblink()
        .args([
            "test",
            "--script",
            script.to_str().unwrap(),
            "--output-dir",
            dir.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute command");
    assert_eq!(output.status.code(), Some(1));

    let result = read_json(dir.join("result.json"));
    assert_eq!(result["status"], "fail");
    assert_eq!(result["assertions"][0]["passed"], false);
    assert_eq!(result["assertions"][0]["observed"], "high");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_config_error_exit_code() {
    let dir = temp_dir("config-error");
    let script = dir.join("bad.yaml");
    std::fs::write(&script, "schema_version: \"1.0\"\nlimits: {}\n").unwrap();
    let out_dir = dir.join("artifacts");

    let output = timerblink()
        .args([
            "test",
            "--script",
            script.to_str().unwrap(),
            "--output-dir",
            out_dir.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute command");
    assert_eq!(output.status.code(), Some(2));

    let result = read_json(out_dir.join("result.json"));
    assert_eq!(result["status"], "error");
    assert_eq!(result["stop_reason"], "config_error");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_missing_board_is_config_error() {
    let dir = temp_dir("missing-board");
    let script = dir.join("script.yaml");
    std::fs::write(
        &script,
        "schema_version: \"1.0\"\ninputs:\n  board: \"nope.yaml\"\nlimits:\n  max_overflows: 1\n",
    )
    .unwrap();

    let status = timerblink()
        .args(["test", "--script", script.to_str().unwrap()])
        .status()
        .expect("Failed to execute command");
    assert_eq!(status.code(), Some(2));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_timing_table() {
    let output = timerblink()
        .args(["timing", "--clock", "16MHz"])
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let firmware_row = stdout
        .lines()
        .find(|l| l.contains("<- firmware"))
        .expect("firmware row missing");
    assert!(firmware_row.contains("256"));
    assert!(firmware_row.contains("163.840"));
    assert!(firmware_row.contains("327.680"));
    assert_eq!(stdout.lines().count(), 6);
}

#[test]
fn test_timing_rejects_bad_clock() {
    let status = timerblink()
        .args(["timing", "--clock", "fast"])
        .status()
        .expect("Failed to execute command");
    assert_eq!(status.code(), Some(2));
}
