//! CLI integration tests.
//!
//! These drive the stemsplit binary end-to-end on small generated
//! sessions, plus the usual argument-parsing smoke tests.

use std::path::Path;
use std::process::Command;

fn stemsplit_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_stemsplit"))
}

fn write_session_wav(path: &Path, channels: u16, frames: usize) {
    let spec = hound::WavSpec {
        channels,
        sample_rate: 48_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for frame in 0..frames {
        for ch in 0..channels {
            writer
                .write_sample((frame as i32 % 2_000 + ch as i32) as i16)
                .unwrap();
        }
    }
    writer.finalize().unwrap();
}

#[test]
fn test_version() {
    let output = stemsplit_bin()
        .arg("--version")
        .output()
        .expect("Failed to run stemsplit");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("1.2"),
        "Version output should contain 1.2, got: {}",
        stdout
    );
}

#[test]
fn test_help() {
    let output = stemsplit_bin()
        .arg("--help")
        .output()
        .expect("Failed to run stemsplit");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("stemsplit"), "Should contain binary name");
    assert!(stdout.contains("run"));
    assert!(stdout.contains("inspect"));
    assert!(stdout.contains("sections"));
}

#[test]
fn test_run_help() {
    let output = stemsplit_bin()
        .args(["run", "--help"])
        .output()
        .expect("Failed to run stemsplit");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--config"));
    assert!(stdout.contains("--bit-depth"));
    assert!(stdout.contains("--keep-temp"));
    assert!(stdout.contains("--session-json"));
}

#[test]
fn test_sections_help() {
    let output = stemsplit_bin()
        .args(["sections", "--help"])
        .output()
        .expect("Failed to run stemsplit");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--gap-threshold"));
    assert!(stdout.contains("--min-section-length"));
    assert!(stdout.contains("--bpm-threshold"));
}

#[test]
fn test_run_without_input_dir_fails() {
    let output = stemsplit_bin()
        .arg("run")
        .output()
        .expect("Failed to run stemsplit");
    assert!(!output.status.success(), "Should fail without an input dir");
}

#[test]
fn test_run_empty_dir_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = stemsplit_bin()
        .args(["run", dir.path().to_str().unwrap()])
        .output()
        .expect("Failed to run stemsplit");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("invalid input") || stderr.contains("no .wav"),
        "Should report the empty input set, got: {}",
        stderr
    );
}

#[test]
fn test_inspect_json() {
    let dir = tempfile::tempdir().unwrap();
    let input_dir = dir.path().join("session");
    std::fs::create_dir(&input_dir).unwrap();
    write_session_wav(&input_dir.join("take_01.wav"), 2, 1_000);
    write_session_wav(&input_dir.join("take_02.wav"), 2, 500);

    let output = stemsplit_bin()
        .args(["inspect", input_dir.to_str().unwrap(), "--json"])
        .output()
        .expect("Failed to run stemsplit");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value =
        serde_json::from_str(&stdout).expect("Output should be valid JSON");
    assert_eq!(parsed["total_frames"], 1_500);
    assert_eq!(parsed["parameters"]["sample_rate"], 48_000);
    assert_eq!(parsed["files"].as_array().unwrap().len(), 2);
    assert_eq!(parsed["files"][0]["numeric_key"], 1);
}

#[test]
fn test_inspect_rejects_mixed_session() {
    let dir = tempfile::tempdir().unwrap();
    let input_dir = dir.path().join("session");
    std::fs::create_dir(&input_dir).unwrap();
    write_session_wav(&input_dir.join("take_01.wav"), 2, 100);
    write_session_wav(&input_dir.join("take_02.wav"), 4, 100); // channel mismatch

    let output = stemsplit_bin()
        .args(["inspect", input_dir.to_str().unwrap()])
        .output()
        .expect("Failed to run stemsplit");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("channel count"), "got: {}", stderr);
}

#[test]
fn test_run_end_to_end_json() {
    let dir = tempfile::tempdir().unwrap();
    let input_dir = dir.path().join("session");
    std::fs::create_dir(&input_dir).unwrap();
    write_session_wav(&input_dir.join("take_01.wav"), 2, 2_000);
    write_session_wav(&input_dir.join("take_02.wav"), 2, 1_000);

    let config_path = dir.path().join("channels.json");
    std::fs::write(
        &config_path,
        r#"{
            "channels": [
                {"channel": 1, "name": "Kick", "action": "process"},
                {"channel": 2, "name": "Overheads", "action": "process"}
            ]
        }"#,
    )
    .unwrap();

    let out_dir = dir.path().join("stems");
    let output = stemsplit_bin()
        .args([
            "run",
            input_dir.to_str().unwrap(),
            "-o",
            out_dir.to_str().unwrap(),
            "--config",
            config_path.to_str().unwrap(),
            "--json",
        ])
        .output()
        .expect("Failed to run stemsplit");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value =
        serde_json::from_str(&stdout).expect("Output should be valid JSON");
    assert_eq!(parsed["result"]["total_frames"], 3_000);
    let tracks: Vec<String> = parsed["result"]["tracks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t.as_str().unwrap().to_string())
        .collect();
    assert_eq!(tracks, vec!["01_Kick.wav", "02_Overheads.wav"]);

    for track in &tracks {
        let path = out_dir.join(track);
        assert!(path.exists(), "missing output {}", path.display());
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.duration(), 3_000);
    }
    // temp area cleaned up
    assert!(!out_dir.join("temp").exists());
}

#[test]
fn test_run_bad_bit_depth_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input_dir = dir.path().join("session");
    std::fs::create_dir(&input_dir).unwrap();
    write_session_wav(&input_dir.join("take_01.wav"), 1, 100);

    let output = stemsplit_bin()
        .args([
            "run",
            input_dir.to_str().unwrap(),
            "-o",
            dir.path().join("out").to_str().unwrap(),
            "--bit-depth",
            "12",
        ])
        .output()
        .expect("Failed to run stemsplit");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("bit depth"), "got: {}", stderr);
}

#[test]
fn test_sections_on_silent_file_json() {
    let dir = tempfile::tempdir().unwrap();
    let click = dir.path().join("click.wav");
    // true silence: no onsets, single speaking section
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 48_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&click, spec).unwrap();
    for _ in 0..48_000 {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();

    let output = stemsplit_bin()
        .args(["sections", click.to_str().unwrap(), "--json"])
        .output()
        .expect("Failed to run stemsplit");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let parsed: serde_json::Value =
        serde_json::from_str(&String::from_utf8_lossy(&output.stdout))
            .expect("Output should be valid JSON");
    let sections = parsed["sections"].as_array().unwrap();
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0]["section_type"], "speaking");
    assert!(sections[0]["bpm"].is_null());
}
