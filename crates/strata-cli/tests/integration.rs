//! Integration tests for strata-cli.
//!
//! Tests invoke the built `strata` binary against patch files written to a
//! temporary directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// Helper to get the path to the `strata` binary built by cargo.
fn strata_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_strata"))
}

const TONE: &str = r#"
name = "Tone"

[engine]
sample_rate = 8000
block_size = 64
channels = 2

[[object]]
id = "osc"
type = "oscillator"
params = { waveform = "triangle", frequency = "220Hz", amplitude = "-6dB" }

[[object]]
id = "lp"
type = "filter"
inputs = ["osc"]
params = { mode = "lowpass", frequency = "2kHz" }

[[output]]
object = "lp"
"#;

fn write_patch(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

// ---------------------------------------------------------------------------
// `strata objects`
// ---------------------------------------------------------------------------

#[test]
fn cli_objects_lists_every_type() {
    let output = strata_bin()
        .arg("objects")
        .output()
        .expect("failed to run strata objects");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Available Objects"));
    for name in ["constant", "gain", "oscillator", "filter", "buffer_player"] {
        assert!(stdout.contains(name), "listing should contain '{name}'");
    }
}

#[test]
fn cli_objects_detail_shows_parameters() {
    let output = strata_bin()
        .args(["objects", "filter"])
        .output()
        .expect("failed to run strata objects filter");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Parameters"));
    assert!(stdout.contains("resonance"));
}

#[test]
fn cli_objects_unknown_type_fails() {
    let output = strata_bin()
        .args(["objects", "reverb"])
        .output()
        .expect("failed to run strata objects reverb");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown object type"));
}

// ---------------------------------------------------------------------------
// `strata check`
// ---------------------------------------------------------------------------

#[test]
fn cli_check_accepts_valid_patch() {
    let dir = TempDir::new().unwrap();
    let patch = write_patch(dir.path(), "tone.toml", TONE);

    let output = strata_bin()
        .arg("check")
        .arg(&patch)
        .arg("--build")
        .output()
        .expect("failed to run strata check");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Patch: Tone"));
    assert!(stdout.contains("lp"));
    assert!(stdout.contains("OK: built 2 object(s) with 2 node(s)"));
}

#[test]
fn cli_check_rejects_forward_reference() {
    let dir = TempDir::new().unwrap();
    let patch = write_patch(
        dir.path(),
        "bad.toml",
        r#"
[[object]]
id = "lp"
type = "filter"
inputs = ["osc"]

[[object]]
id = "osc"
type = "oscillator"
"#,
    );

    let output = strata_bin()
        .arg("check")
        .arg(&patch)
        .output()
        .expect("failed to run strata check");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("declared after it"));
}

#[test]
fn cli_check_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    let output = strata_bin()
        .arg("check")
        .arg(dir.path().join("absent.toml"))
        .output()
        .expect("failed to run strata check");
    assert!(!output.status.success());
}

// ---------------------------------------------------------------------------
// `strata render`
// ---------------------------------------------------------------------------

#[test]
fn cli_render_writes_wav() {
    let dir = TempDir::new().unwrap();
    let patch = write_patch(dir.path(), "tone.toml", TONE);
    let wav = dir.path().join("tone.wav");

    let output = strata_bin()
        .arg("render")
        .arg(&patch)
        .arg("-o")
        .arg(&wav)
        .args(["--seconds", "0.5", "--bit-depth", "16"])
        .output()
        .expect("failed to run strata render");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("dBFS"), "peak not reported in dBFS: {stdout}");

    let info = strata_io::read_wav_info(&wav).unwrap();
    assert_eq!(info.channels, 2);
    assert_eq!(info.sample_rate, 8000);
    assert_eq!(info.bits_per_sample, 16);
    assert_eq!(info.num_frames, 4000);

    let (buffer, _) = strata_io::read_wav(&wav).unwrap();
    assert!(buffer.channel(0).unwrap().iter().any(|s| s.abs() > 0.1));
    // A mono object feeds both host channels.
    assert_eq!(buffer.channel(0), buffer.channel(1));
}

#[test]
fn cli_render_sample_rate_override() {
    let dir = TempDir::new().unwrap();
    let patch = write_patch(dir.path(), "tone.toml", TONE);
    let wav = dir.path().join("tone.wav");

    let status = strata_bin()
        .arg("render")
        .arg(&patch)
        .arg("-o")
        .arg(&wav)
        .args(["--seconds", "0.25", "--sample-rate", "16000"])
        .status()
        .expect("failed to run strata render");
    assert!(status.success());

    let info = strata_io::read_wav_info(&wav).unwrap();
    assert_eq!(info.sample_rate, 16000);
    assert_eq!(info.num_frames, 4000);
}

#[test]
fn cli_render_rejects_nonpositive_length() {
    let dir = TempDir::new().unwrap();
    let patch = write_patch(dir.path(), "tone.toml", TONE);

    let output = strata_bin()
        .arg("render")
        .arg(&patch)
        .args(["-o", "unused.wav", "--seconds", "0"])
        .current_dir(dir.path())
        .output()
        .expect("failed to run strata render");
    assert!(!output.status.success());
    assert!(!dir.path().join("unused.wav").exists());
}

#[test]
fn cli_help_lists_commands() {
    let output = strata_bin()
        .arg("--help")
        .output()
        .expect("failed to run strata --help");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["render", "play", "check", "objects", "devices"] {
        assert!(stdout.contains(command), "help should mention '{command}'");
    }
}
