// CLI surface tests that do not need adb or a device attached

use std::process::Command;

/// Helper to run droidprobe CLI commands
fn run_droidprobe(args: &[&str]) -> std::process::Output {
    let binary_path = env!("CARGO_BIN_EXE_droidprobe");
    Command::new(binary_path)
        .args(args)
        .output()
        .expect("Failed to execute droidprobe command")
}

#[test]
fn test_help_lists_every_subcommand() {
    let output = run_droidprobe(&["--help"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for subcommand in [
        "devices", "watch", "open", "targets", "identify", "wake", "nickname",
    ] {
        assert!(
            stdout.contains(subcommand),
            "help output missing subcommand {}",
            subcommand
        );
    }
}

#[test]
fn test_watch_default_interval_tracks_the_poller() {
    let output = run_droidprobe(&["watch", "--help"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let expected = format!("[default: {}]", droidprobe::poller::DEFAULT_INTERVAL.as_secs());
    assert!(
        stdout.contains(&expected),
        "watch --help does not advertise {}",
        expected
    );
}

#[test]
fn test_unknown_subcommand_is_a_usage_error() {
    let output = run_droidprobe(&["frobnicate"]);
    assert!(!output.status.success());
    // clap reports usage errors on stderr with exit code 2
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_open_requires_serial_and_url() {
    let output = run_droidprobe(&["open"]);
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("SERIAL") || stderr.contains("serial"));
}

#[test]
fn test_missing_adb_binary_fails_with_json_error() {
    let output = run_droidprobe(&["--adb", "/nonexistent/adb", "devices"]);
    assert!(!output.status.success());

    // Fatal errors land as a JSON object on stdout for programmatic
    // consumption, with a human-readable copy on stderr
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout
        .lines()
        .find(|l| l.trim_start().starts_with('{'))
        .expect("no JSON error object on stdout");
    let parsed: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(parsed["error"], serde_json::Value::Bool(true));
    assert!(parsed["message"].is_string());
    assert!(parsed["exit_code"].is_number());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error:"));
}
