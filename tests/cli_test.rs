//! CLI and shutdown integration tests.
//!
//! Tests:
//! - CLI help and version output
//! - A short workload prints the head of the final view
//! - JSON preview output
//! - SIGTERM cancels the workload and the process exits cleanly

use std::process::Command;
use std::time::Duration;
use uuid::Uuid;

const BIN: &str = env!("CARGO_BIN_EXE_listsync");

fn short_run(data_dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(BIN);
    cmd.args([
        "--data-dir",
        data_dir.to_str().unwrap(),
        "--seed-count",
        "120",
        "--rounds",
        "2",
        "--batch-size",
        "30",
        "--initial-delay-ms",
        "0",
        "--round-pause-ms",
        "0",
        "--preview-lines",
        "7",
        "--log-level",
        "warn",
    ])
    .env_remove("RUST_LOG");
    cmd
}

/// CLI --help output should show the workload options.
#[test]
fn test_cli_help_output() {
    let output = Command::new(BIN)
        .arg("--help")
        .output()
        .expect("failed to run");

    let stdout = String::from_utf8_lossy(&output.stdout);

    for option in ["--data-dir", "--seed-count", "--rounds", "--batch-size", "--json"] {
        assert!(stdout.contains(option), "help should mention {option}");
    }
}

/// CLI --version should show version.
#[test]
fn test_cli_version_output() {
    let output = Command::new(BIN)
        .arg("--version")
        .output()
        .expect("failed to run");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains(env!("CARGO_PKG_VERSION")),
        "version output should contain version number: {stdout}"
    );
}

#[test]
fn test_short_run_prints_preview() {
    let temp_dir = tempfile::TempDir::new().expect("failed to create temp dir");
    let output = short_run(temp_dir.path()).output().expect("failed to run");

    assert!(
        output.status.success(),
        "run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 7, "unexpected preview: {stdout}");
    for line in lines {
        let (id, at) = line.split_once(" - ").expect("line should be `id - timestamp`");
        Uuid::parse_str(id).expect("line should start with a record identifier");
        assert!(at.ends_with("UTC"), "timestamp should be UTC: {at}");
    }
    assert!(temp_dir.path().join("listsync.db").exists());
}

#[test]
fn test_json_preview() {
    let temp_dir = tempfile::TempDir::new().expect("failed to create temp dir");
    let output = short_run(temp_dir.path())
        .arg("--json")
        .output()
        .expect("failed to run");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let values: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be JSON"))
        .collect();
    assert_eq!(values.len(), 7);
    for value in &values {
        assert!(value["identifier"].is_string());
        assert!(value["updated_day"].is_string());
    }
}

/// SIGTERM during the initial delay cancels the workload; the process still
/// prints its preview and exits successfully.
#[cfg(unix)]
#[tokio::test]
async fn test_graceful_shutdown_on_sigterm() {
    use std::process::Stdio;
    use tokio::process::Command as TokioCommand;
    use tokio::time::timeout;

    let temp_dir = tempfile::TempDir::new().expect("failed to create temp dir");

    let child = TokioCommand::new(BIN)
        .args([
            "--data-dir",
            temp_dir.path().to_str().unwrap(),
            "--seed-count",
            "50",
            "--initial-delay-ms",
            "600000",
            "--preview-lines",
            "3",
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn listsync");

    // Wait for the store to be seeded and the signal handler installed
    tokio::time::sleep(Duration::from_secs(2)).await;

    let pid = child.id().expect("no pid");
    let _ = std::process::Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status();

    let output = timeout(Duration::from_secs(10), child.wait_with_output())
        .await
        .expect("listsync did not respond to SIGTERM within timeout")
        .expect("failed to wait for child");

    assert!(
        output.status.success(),
        "listsync should exit cleanly: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(String::from_utf8_lossy(&output.stdout).lines().count(), 3);
}
