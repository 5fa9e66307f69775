mod common;

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use common::run_retrodrive;
use retrodrive::error::ExitCode;

// ============================================================================
// version / completions
// ============================================================================

#[test]
fn version_human() {
    let output = run_retrodrive(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("retrodrive "), "unexpected output: {stdout}");
}

#[test]
fn version_json() {
    let output = run_retrodrive(&["version", "--format", "json"]);
    assert!(output.status.success());
    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("version JSON should be valid");
    assert_eq!(parsed["name"], "retrodrive");
    assert_eq!(parsed["backends"].as_array().unwrap().len(), 3);
}

#[test]
fn completions_bash() {
    let output = run_retrodrive(&["completions", "bash"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("retrodrive"));
}

// ============================================================================
// generate / run / health
// ============================================================================

#[test]
fn generate_against_unreachable_proxy_prints_fallback() {
    let output = run_retrodrive(&[
        "generate",
        "회의록 정리",
        "--proxy-url",
        "http://127.0.0.1:9",
        "--quiet",
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("회의록 정리"));
    assert!(stdout.contains("[바꾸다]"));
}

#[test]
fn run_with_blank_task_is_usage_error() {
    let output = run_retrodrive(&["run", "--task", "  ", "--quiet"]);
    assert_eq!(output.status.code(), Some(ExitCode::USAGE_ERROR));
}

#[test]
fn run_without_task_and_closed_stdin_is_usage_error() {
    let output = run_retrodrive(&["run", "--quiet"]);
    assert_eq!(output.status.code(), Some(ExitCode::USAGE_ERROR));
}

#[test]
fn run_with_misspelled_start_phase_suggests_name() {
    let output = run_retrodrive(&["run", "--task", "작업", "--start-phase", "phase33"]);
    assert_eq!(output.status.code(), Some(ExitCode::PHASE_ERROR));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("did you mean"), "stderr: {stderr}");
}

#[test]
fn run_completes_the_simulated_form() {
    let output = run_retrodrive(&[
        "run",
        "--task",
        "테스트 자동화",
        "--proxy-url",
        "http://127.0.0.1:9",
        "--tick-interval",
        "10ms",
        "--settle-delay",
        "10ms",
        "--render-delay",
        "5ms",
        "--quiet",
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Form completed"));
    assert!(stdout.contains("테스트 자동화"));
}

#[test]
fn run_reads_timings_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("retrodrive.yaml");
    std::fs::write(
        &path,
        "client:\n  proxy_url: http://127.0.0.1:9\nengine:\n  tick_interval: 10ms\n  settle_delay: 10ms\nsimulation:\n  render_delay: 5ms\nanswers:\n  keywords: [목적중심]\n",
    )
    .unwrap();

    let output = run_retrodrive(&[
        "--config",
        path.to_str().unwrap(),
        "run",
        "--task",
        "설정 파일 적용",
        "--quiet",
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("설정 파일 적용"));
}

#[test]
fn health_of_unreachable_proxy_is_proxy_error() {
    let output = run_retrodrive(&["health", "--proxy-url", "http://127.0.0.1:9", "--quiet"]);
    assert_eq!(output.status.code(), Some(ExitCode::PROXY_ERROR));
}

#[test]
fn missing_config_file_is_config_error() {
    let output = run_retrodrive(&["--config", "/nonexistent/retrodrive.yaml", "health"]);
    assert_eq!(output.status.code(), Some(ExitCode::CONFIG_ERROR));
}

// ============================================================================
// serve
// ============================================================================

#[tokio::test]
async fn serve_answers_health_checks() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_retrodrive"))
        .args(["serve", "--bind", "127.0.0.1:0", "--backend", "ollama", "-v"])
        .env_remove("RETRODRIVE_CONFIG")
        .env("NO_COLOR", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .expect("failed to spawn retrodrive");

    let stderr = child.stderr.take().expect("stderr not captured");
    let mut reader = BufReader::new(stderr);
    let mut line = String::new();
    let mut port: Option<u16> = None;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        line.clear();
        let n = tokio::time::timeout(Duration::from_secs(5), reader.read_line(&mut line))
            .await
            .expect("timed out waiting for proxy startup")
            .expect("failed to read stderr");
        assert!(n > 0, "proxy exited before printing its address");

        if line.contains("generation proxy started") {
            if let Some(start) = line.find("127.0.0.1:") {
                port = line[start + "127.0.0.1:".len()..]
                    .chars()
                    .take_while(char::is_ascii_digit)
                    .collect::<String>()
                    .parse()
                    .ok();
            }
            break;
        }
    }

    let port = port.expect("failed to discover proxy port from stderr");
    let health: serde_json::Value = reqwest::get(format!("http://127.0.0.1:{port}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["backend"], "ollama");
    assert_eq!(health["credentialConfigured"], true);

    child.kill().await.ok();
}
