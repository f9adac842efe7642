use httpmock::Method::POST;
use httpmock::MockServer;
use serde_json::{Value, json};
use std::fs;
use std::io::Write;
use std::net::TcpListener;
use std::path::Path;
use std::process::{Command, Output, Stdio};

const INHERITED_VARS: &[&str] = &[
    "OPENAI_API_KEY",
    "OPENAI_CONFIG",
    "OPENAI_MODEL",
    "OPENAI_API_URL",
    "PREFERRED_LANGUAGE",
    "SYSTEM_PROMPT",
    "CUSTOM_INSTRUCTIONS",
    "USER_INFO",
    "AI_PROFILE",
    "TIMEZONE",
    "TOKEN_USAGE_LOG",
    "POLLING_RATE_MS",
    "REQUEST_TIMEOUT_SECS",
    "LOG_FILE_PATH",
];

fn cli(workdir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_openai-cli"));
    for var in INHERITED_VARS {
        cmd.env_remove(var);
    }
    cmd.current_dir(workdir)
        .env("RUST_LOG", "openai_cli=info")
        .env("LOG_OUTPUT", "stderr")
        .env("LOG_FORMAT", "pretty")
        .env("POLLING_RATE_MS", "0");
    cmd
}

fn run_with_stdin(mut cmd: Command, input: &str) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn openai-cli");
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(input.as_bytes())
        .expect("failed to write stdin");
    child.wait_with_output().expect("failed to wait for openai-cli")
}

fn unreachable_api_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let addr = listener.local_addr().expect("address should be available");
    drop(listener);
    format!("http://{}/v1/chat/completions", addr)
}

fn find_rotated_log_file(dir: &Path, base_file_name: &str) -> Option<std::path::PathBuf> {
    let expected_prefix = format!("{base_file_name}.");
    let mut matches: Vec<_> = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&expected_prefix))
        })
        .collect();
    matches.sort();
    matches.pop()
}

#[test]
fn missing_api_key_exits_with_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = run_with_stdin(cli(dir.path()), "hello\n");

    assert!(!output.status.success(), "missing key should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("API key is not set"),
        "expected missing key error, got stderr:\n{stderr}"
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("User > "), "REPL should not start:\n{stdout}");
}

#[test]
fn api_key_can_come_from_config_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("openai.json"),
        r#"{"api_key":"sk-file","model":"gpt-test"}"#,
    )
    .expect("write config");

    let output = run_with_stdin(cli(dir.path()), "exit\n");

    assert!(output.status.success(), "exit should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("model: gpt-test"), "stdout:\n{stdout}");
}

#[test]
fn show_tokens_then_exit_succeeds_without_network() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut cmd = cli(dir.path());
    cmd.env("OPENAI_API_KEY", "sk-test");

    let output = run_with_stdin(cmd, "show_tokens\nexit\n");

    assert!(output.status.success(), "exit should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("User > "), "stdout:\n{stdout}");
    assert!(
        stdout.contains("No token usage log found."),
        "stdout:\n{stdout}"
    );
}

#[test]
fn end_of_input_ends_session_cleanly() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut cmd = cli(dir.path());
    cmd.env("OPENAI_API_KEY", "sk-test");

    let output = run_with_stdin(cmd, "");
    assert!(output.status.success(), "EOF should end the session cleanly");
}

#[test]
fn network_failure_is_reported_and_repl_continues() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut cmd = cli(dir.path());
    cmd.env("OPENAI_API_KEY", "sk-test")
        .env("OPENAI_API_URL", unreachable_api_url());

    let output = run_with_stdin(cmd, "hello\nshow_tokens\nexit\n");

    assert!(output.status.success(), "turn errors are not fatal");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("OPENAI_API_URL"),
        "expected actionable network error, got stderr:\n{stderr}"
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("No token usage log found."),
        "stdout:\n{stdout}"
    );
}

#[test]
fn one_shot_prompt_prints_reply_and_appends_usage() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .header("authorization", "Bearer sk-test")
            .body_includes("\"content\":\"say hi\"");
        then.status(200)
            .header("content-type", "application/json")
            .body(
                json!({
                    "choices": [{"message": {"role": "assistant", "content": "Bonjour"}}],
                    "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
                })
                .to_string(),
            );
    });

    let dir = tempfile::tempdir().expect("tempdir");
    let mut cmd = cli(dir.path());
    cmd.env("OPENAI_API_KEY", "sk-test")
        .env("OPENAI_API_URL", server.url("/v1/chat/completions"))
        .env("TIMEZONE", "JST")
        .args(["say", "hi"]);

    let output = run_with_stdin(cmd, "");

    mock.assert();
    assert!(output.status.success(), "one-shot should succeed");
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "Bonjour");

    let raw = fs::read_to_string(dir.path().join("token_usage_log.json"))
        .expect("usage log should be written");
    let entries: Vec<Value> = serde_json::from_str(&raw).expect("usage log should be an array");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["prompt_tokens"], 10);
    assert_eq!(entries[0]["completion_tokens"], 5);
    assert_eq!(entries[0]["total_tokens"], 15);
    assert!(
        entries[0]["timestamp"]
            .as_str()
            .is_some_and(|stamp| stamp.ends_with("+09:00")),
        "unexpected entry: {}",
        entries[0]
    );
}

#[test]
fn one_shot_usage_log_failure_exits_with_failure() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200)
            .header("content-type", "application/json")
            .body(
                json!({
                    "choices": [{"message": {"role": "assistant", "content": "Bonjour"}}],
                    "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
                })
                .to_string(),
            );
    });

    let dir = tempfile::tempdir().expect("tempdir");
    let blocking_file = dir.path().join("not-a-directory");
    fs::write(&blocking_file, "block").expect("failed to create blocking file");

    let mut cmd = cli(dir.path());
    cmd.env("OPENAI_API_KEY", "sk-test")
        .env("OPENAI_API_URL", server.url("/v1/chat/completions"))
        .env("TOKEN_USAGE_LOG", blocking_file.join("log.json"))
        .arg("hi");

    let output = run_with_stdin(cmd, "");

    assert!(!output.status.success(), "usage log failure should fail one-shot");
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "Bonjour");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Failed to log token usage"),
        "expected usage log error, got stderr:\n{stderr}"
    );
}

#[test]
fn json_format_emits_json_log_lines_on_stderr() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut cmd = cli(dir.path());
    cmd.env("OPENAI_API_KEY", "sk-test")
        .env("OPENAI_API_URL", unreachable_api_url())
        .env("LOG_FORMAT", "json")
        .arg("hi");

    let output = run_with_stdin(cmd, "");
    assert!(!output.status.success(), "one-shot network failure should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    let parsed: Vec<Value> = stderr
        .lines()
        .filter(|line| line.trim_start().starts_with('{'))
        .map(|line| serde_json::from_str::<Value>(line).expect("line should be valid JSON"))
        .collect();
    assert!(
        parsed.iter().any(|entry| {
            entry
                .get("fields")
                .and_then(|fields| fields.get("message"))
                .and_then(Value::as_str)
                == Some("loaded runtime configuration")
        }),
        "expected startup log message in JSON output, got stderr:\n{stderr}"
    );
    assert!(
        !stderr.contains("sk-test"),
        "API key must never be logged:\n{stderr}"
    );
}

#[test]
fn file_output_writes_logs_to_rotated_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log_dir = dir.path().join("logs");
    let mut cmd = cli(dir.path());
    cmd.env("OPENAI_API_KEY", "sk-test")
        .env("LOG_OUTPUT", "file")
        .env("LOG_FILE_PATH", log_dir.join("cli.log"));

    let output = run_with_stdin(cmd, "exit\n");
    assert!(output.status.success(), "exit should succeed");

    let rotated = find_rotated_log_file(&log_dir, "cli.log").expect("rotated log file");
    let contents = fs::read_to_string(&rotated).expect("failed to read rotated log file");
    assert!(
        contents.contains("loaded runtime configuration"),
        "expected startup log message in file, got:\n{contents}"
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        !stderr.contains("loaded runtime configuration"),
        "did not expect logs on stderr in file-only mode:\n{stderr}"
    );
}

#[test]
fn invalid_log_file_path_falls_back_to_stderr() {
    let dir = tempfile::tempdir().expect("tempdir");
    let blocking_file = dir.path().join("not-a-directory");
    fs::write(&blocking_file, "block").expect("failed to create blocking file");

    let mut cmd = cli(dir.path());
    cmd.env("OPENAI_API_KEY", "sk-test")
        .env("LOG_OUTPUT", "file")
        .env("LOG_FILE_PATH", blocking_file.join("cli.log"));

    let output = run_with_stdin(cmd, "exit\n");
    assert!(output.status.success(), "exit should succeed");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("failed to initialize LOG_OUTPUT=file"),
        "expected fallback warning, got:\n{stderr}"
    );
    assert!(
        stderr.contains("loaded runtime configuration"),
        "expected logs to continue on stderr after fallback, got:\n{stderr}"
    );
}
