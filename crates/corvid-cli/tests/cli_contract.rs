use std::io::Write;
use std::process::{Command, Output};

fn model_path(name: &str) -> String {
    format!("{}/../../models/{name}", env!("CARGO_MANIFEST_DIR"))
}

fn corvid(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_corvid"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute corvid")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

#[test]
fn help_lists_every_subcommand() {
    let output = corvid(&["--help"]);
    assert!(output.status.success(), "--help should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["verify", "check", "parse"] {
        assert!(stdout.contains(command), "help should list {command}");
    }
}

#[test]
fn failing_query_sets_exit_status() {
    let output = corvid(&["verify", &model_path("plaintext_leak.vp")]);
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("FAIL confidentiality? s"), "{stdout}");
}

#[test]
fn json_report_reflects_attacker_override() {
    let output = corvid(&[
        "verify",
        &model_path("unguarded_dh.vp"),
        "--attacker",
        "passive",
        "--format",
        "json",
    ]);
    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["attacker"], "passive");
    assert_eq!(report["queries"][0]["status"], "pass");
    assert_eq!(report["source_sha256"].as_str().map(str::len), Some(64));
}

#[test]
fn progress_logs_go_to_stderr() {
    let output = corvid(&["verify", &model_path("simple_confidentiality.vp"), "--threads", "2"]);
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Parsing"), "{stderr}");
    assert!(!String::from_utf8_lossy(&output.stdout).contains("Parsing"));
}

#[test]
fn check_summarizes_model() {
    let output = corvid(&["check", &model_path("key_leak_phases.vp"), "--format", "json"]);
    assert!(output.status.success());
    let summary = stdout_json(&output);
    assert_eq!(summary["attacker"], "passive");
    assert_eq!(summary["phases"], 2);
    assert_eq!(summary["principals"], serde_json::json!(["Alice", "Bob"]));
}

#[test]
fn parse_emits_syntax_tree() {
    let output = corvid(&["parse", &model_path("mac_authentication.vp")]);
    assert!(output.status.success());
    let tree = stdout_json(&output);
    assert!(tree["blocks"].as_array().is_some_and(|b| !b.is_empty()));
}

#[test]
fn malformed_model_is_rejected() {
    let mut file = tempfile::Builder::new()
        .suffix(".vp")
        .tempfile()
        .expect("temp file");
    writeln!(file, "attacker[sideways]").expect("write");
    let path = file.path().display().to_string();

    let text = corvid(&["check", &path]);
    assert!(!text.status.success());
    assert!(!text.stderr.is_empty());

    let json = corvid(&["check", &path, "--format", "json"]);
    assert_eq!(json.status.code(), Some(1));
    assert!(stdout_json(&json)["error"].is_string());
}

#[test]
fn unknown_attacker_is_an_error() {
    let output = corvid(&[
        "verify",
        &model_path("plaintext_leak.vp"),
        "--attacker",
        "sideways",
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown attacker"), "{stderr}");
}
