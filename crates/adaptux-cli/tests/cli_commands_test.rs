//! Tests for the `adaptux` commands
//!
//! - `check`: normalized config, warnings, well-formed rule count
//! - `eval`: one-shot signal evaluation
//! - `replay`: JSON lines of emissions from a file or stdin

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const FOCUS_CONFIG: &str = r#"{
    "profile": "reader",
    "rules": [
        {"when": {"signal": "focus", "op": "<", "value": 0.4}, "apply": {"ui": {"highlight": true}}},
        {"when": {"signal": "focus"}}
    ]
}"#;

const AND_CONFIG: &str = r#"
[[rules]]
[[rules.and]]
when = { signal = "focus", op = "<", value = 0.4 }
apply = { ui = { highlight = true } }

[[rules.and]]
when = { signal = "attention", op = ">", value = 0.6 }
apply = { ui = { emphasize = true } }
"#;

fn write_config(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn adaptux() -> Command {
    Command::cargo_bin("adaptux").unwrap()
}

// ============================================================================
// check
// ============================================================================

#[test]
fn test_check_reports_normalized_config_and_rule_count() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, "adaptux.json", FOCUS_CONFIG);

    adaptux()
        .args(["check", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""profile": "reader""#))
        .stdout(predicate::str::contains(r#""maxPropagationDepth": 32"#))
        .stdout(predicate::str::contains("1 of 2 rules are well-formed"));
}

#[test]
fn test_check_prints_normalization_warnings() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, "adaptux.yaml", "profile: 42\nsignals: idle\n");

    adaptux()
        .args(["-l", "off", "check", "-c"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"warning: Invalid config: "profile""#))
        .stdout(predicate::str::contains(r#"warning: Invalid config: "signals""#))
        .stdout(predicate::str::contains(r#""profile": "default""#));
}

#[test]
fn test_check_fails_on_unknown_extension() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, "adaptux.ini", "profile = x");

    adaptux()
        .args(["check", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

// ============================================================================
// eval
// ============================================================================

#[test]
fn test_eval_applies_and_group() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, "adaptux.toml", AND_CONFIG);

    adaptux()
        .args(["eval", "--config"])
        .arg(&config)
        .args(["--signals", r#"{"focus": 0.3, "attention": 0.7}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""highlight": true"#))
        .stdout(predicate::str::contains(r#""emphasize": true"#));
}

#[test]
fn test_eval_partial_and_group_leaves_ui_empty() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, "adaptux.toml", AND_CONFIG);

    adaptux()
        .args(["eval", "--config"])
        .arg(&config)
        .args(["--signals", r#"{"focus": 0.3, "attention": 0.5}"#])
        .assert()
        .success()
        .stdout("{}\n");
}

#[test]
fn test_eval_uses_context_entries() {
    let temp = TempDir::new().unwrap();
    let config = write_config(
        &temp,
        "adaptux.json",
        r#"{"rules": [{"when": {"locale": "de", "idle": true}, "apply": {"hyphenate": true}}]}"#,
    );

    adaptux()
        .args(["eval", "-c"])
        .arg(&config)
        .args(["-s", r#"{"idle": true}"#, "--context", r#"{"locale": "de"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""hyphenate": true"#));
}

#[test]
fn test_eval_rejects_non_object_signals() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, "adaptux.json", FOCUS_CONFIG);

    adaptux()
        .args(["eval", "-c"])
        .arg(&config)
        .args(["-s", "[0.3]"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--signals must be a JSON object"));
}

// ============================================================================
// replay
// ============================================================================

#[test]
fn test_replay_prints_each_adaptation_change() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, "adaptux.json", FOCUS_CONFIG);
    let events = write_config(
        &temp,
        "events.jsonl",
        concat!(
            "{\"type\": \"focus\", \"value\": 0.3}\n",
            "\n",
            "{\"type\": \"focus\", \"value\": 0.35}\n",
            "{\"type\": \"focus\", \"value\": 0.9}\n",
        ),
    );

    adaptux()
        .args(["replay", "--config"])
        .arg(&config)
        .arg("--events")
        .arg(&events)
        .assert()
        .success()
        .stdout("{\"highlight\":true}\n{}\n{\"highlight\":true}\n");
}

#[test]
fn test_replay_reads_stdin() {
    let temp = TempDir::new().unwrap();
    let config = write_config(
        &temp,
        "adaptux.json",
        r#"{"rules": [{"when": {"scroll": {"$gt": 500}}, "apply": {"stickyHeader": true}}]}"#,
    );

    adaptux()
        .args(["replay", "-c"])
        .arg(&config)
        .write_stdin("{\"type\": \"scroll\", \"position\": 840, \"direction\": \"down\"}\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("{\"stickyHeader\":true}"));
}

#[test]
fn test_replay_reports_bad_line_number() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, "adaptux.json", FOCUS_CONFIG);

    adaptux()
        .args(["replay", "-c"])
        .arg(&config)
        .write_stdin("{\"type\": \"focus\", \"value\": 0.3}\nnot json\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 2 is not valid JSON"));
}
