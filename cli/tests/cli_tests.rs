/// Integration tests for the goalrt binary
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const WALKER: &str = r#"
[[agent]]
name = "walker"
beliefs = ["at(home)"]
goals = ["at(shop)"]

[[agent.spec]]
signature = "move(X, Y)"
pre = "bel(at(X))"
post_add = "at(Y)"
post_del = "at(X)"
external = true

[[agent.action]]
action = "move(X, shop)"
pre = "bel(at(X)), a-goal(at(shop))"
line = 12
"#;

/// Helper to write a file into a fresh temporary directory
fn write_file(name: &str, content: &str) -> (TempDir, PathBuf) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let path = temp_dir.path().join(name);
    fs::write(&path, content).expect("Failed to write file");
    (temp_dir, path)
}

#[test]
fn test_check_lists_agents() {
    let (_dir, path) = write_file("walker.toml", WALKER);
    cargo_bin_cmd!("goalrt")
        .env("NO_COLOR", "1")
        .arg("check")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("walker"))
        .stdout(predicate::str::contains("1 actions"));
}

#[test]
fn test_check_rejects_bad_term() {
    let (_dir, path) = write_file("bad.toml", "[[agent]]\nname = \"a\"\nbeliefs = [\"p(\"]\n");
    cargo_bin_cmd!("goalrt")
        .arg("check")
        .arg(&path)
        .assert()
        .failure();
}

#[test]
fn test_batch_reports_achieved_goal() {
    let (_dir, path) = write_file("walker.toml", WALKER);
    let output = cargo_bin_cmd!("goalrt")
        .arg("batch")
        .arg(&path)
        .arg("--format")
        .arg("json")
        .output()
        .expect("Failed to run goalrt");
    assert!(output.status.success());

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("run output should be JSON");
    let agent = &report["agents"][0];
    assert_eq!(agent["agent"], "walker");
    assert_eq!(agent["status"], "finished");
    assert_eq!(agent["achieved"][0], "at(shop)");
    assert_eq!(agent["performed"][0], "move(home, shop)");
}

#[test]
fn test_batch_honours_max_cycles() {
    let (_dir, path) = write_file(
        "loop.toml",
        "[[agent]]\nname = \"looper\"\n[[agent.action]]\naction = \"print(tick)\"\n",
    );
    let output = cargo_bin_cmd!("goalrt")
        .args(["batch", "--max-cycles", "3", "--format", "json"])
        .arg(&path)
        .output()
        .expect("Failed to run goalrt");
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["agents"][0]["cycles"], 3);
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_dir, config) = write_file("config.toml", "[debugger]\nreply_timeout_ms = 0\n");
    let agents = config.with_file_name("walker.toml");
    fs::write(&agents, WALKER).unwrap();
    cargo_bin_cmd!("goalrt")
        .arg("--config")
        .arg(&config)
        .arg("check")
        .arg(&agents)
        .assert()
        .failure()
        .stderr(predicate::str::contains("reply_timeout_ms"));
}

#[test]
fn test_serve_announces_agents_and_stops() {
    let (_dir, path) = write_file("walker.toml", WALKER);
    cargo_bin_cmd!("goalrt")
        .arg("serve")
        .arg(&path)
        .arg("--paused")
        .write_stdin("STOP\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("ENV_CREATED environment"))
        .stdout(predicate::str::contains("LAUNCHED walker"));
}

#[test]
fn test_control_evaluates_while_paused() {
    let (_dir, path) = write_file("walker.toml", WALKER);
    let (_script_dir, script) = write_file(
        "session.txt",
        "wait walker\neval walker bel(at(home))\neval walker bel(at(X))\nstop\n",
    );
    cargo_bin_cmd!("goalrt")
        .env("NO_COLOR", "1")
        .arg("control")
        .arg(&path)
        .arg("--script")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("walker true"))
        .stdout(predicate::str::contains("[X/home]"));
}
