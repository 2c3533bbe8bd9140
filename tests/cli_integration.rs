//! CLI integration tests
//!
//! Runs the compiled binary and checks exit codes and the files each
//! subcommand writes.

mod support;

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use support::Project;

fn kubelift(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_kubelift"))
        .args(args)
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .env_remove("KUBELIFT_OUTPUT_DIR")
        .env_remove("KUBELIFT_TRANSFORMER_DIRS")
        .output()
        .expect("Failed to execute kubelift")
}

#[test]
fn test_cli_help() {
    let project = Project::new();
    let output = kubelift(&["--help"], project.dir.path());
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["collect", "plan", "transform", "version"] {
        assert!(stdout.contains(command), "missing {} in help", command);
    }
}

#[test]
fn test_version_command() {
    let project = Project::new();
    let output = kubelift(&["version"], project.dir.path());
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_plan_then_transform() {
    let project = Project::new().with_node_service();
    let cwd = project.dir.path();

    let output = kubelift(&["plan", "-s", "src", "-n", "shop", "--qa-skip"], cwd);
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
    let plan = fs::read_to_string(cwd.join("kubelift.plan")).unwrap();
    assert!(plan.contains("NodejsDockerfileGenerator"));

    let output = kubelift(&["transform", "--qa-skip", "--log-level", "debug"], cwd);
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(cwd.join("shop/source/web/Dockerfile").is_file());
}

#[test]
fn test_collect_lists_candidates() {
    let project = Project::new().with_node_service();
    let cwd = project.dir.path();
    let output = kubelift(&["collect", "-s", "src", "-o", "collected"], cwd);
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
    let services = fs::read_to_string(cwd.join("collected/collect/services.yaml")).unwrap();
    assert!(services.contains("app"));
    assert!(services.contains("NodejsDockerfileGenerator"));
}

#[test]
fn test_missing_source_exits_one() {
    let project = Project::new();
    let output = kubelift(&["plan", "-s", "does-not-exist", "--qa-skip"], project.dir.path());
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("error"));
}

#[test]
fn test_malformed_plan_exits_one() {
    let project = Project::new();
    fs::write(project.dir.path().join("bad.plan"), "kind: Nope\nname: x\nrootDir: src\n").unwrap();
    let output = kubelift(&["transform", "-p", "bad.plan", "--qa-skip"], project.dir.path());
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_log_file_is_appended() {
    let project = Project::new();
    let cwd = project.dir.path();
    fs::write(cwd.join("k.log"), "previous\n").unwrap();
    let output = kubelift(
        &["plan", "-s", "src", "--qa-skip", "--log-level", "info", "--log-file", "k.log"],
        cwd,
    );
    assert_eq!(output.status.code(), Some(0));
    let log = fs::read_to_string(cwd.join("k.log")).unwrap();
    assert!(log.starts_with("previous\n"));
    assert!(log.len() > "previous\n".len());
}

#[test]
fn test_invalid_log_level_falls_back() {
    let project = Project::new();
    let output = kubelift(&["--log-level", "loud", "version"], project.dir.path());
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid log level"));
}
