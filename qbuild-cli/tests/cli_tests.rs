//! `qbuild` 可执行文件的端到端测试

use std::path::Path;
use std::process::{Command, Output};

fn qbuild(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_qbuild"))
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn project(source: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("qbuild.pro"), source).unwrap();
    dir
}

const TOUCH_RULE: &str = "\
default.TYPE = RULE
default.outputFiles = out.txt
default.commands = \"touch out.txt\"
install.TYPE = RULE
install.help = Install everything
";

#[test]
fn test_builds_default_rule() {
    let dir = project(TOUCH_RULE);
    let output = qbuild(dir.path(), &["-s"]);
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert!(dir.path().join("out.txt").is_file());

    // 第二次无事可做
    let output = qbuild(dir.path(), &["-s"]);
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_dry_run_does_not_touch() {
    let dir = project(TOUCH_RULE);
    let output = qbuild(dir.path(), &["-n", "-s"]);
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert!(!dir.path().join("out.txt").exists());
}

#[test]
fn test_failing_command_exits_one() {
    let dir = project("default.TYPE = RULE\ndefault.commands = false\n");
    let output = qbuild(dir.path(), &["-s"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_usage_errors_exit_minus_one() {
    let dir = project(TOUCH_RULE);
    for args in [&["-j", "51"][..], &["-throttle", "link"][..], &["-f", "missing.pro"][..], &["-bogus"][..]] {
        let output = qbuild(dir.path(), args);
        assert_eq!(output.status.code(), Some(255), "{args:?}");
    }
}

#[test]
fn test_help_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let output = qbuild(dir.path(), &["-help"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("qbuild"));
}

#[test]
fn test_actions_and_rules() {
    let dir = project(TOUCH_RULE);
    let output = qbuild(dir.path(), &["-actions"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(
        stdout(&output),
        "QBuild: Opening project /\ninstall\n   Install everything\n"
    );

    let output = qbuild(dir.path(), &["-s", "-actions"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "install\n   Install everything\n");

    let output = qbuild(dir.path(), &["-rules"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("install"));
    assert!(!dir.path().join("out.txt").exists());
}

#[test]
fn test_tokenize_and_parse_tree() {
    let dir = project("A = x\n");
    let output = qbuild(dir.path(), &["-tokenize"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("NAME \"A\""));
    assert!(stderr(&output).contains("Project file:"));

    let output = qbuild(dir.path(), &["-parse-tree"]);
    assert!(stdout(&output).contains("Assignment [1:1] A ="));
}

#[test]
fn test_parse_error_shows_source() {
    let dir = project("A = 1\n} oops\n");
    let output = qbuild(dir.path(), &["-no-run"]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("parser error"), "{err}");
    assert!(err.contains("2 | } oops"), "{err}");

    let output = qbuild(dir.path(), &["-no-run", "-log-format=json"]);
    assert!(stderr(&output).contains("\"phase\":\"parser\""));
}

#[test]
fn test_change_directory_and_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let sub = dir.path().join("sub");
    let output = qbuild(dir.path(), &["-C", "sub", "-solutions"]);
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert!(sub.is_dir());

    std::fs::write(sub.join("qbuild.json"), "{ \"threads\": 99 }").unwrap();
    let output = qbuild(&sub, &["-no-run"]);
    assert_eq!(output.status.code(), Some(255));
}

#[test]
fn test_perf_statistics() {
    let dir = project(TOUCH_RULE);
    let output = qbuild(dir.path(), &["-no-run", "-perf-statistics"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("Project::Load"));
}

#[test]
fn test_debug_failure_dumps_recent_log() {
    let dir = project("error(boom)\n");
    let output = qbuild(dir.path(), &["-d", "-no-run"]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("ERROR: boom"), "{err}");
    assert!(err.contains("Last log records:"), "{err}");

    let output = qbuild(dir.path(), &["-no-run"]);
    assert!(!stderr(&output).contains("Last log records:"));
}
