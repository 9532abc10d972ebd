//! QBuild 会话的端到端测试

mod common;

use common::{quiet, Workspace, ROOT};
use qbuild_api::error::EngineError;
use qbuild_api::{EngineOutcome, QBuild, QBuildError, RunConfig, Target};
use qbuild_log::{Level, LogConfig};
use qbuild_vfs::VirtualFileSystem;
use std::path::Path;
use std::sync::Arc;

const OBJ_RULE: &str = "\
default.TYPE = RULE
default.outputFiles = out.o
default.commands = \"touch out.o\"
";

#[test]
fn test_build_default_rule() {
    let ws = Workspace::new(&[("p/qbuild.pro", OBJ_RULE)]);
    let qbuild = ws.session("p");
    let node = qbuild.detect_node(None).unwrap();
    assert_eq!(node, "/");

    let project = qbuild.open(&node).unwrap();
    let output = qbuild.execute(&project, &Target::default()).unwrap();
    assert_eq!(output.outcome, EngineOutcome::Succeeded);
    assert_eq!(output.exit_code(), 0);
    assert!(ws.exists("p/out.o"));

    let again = qbuild.execute(&project, &Target::default()).unwrap();
    assert_eq!(again.outcome, EngineOutcome::NothingToDo);
    assert_eq!(ws.shell.commands(), vec!["touch out.o".to_string()]);
}

#[test]
fn test_failed_rule_exit_code() {
    let source = "default.TYPE = RULE\ndefault.commands = fail\n";
    let ws = Workspace::new(&[("p/qbuild.pro", source)]);
    let qbuild = ws.session("");
    let project = qbuild.open("/p").unwrap();

    let output = qbuild.execute(&project, &Target::default()).unwrap();
    assert_eq!(output.outcome, EngineOutcome::Failed);
    assert_eq!(output.exit_code(), 1);
    assert!(ws.console.contains("*** Error"));
}

#[test]
fn test_freshen_file() {
    let ws = Workspace::new(&[("p/qbuild.pro", OBJ_RULE)]);
    let qbuild = ws.session("");
    let project = qbuild.open("/p").unwrap();
    let target = Target::Freshen("out.o".to_string());

    assert_eq!(
        qbuild.execute(&project, &target).unwrap().outcome,
        EngineOutcome::Succeeded
    );
    assert_eq!(
        qbuild.execute(&project, &target).unwrap().outcome,
        EngineOutcome::NothingToDo
    );
    assert!(ws.console.contains("File out.o fresh"));
}

#[test]
fn test_unknown_rule_error() {
    let ws = Workspace::new(&[("p/qbuild.pro", OBJ_RULE)]);
    let qbuild = ws.session("");
    let project = qbuild.open("/p").unwrap();

    let err = qbuild
        .execute(&project, &Target::Rule("nope".to_string()))
        .unwrap_err();
    assert!(matches!(err, QBuildError::Engine(EngineError::NoSuchRule(_))));
    let report = err.to_report();
    assert_eq!(report.phase, "engine");
    assert_eq!(report.error_kind, "NoSuchRule");
    assert_eq!(report.to_string(), "[engine] engine error: No such rule /p/nope");
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn test_detect_node_with_descriptor() {
    let descriptor = "\
[main]
BuildPath=build
Default=true
FilePaths\\size=1
FilePaths\\1\\FilePath=src
FilePaths\\1\\ProjectLocation=/
";
    let ws = Workspace::new(&[
        ("qbuild.solution", descriptor),
        ("src/app/qbuild.pro", "NAME = app\n"),
    ]);
    let qbuild = ws.session("src/app");

    assert_eq!(qbuild.detect_node(None).unwrap(), "/app");
    assert_eq!(qbuild.detect_node(Some(".")).unwrap(), "/app");
    let project = qbuild.open("/app").unwrap();
    assert_eq!(project.value("NAME"), vec!["app".to_string()]);

    let report = qbuild.solutions_report();
    assert!(report.starts_with("Solution main (default):"));
}

#[test]
fn test_relative_and_absolute_nodes() {
    let ws = Workspace::new(&[("qbuild.pro", "")]);
    let qbuild = ws.session("");

    assert_eq!(qbuild.detect_node(Some("lib/new")).unwrap(), "/lib/new");
    assert!(ws.fs.is_dir(Path::new(&format!("{ROOT}/lib/new"))));
    assert_eq!(qbuild.detect_node(Some("/x/")).unwrap(), "/x/");
    assert_eq!(qbuild.detect_node(Some("other:/x/")).unwrap(), "other:/x/");
}

#[test]
fn test_single_file_mode() {
    let ws = Workspace::new(&[("tools/build.pro", OBJ_RULE)]);
    let fs = Arc::new(ws.fs.clone());
    let qbuild = QBuild::for_file(fs, ROOT, "tools/build.pro", ws.config(quiet())).unwrap();

    let node = qbuild.detect_node(Some("/ignored/")).unwrap();
    assert_eq!(node, "/build.pro/");
    let project = qbuild.open(&node).unwrap();
    let output = qbuild.execute(&project, &Target::default()).unwrap();
    assert_eq!(output.outcome, EngineOutcome::Succeeded);
    assert_eq!(ws.shell.commands(), vec!["touch out.o".to_string()]);
}

#[test]
fn test_single_file_mode_missing_file() {
    let ws = Workspace::new(&[]);
    let fs = Arc::new(ws.fs.clone());
    let err = match QBuild::for_file(fs, ROOT, "nothing.pro", RunConfig::default()) {
        Err(err) => err,
        Ok(_) => panic!("missing file accepted"),
    };
    assert_eq!(err.to_string(), "The file nothing.pro does not exist");
    assert_eq!(err.exit_code(), -1);
}

#[test]
fn test_actions() {
    let source = "\
install.TYPE = RULE
install.help = Install the image
quiet.TYPE = RULE
";
    let ws = Workspace::new(&[("p/qbuild.pro", source), ("q/qbuild.pro", "")]);
    let qbuild = ws.session("");

    let actions = qbuild.actions(&qbuild.open("/p").unwrap());
    assert_eq!(actions.0.len(), 1);
    assert_eq!(actions.to_string(), "install\n   Install the image\n");

    let none = qbuild.actions(&qbuild.open("/q").unwrap());
    assert_eq!(none.to_string(), "No actions are available.\n");
}

#[test]
fn test_tokens_and_parse_tree() {
    let ws = Workspace::new(&[("p/qbuild.pro", "A = x\n"), ("bad/qbuild.pro", "} oops\n")]);
    let qbuild = ws.session("");

    assert!(qbuild.tokens("/p").unwrap().contains("NAME \"A\""));
    assert!(qbuild.parse_tree("/p").unwrap().contains("Assignment [1:1] A ="));

    let err = qbuild.parse_tree("/bad").unwrap_err();
    assert!(matches!(err, QBuildError::Parser(_)));
    assert_eq!(err.line(), Some(1));

    // 没有项目文件的虚拟项目
    assert_eq!(qbuild.tokens("/empty").unwrap(), "");
}

#[test]
fn test_open_error_report() {
    let ws = Workspace::new(&[("p/qbuild.pro", "error(stop here)\n")]);
    let qbuild = ws.session("");

    let err = qbuild.open("/p").unwrap_err();
    let report = err.to_report();
    assert_eq!(report.phase, "eval");
    assert_eq!(report.error_kind, "UserError");
    assert_eq!(report.message, "Project (/p) ERROR: stop here");
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn test_parse_error_report() {
    let ws = Workspace::new(&[("p/qbuild.pro", "A = 1\n} oops\n")]);
    let qbuild = ws.session("");

    let report = qbuild.open("/p").unwrap_err().to_report();
    assert_eq!(report.phase, "parser");
    assert_eq!(report.line, Some(2));
    assert!(report.to_string().starts_with("[2:"));
    assert!(report.to_json().unwrap().contains("\"error_kind\":\"SyntaxError\""));
}

#[test]
fn test_timings_report() {
    let ws = Workspace::new(&[("p/qbuild.pro", OBJ_RULE)]);
    let mut options = quiet();
    options.debug.perf_timing = true;
    let qbuild = QBuild::open_directory(Arc::new(ws.fs.clone()), ROOT, ws.config(options)).unwrap();

    qbuild.open("/p").unwrap();
    let rows = qbuild.timings_report();
    assert!(rows.iter().any(|row| row.label == "Project::Load" && row.count == 1));
}

#[test]
fn test_run_on_native_tree() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("qbuild.pro"),
        "default.TYPE = RULE\ndefault.outputFiles = out.txt\ndefault.commands = \"touch out.txt\"\n",
    )
    .unwrap();
    let cwd = dir.path().canonicalize().unwrap();
    let cwd = cwd.to_str().unwrap();
    let console = Arc::new(qbuild_api::MemoryConsole::new());
    let config = RunConfig::new(quiet()).with_console(console.clone());

    let output = qbuild_api::run(cwd, None, &Target::default(), config).unwrap();
    assert_eq!(output.outcome, EngineOutcome::Succeeded);
    assert!(dir.path().join("out.txt").is_file());
}

#[test]
fn test_session_logs_to_ring_buffer() {
    let handle = LogConfig::new(Level::Debug).with_ring_buffer(256).init();
    let ring = handle.ring.clone().unwrap();
    let ws = Workspace::new(&[("p/qbuild.pro", OBJ_RULE)]);
    let config = ws.config(quiet()).with_logger(Arc::clone(&handle.logger));
    let cwd = format!("{ROOT}/p");
    let qbuild = QBuild::open_directory(Arc::new(ws.fs.clone()), &cwd, config).unwrap();

    assert_eq!(qbuild.detect_node(None).unwrap(), "/");
    let messages: Vec<String> = ring.dump_records().into_iter().map(|r| r.message).collect();
    assert!(messages.iter().any(|m| m == "Detected node / for /work/p"), "{messages:?}");
}

#[test]
fn test_engine_records_carry_rule_span() {
    let handle = LogConfig::new(Level::Debug).with_ring_buffer(256).init();
    let ring = handle.ring.clone().unwrap();
    let ws = Workspace::new(&[("p/qbuild.pro", OBJ_RULE)]);
    let mut options = quiet();
    options.debug.rule_exec = true;
    let config = ws.config(options).with_logger(Arc::clone(&handle.logger));
    let cwd = format!("{ROOT}/p");
    let qbuild = QBuild::open_directory(Arc::new(ws.fs.clone()), &cwd, config).unwrap();

    let project = qbuild.open("/").unwrap();
    let output = qbuild.execute(&project, &Target::default()).unwrap();
    assert_eq!(output.outcome, EngineOutcome::Succeeded);

    let records = ring.dump_records();
    let completed: Vec<_> = records
        .iter()
        .filter(|r| r.message.contains(": completed"))
        .collect();
    assert!(!completed.is_empty(), "{records:?}");
    for record in completed {
        let span = record.span.as_deref().unwrap_or_default();
        let rule = span.strip_prefix("rule ").unwrap();
        assert!(record.message.starts_with(&format!("{rule}: completed")), "{record:?}");
    }
}
