//! 集成测试 - 项目求值

mod common;

use common::{quiet_options, strings, Fixture};
use qbuild_core::project::{EvalError, EvalResult, NativeFunctions};
use qbuild_core::{BuildOptions, FunctionProvider};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

#[test]
fn test_remove_value() {
    let fixture = Fixture::new(&[("p/qbuild.pro", "FOO = 1 2 3\nFOO -= 2\n")]);
    let ctx = fixture.context_with(quiet_options(), Vec::new());
    let project = ctx.open("/p").unwrap();
    assert_eq!(project.name(), "/p/");
    assert_eq!(project.value("FOO"), strings(&["1", "3"]));
}

#[test]
fn test_scope_follows_config() {
    let source = "linux:FOO = yes\nelse:FOO = no\n";
    let with = format!("CONFIG += linux\n{source}");
    let fixture = Fixture::new(&[("off/qbuild.pro", source), ("on/qbuild.pro", &with)]);
    let ctx = fixture.context_with(quiet_options(), Vec::new());

    assert_eq!(ctx.open("/off").unwrap().value("FOO"), strings(&["no"]));
    assert_eq!(ctx.open("/on").unwrap().value("FOO"), strings(&["yes"]));
}

#[test]
fn test_for_loop_restores_iterator() {
    let source = "x = keep\nITEMS = a b c\nfor(x, ITEMS) {\n    OUT += y$$x\n}\n";
    let fixture = Fixture::new(&[("p/qbuild.pro", source)]);
    let ctx = fixture.context_with(quiet_options(), Vec::new());
    let project = ctx.open("/p").unwrap();
    assert_eq!(project.value("OUT"), strings(&["ya", "yb", "yc"]));
    assert_eq!(project.value("x"), strings(&["keep"]));
}

#[test]
fn test_regexp_assignment() {
    let source = "FOO = abc abd xyz\nFOO ~= s/ab/X/g\nBAR = one one\nBAR ~= s/one/two/\n";
    let fixture = Fixture::new(&[("p/qbuild.pro", source)]);
    let ctx = fixture.context_with(quiet_options(), Vec::new());
    let project = ctx.open("/p").unwrap();
    assert_eq!(project.value("FOO"), strings(&["Xc", "Xd", "xyz"]));
    assert_eq!(project.value("BAR"), strings(&["two", "one"]));
}

#[test]
fn test_include_relative_file() {
    let fixture = Fixture::new(&[
        ("p/qbuild.pro", "include(defs.pri)\nB = $$A done\n"),
        ("p/defs.pri", "A = from_include\n"),
    ]);
    let ctx = fixture.context_with(quiet_options(), Vec::new());
    let project = ctx.open("/p").unwrap();
    assert_eq!(project.value("B"), strings(&["from_include", "done"]));
    assert!(project
        .included_files()
        .iter()
        .any(|file| file.ends_with("defs.pri")));
}

#[test]
fn test_missing_include_fails_project() {
    let fixture = Fixture::new(&[("p/qbuild.pro", "include(nothere.pri)\n")]);
    let ctx = fixture.context_with(quiet_options(), Vec::new());
    let err = ctx.open("/p").unwrap_err();
    assert!(matches!(err.root_cause(), EvalError::IncludeMissing(name) if name == "nothere.pri"));
    assert!(err.to_string().starts_with("Project (/p) ERROR:"));
}

#[test]
fn test_config_loads_extension() {
    let fixture = Fixture::new(&[
        ("p/qbuild.pro", "CONFIG += feature\nload(other)\n"),
        ("/ext/feature.pri", "FEATURE_LOADED = 1\n"),
        ("/ext/other.pri", "OTHER_LOADED = 1\n"),
    ]);
    let options = BuildOptions {
        extension_paths: vec![PathBuf::from("/ext")],
        ..quiet_options()
    };
    let ctx = fixture.context_with(options, Vec::new());
    let project = ctx.open("/p").unwrap();
    assert_eq!(project.value("FEATURE_LOADED"), strings(&["1"]));
    assert_eq!(project.value("OTHER_LOADED"), strings(&["1"]));
    assert!(project.is_loaded("feature"));
}

#[test]
fn test_common_include_runs_first() {
    let fixture = Fixture::new(&[
        ("p/qbuild.pro", "B = $$A\n"),
        ("/ext/common.pri", "A = common\n"),
    ]);
    let options = BuildOptions {
        extension_paths: vec![PathBuf::from("/ext")],
        ..quiet_options()
    };
    let ctx = fixture.context_with(options, Vec::new());
    assert_eq!(ctx.open("/p").unwrap().value("B"), strings(&["common"]));
}

#[test]
fn test_disable_project_restarts_evaluation() {
    let fixture = Fixture::new(&[("p/qbuild.pro", "A = 1\ndisable_project(not supported)\nB = 2\n")]);
    let ctx = fixture.context_with(quiet_options(), Vec::new());
    let project = ctx.open("/p").unwrap();
    assert!(project.is_disabled());
    assert!(project.is_virtual());
    assert_eq!(project.disabled_reason().as_deref(), Some("not supported"));
    assert!(project.value("A").is_empty());
    assert!(project.value("B").is_empty());
}

#[test]
fn test_cross_project_value() {
    let fixture = Fixture::new(&[
        ("a/qbuild.pro", "X = from_a\n"),
        ("b/qbuild.pro", "Y = $$value(../a/X)\nZ = $$value(/a/X)\n"),
    ]);
    let ctx = fixture.context_with(quiet_options(), Vec::new());
    let b = ctx.open("/b").unwrap();
    assert_eq!(b.value("Y"), strings(&["from_a"]));
    assert_eq!(b.value("Z"), strings(&["from_a"]));
    assert_eq!(ctx.projects().len(), 2);
}

#[test]
fn test_mutual_reference_is_deadlock() {
    let fixture = Fixture::new(&[
        ("a/qbuild.pro", "X = $$value(/b/Y)\n"),
        ("b/qbuild.pro", "Y = $$value(/a/X)\n"),
    ]);
    let ctx = fixture.context_with(quiet_options(), Vec::new());
    let err = ctx.open("/a").unwrap_err();
    assert!(matches!(err, EvalError::Deadlock(_)), "got {err}");
}

#[test]
fn test_self_reference_reads_own_tree() {
    let fixture = Fixture::new(&[("a/qbuild.pro", "X = 1\nY = $$value(/a/X)\n")]);
    let ctx = fixture.context_with(quiet_options(), Vec::new());
    assert_eq!(ctx.open("/a").unwrap().value("Y"), strings(&["1"]));
}

#[test]
fn test_error_function_is_fatal() {
    let fixture = Fixture::new(&[("p/qbuild.pro", "error(stop here)\n")]);
    let ctx = fixture.context_with(quiet_options(), Vec::new());
    let err = ctx.open("/p").unwrap_err();
    assert_eq!(err.to_string(), "Project (/p) ERROR: stop here");

    // 失败被缓存，再次打开得到同样的错误
    let again = ctx.open("/p").unwrap_err();
    assert_eq!(again.to_string(), err.to_string());
}

#[test]
fn test_unknown_function_reports_location() {
    let fixture = Fixture::new(&[("p/qbuild.pro", "A = 1\nnosuchthing(x)\n")]);
    let ctx = fixture.context_with(quiet_options(), Vec::new());
    let err = ctx.open("/p").unwrap_err();
    match err.root_cause() {
        EvalError::UnknownFunction { name, line, .. } => {
            assert_eq!(name, "nosuchthing");
            assert_eq!(*line, 2);
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_parse_error_reports_line() {
    let fixture = Fixture::new(&[("p/qbuild.pro", "A = 1\nB = 2\n} oops\n")]);
    let ctx = fixture.context_with(quiet_options(), Vec::new());
    let err = ctx.open("/p").unwrap_err();
    assert!(matches!(err.root_cause(), EvalError::Parse { line: 3, .. }));
}

#[test]
fn test_warning_terminates_at_finalize() {
    let fixture = Fixture::new(&[("p/qbuild.pro", "warning(careful)\nA = 1\n")]);
    let ctx = fixture.context_with(quiet_options(), Vec::new());
    let err = ctx.open("/p").unwrap_err();
    assert!(matches!(err.root_cause(), EvalError::Warnings));
    assert!(fixture.console.contains("Project (/p) WARNING: careful"));
}

#[test]
fn test_opening_is_announced() {
    let fixture = Fixture::new(&[("p/qbuild.pro", "")]);
    let ctx = fixture.context();
    ctx.open("/p").unwrap();
    ctx.open("/p").unwrap();
    let lines = fixture.console.lines();
    let opened: Vec<_> = lines.iter().filter(|l| l.contains("Opening project")).collect();
    assert_eq!(opened, vec!["QBuild: Opening project /p"]);
}

#[test]
fn test_finalize_modules_run_in_order() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let record = |name: &'static str| {
        let calls = Arc::clone(&calls);
        move |_: &qbuild_core::Project, _: &[Vec<String>]| -> EvalResult<Vec<String>> {
            calls.lock().push(name);
            Ok(vec!["true".to_string()])
        }
    };
    let provider = NativeFunctions::new("test")
        .with_function("do_link", record("link"))
        .with_function("do_moc", record("moc"))
        .with_function("do_last", record("last"));
    let source = "\
QBUILD.FINALIZE.link.CALL = do_link
QBUILD.FINALIZE.moc.CALL = do_moc
QBUILD.FINALIZE.moc.RUN_AFTER_ME = link
QBUILD.FINALIZE.runlast.CALL = do_last
";
    let fixture = Fixture::new(&[("p/qbuild.pro", source)]);
    let providers: Vec<Arc<dyn FunctionProvider>> = vec![Arc::new(provider)];
    let ctx = fixture.context_with(quiet_options(), providers);
    let project = ctx.open("/p").unwrap();
    assert!(project.is_finalized());
    assert_eq!(*calls.lock(), vec!["moc", "link", "last"]);
}

#[test]
fn test_finalize_cycle_is_fatal() {
    let source = "\
QBUILD.FINALIZE.a.RUN_AFTER_ME = b
QBUILD.FINALIZE.b.RUN_AFTER_ME = a
";
    let fixture = Fixture::new(&[("p/qbuild.pro", source)]);
    let ctx = fixture.context_with(quiet_options(), Vec::new());
    let err = ctx.open("/p").unwrap_err();
    match err.root_cause() {
        EvalError::FinalizeCycle { first, second, .. } => {
            let mut pair = vec![first.as_str(), second.as_str()];
            pair.sort();
            assert_eq!(pair, vec!["a", "b"]);
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_rule_objects_become_rules() {
    let source = "\
hello.TYPE = RULE
hello.outputFiles = hello.o
hello.inputFiles = hello.c
hello.commands = \"cc -c hello.c\"
hello.category = compile
hello.serial = true
";
    let fixture = Fixture::new(&[("p/qbuild.pro", source)]);
    let ctx = fixture.context_with(quiet_options(), Vec::new());
    let project = ctx.open("/p").unwrap();
    let rules = project.rules();
    let rule = rules.rule_by_name("hello").unwrap();
    assert_eq!(rule.output_files(), ["hello.o"]);
    assert_eq!(rule.input_files, strings(&["hello.c"]));
    assert_eq!(rule.commands, strings(&["cc -c hello.c"]));
    assert_eq!(rule.category, strings(&["compile"]));
    assert!(rule.is_serial());
    assert_eq!(rules.rule_for_file("hello.o").unwrap().name, "hello");
    assert!(project.dump_rules(None).contains("hello"));
}

#[test]
fn test_rule_function_declares_anonymous_rules() {
    let source = "A = $$rule()\nB = $$rule(named)\n";
    let fixture = Fixture::new(&[("p/qbuild.pro", source)]);
    let ctx = fixture.context_with(quiet_options(), Vec::new());
    let project = ctx.open("/p").unwrap();
    let anonymous = project.value("A");
    assert_eq!(anonymous.len(), 1);
    assert!(anonymous[0].starts_with("Anonymous"));
    assert_eq!(project.value("B"), strings(&["named"]));
    assert!(project.rules().rule_by_name("named").is_some());
    assert_eq!(project.value("named.TYPE"), strings(&["RULE"]));
}

#[test]
fn test_type_hooks_and_watch() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&calls);
    let watched = Arc::clone(&calls);
    let provider = NativeFunctions::new("hooks")
        .with_function("on_lib", move |_, args| {
            seen.lock().push(format!("new {}", args.concat().join(" ")));
            Ok(Vec::new())
        })
        .with_function("on_change", move |project, _| {
            watched.lock().push(format!("watch {}", project.value("V").join(" ")));
            Ok(Vec::new())
        });
    let source = "\
on_new_type(LIB, on_lib)
watch(V, on_change)
core.TYPE = LIB
V = 1
";
    let fixture = Fixture::new(&[("p/qbuild.pro", source)]);
    let providers: Vec<Arc<dyn FunctionProvider>> = vec![Arc::new(provider)];
    let ctx = fixture.context_with(quiet_options(), providers);
    ctx.open("/p").unwrap();
    let calls = calls.lock();
    assert!(calls.iter().any(|c| c.starts_with("new ") && c.contains("core")));
    assert!(calls.contains(&"watch 1".to_string()));
}

#[test]
fn test_script_block_goes_to_provider() {
    let scripts = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&scripts);
    let provider = NativeFunctions::new("script").with_script_handler(move |_, text, _| {
        seen.lock().push(text.trim().to_string());
        Ok(())
    });
    let fixture = Fixture::new(&[("p/qbuild.pro", "script\nrun();\nendscript\n")]);
    let providers: Vec<Arc<dyn FunctionProvider>> = vec![Arc::new(provider)];
    let ctx = fixture.context_with(quiet_options(), providers);
    ctx.open("/p").unwrap();
    assert_eq!(*scripts.lock(), vec!["run();".to_string()]);

    // 没有提供者接手脚本块时是错误
    let bare = Fixture::new(&[("p/qbuild.pro", "script\nrun();\nendscript\n")]);
    let err = bare.context_with(quiet_options(), Vec::new()).open("/p").unwrap_err();
    assert!(matches!(err.root_cause(), EvalError::Script(_)));
}

#[test]
fn test_builtin_helpers() {
    let source = "\
A = $$upper(abc)
B = $$lower(XyZ)
L = x y
C = $$join($$L)
contains(L, y):D = yes
equals(L, x y):E = yes
isEmpty(NOPE):F = yes
!exists(missing.txt):G = yes
exists(qbuild.pro):H = yes
writeFile(gen.txt, content):I = yes
testFile(gen.txt, content):J = yes
";
    let fixture = Fixture::new(&[("p/qbuild.pro", source)]);
    let ctx = fixture.context_with(quiet_options(), Vec::new());
    let project = ctx.open("/p").unwrap();
    assert_eq!(project.value("A"), strings(&["ABC"]));
    assert_eq!(project.value("B"), strings(&["xyz"]));
    assert_eq!(project.value("C"), strings(&["x y"]));
    for name in ["D", "E", "F", "G", "H", "I", "J"] {
        assert_eq!(project.value(name), strings(&["yes"]), "{name}");
    }
    assert!(fixture.exists("p/gen.txt"));
}
