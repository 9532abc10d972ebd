//! QBuild CLI - Command line interface
//!
//! 在当前目录（或 `-C` 指定的目录）中打开项目并运行规则。
//! `qbuild.json` 提供默认配置，命令行参数覆盖它。

use clap::{error::ErrorKind, Parser};
use qbuild_api::{native_fs, QBuild, QBuildError, RunConfig, Target};
use qbuild_config::{BuildOptions, ConfigError, FileConfig, ThrottleSpec, MAX_THREADS};
use qbuild_log::{debug, Logger};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

mod config;
mod logging;
mod platform;

use crate::config::LogConfig;
use crate::logging::LogFormat;
use crate::platform::print_error;

#[derive(Parser, Debug)]
#[command(
    name = "qbuild",
    about = "QBuild - parallel rule-based build tool",
    version
)]
struct Cli {
    /// Rule to run (default: the project's default rule)
    #[arg(value_name = "RULE")]
    rule: Option<String>,

    /// Project node to build (default: the current directory)
    #[arg(long, value_name = "NODE")]
    node: Option<String>,

    /// Change to this directory first, creating it if needed
    #[arg(short = 'C', value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Build a single project file
    #[arg(short = 'f', value_name = "FILE")]
    file: Option<String>,

    /// Worker threads (0 = host parallelism)
    #[arg(short = 'j', value_name = "N")]
    jobs: Option<usize>,

    /// Print commands without running them
    #[arg(short = 'n')]
    dry_run: bool,

    /// Rebuild the target even when it is up to date
    #[arg(long)]
    force: bool,

    /// Bring a single file up to date instead of running a rule
    #[arg(long, value_name = "FILE")]
    freshen: Option<String>,

    /// Limit concurrency per category: <category>:<N|T>
    #[arg(long, value_name = "SPEC")]
    throttle: Vec<String>,

    /// Debug rule execution
    #[arg(short = 'd')]
    debug: bool,

    /// Trace project evaluation
    #[arg(long)]
    trace: bool,

    /// Trace function calls and script blocks
    #[arg(long)]
    run_trace: bool,

    /// Echo every command
    #[arg(short = 'v')]
    verbose: bool,

    /// Silent mode
    #[arg(short = 's')]
    silent: bool,

    /// Print the project file's tokens
    #[arg(long)]
    tokenize: bool,

    /// Print the project file's syntax tree
    #[arg(long)]
    parse_tree: bool,

    /// Print the project's object tree
    #[arg(long)]
    parse: bool,

    /// Print the object tree and trace finalizers
    #[arg(long)]
    finalize: bool,

    /// Print the project's rules (filtered by RULE if given)
    #[arg(long)]
    rules: bool,

    /// List rules that carry help text
    #[arg(long)]
    actions: bool,

    /// Print the solution mappings
    #[arg(long)]
    solutions: bool,

    /// Open the project but do not run anything
    #[arg(long)]
    no_run: bool,

    /// Print per-phase timings when done
    #[arg(long)]
    perf_statistics: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "compact")]
    log_format: LogFormat,

    /// Also append logs to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn dumps(&self) -> bool {
        self.tokenize || self.parse_tree || self.parse || self.finalize || self.rules
    }
}

/// 可以用单个 `-` 书写的长参数
const LONG_FLAGS: &[&str] = &[
    "node",
    "force",
    "freshen",
    "throttle",
    "trace",
    "run-trace",
    "tokenize",
    "parse-tree",
    "parse",
    "finalize",
    "rules",
    "actions",
    "solutions",
    "no-run",
    "perf-statistics",
    "log-format",
    "log-file",
    "help",
    "version",
];

/// 把 `-node x`、`-log-format=json` 这类单横线长参数改写为 `--` 形式
///
/// `--` 之后的参数原样保留。
fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out = Vec::new();
    let mut rest = false;
    for arg in args {
        if rest {
            out.push(arg);
            continue;
        }
        if arg == "--" {
            rest = true;
            out.push(arg);
            continue;
        }
        let long = arg
            .strip_prefix('-')
            .filter(|body| !body.starts_with('-'))
            .filter(|body| {
                let name = body.split_once('=').map_or(*body, |(name, _)| name);
                LONG_FLAGS.contains(&name)
            });
        match long {
            Some(body) => out.push(format!("--{body}")),
            None => out.push(arg),
        }
    }
    out
}

fn main() {
    let cli = match Cli::try_parse_from(normalize_args(std::env::args())) {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => -1,
            };
            // 输出失败时也照常退出
            let printed = e.print();
            drop(printed);
            process::exit(code);
        }
    };

    let json = cli.log_format == LogFormat::Json;
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(failure) => {
            print_error(&failure.error, json);
            if let Some(dump) = &failure.crash_dump {
                eprintln!("Last log records:");
                eprintln!("{dump}");
            }
            process::exit(failure.error.exit_code());
        }
    }
}

/// 致命错误，调试模式下带上最近的日志
struct Failure {
    error: QBuildError,
    crash_dump: Option<String>,
}

impl From<QBuildError> for Failure {
    fn from(error: QBuildError) -> Self {
        Failure {
            error,
            crash_dump: None,
        }
    }
}

impl From<ConfigError> for Failure {
    fn from(error: ConfigError) -> Self {
        QBuildError::from(error).into()
    }
}

fn run(cli: Cli) -> Result<i32, Failure> {
    if let Some(dir) = &cli.directory {
        enter_directory(dir)?;
    }
    let cwd = std::env::current_dir()
        .map_err(|e| QBuildError::Usage(format!("Cannot determine working directory: {e}")))?;
    let file_config = FileConfig::load_from(&cwd)?.unwrap_or_default();
    let options = build_options(&cli, &file_config)?;

    let log_config = LogConfig::from_file(&file_config)
        .map_err(QBuildError::Usage)?
        .with_debug(options.debug);
    if let Err(e) = logging::init_with_file(&log_config, cli.log_format, cli.log_file.as_deref()) {
        eprintln!("Cannot initialize logging: {e}");
    }
    let log = logging::build_logger(&log_config);
    debug!(log.logger, "Options: {:?}", options);

    let debugging = options.debug.any();
    let cwd = cwd.to_string_lossy().into_owned();
    session(&cli, &cwd, options, &log.logger).map_err(|error| Failure {
        error,
        crash_dump: debugging.then(|| log.crash_dump()).flatten(),
    })
}

/// 建立 solution 并处理请求的节点
fn session(cli: &Cli, cwd: &str, options: BuildOptions, logger: &Arc<Logger>) -> Result<i32, QBuildError> {
    let config = RunConfig::new(options).with_logger(Arc::clone(logger));
    let fs = native_fs(logger);
    let qbuild = match &cli.file {
        Some(file) => QBuild::for_file(fs, cwd, file, config)?,
        None => QBuild::open_directory(fs, cwd, config)?,
    };

    if cli.solutions {
        print!("{}", qbuild.solutions_report());
        if !cli.dumps() && !cli.actions {
            return Ok(0);
        }
    }

    let node = qbuild.detect_node(cli.node.as_deref())?;
    let code = build(cli, &qbuild, &node, logger)?;

    if cli.perf_statistics {
        for row in qbuild.timings_report() {
            println!("{row}");
        }
    }
    Ok(code)
}

/// 按参数处理一个项目节点，返回退出码
fn build(cli: &Cli, qbuild: &QBuild, node: &str, logger: &Arc<Logger>) -> Result<i32, QBuildError> {
    if cli.tokenize || cli.parse_tree {
        match qbuild.project_file(node)? {
            Some(file) => eprintln!("Project file: {}", file.fs_path()),
            None => eprintln!("Project {node} has no project file"),
        }
        if cli.tokenize {
            print!("{}", qbuild.tokens(node)?);
        }
        if cli.parse_tree {
            print!("{}", qbuild.parse_tree(node)?);
        }
    }

    let needs_project = cli.parse || cli.finalize || cli.rules || cli.actions || !cli.dumps();
    if !needs_project {
        return Ok(0);
    }
    let project = qbuild.open(node)?;

    if cli.actions {
        print!("{}", qbuild.actions(&project));
        return Ok(0);
    }
    if cli.parse || cli.finalize {
        print!("{}", project.dump());
    }
    if cli.rules {
        print!("{}", project.dump_rules(cli.rule.as_deref()));
    }
    if cli.dumps() || cli.no_run {
        return Ok(0);
    }

    let target = match &cli.freshen {
        Some(file) => Target::Freshen(file.clone()),
        None => Target::Rule(cli.rule.clone().unwrap_or_default()),
    };
    let output = qbuild.execute(&project, &target)?;
    debug!(logger, "{} {:?}: {:?}", output.project, output.target, output.outcome);
    Ok(output.exit_code())
}

fn enter_directory(dir: &Path) -> Result<(), QBuildError> {
    let fail = |e: std::io::Error| {
        QBuildError::Usage(format!("Cannot change to directory {}: {e}", dir.display()))
    };
    std::fs::create_dir_all(dir).map_err(fail)?;
    std::env::set_current_dir(dir).map_err(fail)
}

/// 先应用配置文件，再用命令行参数覆盖
fn build_options(cli: &Cli, file: &FileConfig) -> Result<BuildOptions, QBuildError> {
    let mut options = BuildOptions::default();
    options.apply_file(file)?;

    if let Some(jobs) = cli.jobs {
        if jobs > MAX_THREADS {
            return Err(ConfigError::InvalidThreads(jobs).into());
        }
        options = options.with_threads(jobs);
    }
    for spec in &cli.throttle {
        options = options.with_throttle(ThrottleSpec::parse(spec)?);
    }

    options.dry_run = cli.dry_run;
    options.force = cli.force;
    options.verbose = cli.verbose;
    options.silent = cli.silent;
    options.debug.rule_exec = cli.debug;
    options.debug.trace = cli.trace;
    options.debug.run_trace = cli.run_trace;
    options.debug.finalize = cli.finalize;
    options.debug.perf_timing = cli.perf_statistics;
    Ok(options)
}
