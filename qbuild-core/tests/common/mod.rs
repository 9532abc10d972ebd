//! 测试辅助工具
//!
//! 内存文件系统上的 solution、记录命令的 shell 和内存控制台。

#![allow(dead_code)]

use parking_lot::Mutex;
use qbuild_core::engine::{ShellExecutor, ShellOutput};
use qbuild_core::{BuildContext, BuildOptions, EvalResult, FunctionProvider, MemoryConsole, Project};
use qbuild_vfs::solution::{SolutionDir, SolutionRegistry};
use qbuild_vfs::{MemoryFileSystem, VirtualFileSystem};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// solution 根目录映射到的真实目录
pub const ROOT: &str = "/work";

/// 记录命令的 shell
///
/// 认识几条命令：`touch <file>` 在内存文件系统中写文件，`fail` 返回 1，
/// `echo <text>` 输出文本，`sleep` 睡一会儿。执行期间统计并发数。
pub struct RecordingShell {
    fs: MemoryFileSystem,
    delay: Duration,
    commands: Mutex<Vec<String>>,
    running: AtomicUsize,
    peak: AtomicUsize,
    ttys: AtomicUsize,
}

impl RecordingShell {
    pub fn new(fs: MemoryFileSystem) -> Self {
        Self {
            fs,
            delay: Duration::from_millis(0),
            commands: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            ttys: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, millis: u64) -> Self {
        self.delay = Duration::from_millis(millis);
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.commands.lock().iter().filter(|c| *c == command).count()
    }

    /// 同时运行的命令数的最大值
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// 以终端模式执行的命令数
    pub fn tty_runs(&self) -> usize {
        self.ttys.load(Ordering::SeqCst)
    }
}

impl ShellExecutor for RecordingShell {
    fn run(&self, command: &str, cwd: &str, tty: bool) -> std::io::Result<ShellOutput> {
        self.commands.lock().push(command.to_string());
        if tty {
            self.ttys.fetch_add(1, Ordering::SeqCst);
        }
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        let mut result = ShellOutput::default();
        let (program, rest) = command.split_once(' ').unwrap_or((command, ""));
        match program {
            "touch" => {
                for file in rest.split_whitespace() {
                    let path = if file.starts_with('/') {
                        file.to_string()
                    } else {
                        format!("{cwd}{file}")
                    };
                    self.fs.touch(Path::new(&path)).ok();
                }
            }
            "fail" => {
                result.code = 1;
                result.output = "boom\n".to_string();
            }
            "echo" => result.output = format!("{rest}\n"),
            "sleep" => thread::sleep(self.delay),
            _ => {}
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(result)
    }
}

/// 内存中的一棵源码树和它的 solution
pub struct Fixture {
    pub fs: MemoryFileSystem,
    pub registry: Arc<SolutionRegistry>,
    pub console: Arc<MemoryConsole>,
    pub shell: Arc<RecordingShell>,
}

impl Fixture {
    /// `files` 的路径相对 [`ROOT`]
    pub fn new(files: &[(&str, &str)]) -> Self {
        Self::with_shell(files, RecordingShell::new)
    }

    pub fn with_shell(
        files: &[(&str, &str)],
        shell: impl FnOnce(MemoryFileSystem) -> RecordingShell,
    ) -> Self {
        let fs = MemoryFileSystem::new();
        for (path, content) in files {
            let path = if path.starts_with('/') {
                path.to_string()
            } else {
                format!("{ROOT}/{path}")
            };
            fs.write_file(Path::new(&path), content.as_bytes()).unwrap();
        }
        fs.create_dir_all(Path::new(ROOT)).unwrap();
        let registry = SolutionRegistry::new(Arc::new(fs.clone()), "qbuild.pro");
        registry.create("default", vec![SolutionDir::new("", ROOT)]);
        Self {
            shell: Arc::new(shell(fs.clone())),
            fs,
            registry,
            console: Arc::new(MemoryConsole::new()),
        }
    }

    pub fn context(&self) -> Arc<BuildContext> {
        self.context_with(BuildOptions::default(), Vec::new())
    }

    pub fn context_with(
        &self,
        options: BuildOptions,
        providers: Vec<Arc<dyn FunctionProvider>>,
    ) -> Arc<BuildContext> {
        let mut builder = BuildContext::builder(Arc::clone(&self.registry))
            .options(options)
            .console(self.console.clone())
            .shell(self.shell.clone());
        for provider in providers {
            builder = builder.provider(provider);
        }
        builder.build()
    }

    pub fn open(&self, ctx: &Arc<BuildContext>, node: &str) -> EvalResult<Arc<Project>> {
        ctx.open(node)
    }

    /// 把文件的修改时间推到最新
    pub fn touch(&self, path: &str) {
        self.fs
            .touch(Path::new(&format!("{ROOT}/{path}")))
            .unwrap();
    }

    pub fn exists(&self, path: &str) -> bool {
        self.fs.exists(Path::new(&format!("{ROOT}/{path}")))
    }
}

/// 安静的选项：不打印 "Opening project"
pub fn quiet_options() -> BuildOptions {
    BuildOptions {
        silent: true,
        ..BuildOptions::default()
    }
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
