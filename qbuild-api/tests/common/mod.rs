//! 测试辅助工具

#![allow(dead_code)]

use parking_lot::Mutex;
use qbuild_api::{BuildOptions, MemoryConsole, QBuild, RunConfig};
use qbuild_core::engine::{ShellExecutor, ShellOutput};
use qbuild_vfs::{MemoryFileSystem, VirtualFileSystem};
use std::path::Path;
use std::sync::Arc;

pub const ROOT: &str = "/work";

/// `touch` 在内存文件系统里建文件，`fail` 返回 1，其余命令什么都不做
pub struct TouchShell {
    fs: MemoryFileSystem,
    commands: Mutex<Vec<String>>,
}

impl TouchShell {
    pub fn new(fs: MemoryFileSystem) -> Self {
        Self {
            fs,
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }
}

impl ShellExecutor for TouchShell {
    fn run(&self, command: &str, cwd: &str, _: bool) -> std::io::Result<ShellOutput> {
        self.commands.lock().push(command.to_string());
        let mut output = ShellOutput::default();
        match command.split_once(' ') {
            Some(("touch", files)) => {
                for file in files.split_whitespace() {
                    self.fs.touch(Path::new(&format!("{cwd}{file}"))).ok();
                }
            }
            _ if command == "fail" => output.code = 1,
            _ => {}
        }
        Ok(output)
    }
}

/// 内存文件系统上的一棵源码树
pub struct Workspace {
    pub fs: MemoryFileSystem,
    pub console: Arc<MemoryConsole>,
    pub shell: Arc<TouchShell>,
}

impl Workspace {
    /// `files` 的路径相对 [`ROOT`]
    pub fn new(files: &[(&str, &str)]) -> Self {
        let fs = MemoryFileSystem::new();
        fs.create_dir_all(Path::new(ROOT)).unwrap();
        for (path, content) in files {
            fs.write_file(Path::new(&format!("{ROOT}/{path}")), content.as_bytes())
                .unwrap();
        }
        Self {
            shell: Arc::new(TouchShell::new(fs.clone())),
            console: Arc::new(MemoryConsole::new()),
            fs,
        }
    }

    pub fn config(&self, options: BuildOptions) -> RunConfig {
        RunConfig::new(options)
            .with_console(self.console.clone())
            .with_shell(self.shell.clone())
    }

    /// 在 `ROOT` 下的 `dir` 中开始会话
    pub fn session(&self, dir: &str) -> QBuild {
        let cwd = if dir.is_empty() {
            ROOT.to_string()
        } else {
            format!("{ROOT}/{dir}")
        };
        QBuild::open_directory(Arc::new(self.fs.clone()), &cwd, self.config(quiet()))
            .unwrap()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.fs.exists(Path::new(&format!("{ROOT}/{path}")))
    }
}

pub fn quiet() -> BuildOptions {
    BuildOptions {
        silent: true,
        ..BuildOptions::default()
    }
}
