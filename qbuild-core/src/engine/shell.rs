use std::io;
use std::process::{Command, Stdio};

/// 命令的退出码和合并后的输出
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOutput {
    pub code: i32,
    pub output: String,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// 执行 shell 命令的能力
pub trait ShellExecutor: Send + Sync {
    /// 在 `cwd` 中同步运行 `command`
    ///
    /// `tty` 为真时继承终端，不捕获输出。
    fn run(&self, command: &str, cwd: &str, tty: bool) -> io::Result<ShellOutput>;
}

/// `/bin/sh -c`，stderr 合并进 stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShell;

impl ShellExecutor for SystemShell {
    fn run(&self, command: &str, cwd: &str, tty: bool) -> io::Result<ShellOutput> {
        let mut shell = Command::new("/bin/sh");
        shell.current_dir(cwd).stdin(Stdio::null());
        if tty {
            let status = shell
                .arg("-c")
                .arg(command)
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()?;
            return Ok(ShellOutput {
                code: status.code().unwrap_or(-1),
                output: String::new(),
            });
        }
        let output = shell
            .arg("-c")
            .arg(format!("exec 2>&1\n{command}"))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(ShellOutput {
            code: output.status.code().unwrap_or(-1),
            output: text,
        })
    }
}
