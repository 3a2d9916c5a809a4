//! External process execution.
//!
//! Every compiler, archiver and dependency-scan call goes through a
//! [`CommandRunner`], so the scheduler can be driven by a fake in tests.

use std::future::Future;
use std::io;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::invocation::Invocation;

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
  /// Exit code, `None` when the process was killed by a signal.
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

impl CommandOutput {
  pub fn success(&self) -> bool {
    self.code == Some(0)
  }
}

/// Runs an [`Invocation`] to completion.
///
/// An `Err` means the process could not be started at all; a process that
/// ran and exited non-zero is reported through [`CommandOutput::code`].
pub trait CommandRunner: Send + Sync + 'static {
  fn run(&self, invocation: &Invocation) -> impl Future<Output = io::Result<CommandOutput>> + Send;
}

/// Runs invocations as real child processes, argv style with no shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
  async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
    let mut command = Command::new(&invocation.program);
    command
      .args(&invocation.args)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped());

    if !invocation.env.inherit {
      command.env_clear();
    }
    command.envs(&invocation.env.vars);

    if let Some(cwd) = &invocation.cwd {
      command.current_dir(cwd);
    }

    debug!(program = %invocation.program, args = ?invocation.args, "spawning process");

    let output = command.output().await?;
    let result = CommandOutput {
      code: output.status.code(),
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    if !result.stderr.is_empty() {
      debug!(stderr = %result.stderr.trim_end(), "process stderr");
    }

    Ok(result)
  }
}
