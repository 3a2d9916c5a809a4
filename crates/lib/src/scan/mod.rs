//! Header dependency discovery.
//!
//! A [`DependencyScanner`] asks the toolchain which headers a translation unit
//! includes. The production [`ToolchainScanner`] runs `<compiler> -MM` and
//! extracts header paths from the printed make rule.

mod parse;

use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{SourceFile, Target, UnsupportedSourceKind};
use crate::execute::runner::CommandRunner;
use crate::invocation::scan_invocation;

pub use parse::parse_headers;

#[derive(Debug, Error)]
pub enum ScanError {
  #[error(transparent)]
  UnsupportedSourceKind(#[from] UnsupportedSourceKind),

  #[error("failed to start dependency scan `{cmd}`: {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: std::io::Error,
  },

  #[error("dependency scan failed with exit code {code:?}: {cmd}")]
  Failed {
    cmd: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("could not parse dependency scan output of `{cmd}`")]
  Unparseable { cmd: String, output: String },
}

impl ScanError {
  /// The rendered scan command, when one was run.
  pub fn invocation(&self) -> Option<&str> {
    match self {
      ScanError::UnsupportedSourceKind(_) => None,
      ScanError::Spawn { cmd, .. } | ScanError::Failed { cmd, .. } | ScanError::Unparseable { cmd, .. } => {
        Some(cmd)
      }
    }
  }

  pub fn exit_code(&self) -> Option<i32> {
    match self {
      ScanError::Failed { code, .. } => *code,
      _ => None,
    }
  }
}

/// Discovers the headers a source file depends on.
pub trait DependencyScanner: Send + Sync + 'static {
  fn discover(
    &self,
    target: &Target,
    source: &SourceFile,
  ) -> impl Future<Output = Result<BTreeSet<PathBuf>, ScanError>> + Send;
}

/// Scanner backed by the target's compiler.
#[derive(Debug)]
pub struct ToolchainScanner<R> {
  runner: Arc<R>,
  cwd: PathBuf,
}

impl<R: CommandRunner> ToolchainScanner<R> {
  /// Scan commands run in `cwd`, so reported headers are relative to it.
  pub fn new(runner: Arc<R>, cwd: &Path) -> Self {
    Self {
      runner,
      cwd: cwd.to_path_buf(),
    }
  }
}

impl<R: CommandRunner> DependencyScanner for ToolchainScanner<R> {
  async fn discover(&self, target: &Target, source: &SourceFile) -> Result<BTreeSet<PathBuf>, ScanError> {
    let invocation = scan_invocation(target, source)?.with_cwd(&self.cwd);
    let cmd = invocation.to_string();
    debug!(target = %target.name, source = %source, cmd = %cmd, "scanning dependencies");

    let output = self
      .runner
      .run(&invocation)
      .await
      .map_err(|source| ScanError::Spawn {
        cmd: cmd.clone(),
        source,
      })?;

    if !output.success() {
      warn!(cmd = %cmd, code = ?output.code, "dependency scan failed");
      return Err(ScanError::Failed {
        cmd,
        code: output.code,
        stderr: output.stderr,
      });
    }

    match parse_headers(&output.stdout) {
      Some(headers) => {
        debug!(source = %source, headers = headers.len(), "dependencies discovered");
        Ok(headers)
      }
      None => Err(ScanError::Unparseable {
        cmd,
        output: output.stdout,
      }),
    }
  }
}
