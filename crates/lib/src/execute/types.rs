//! Types for build execution.
//!
//! This module defines the error types, per-task and per-target reports, and
//! the configuration for running a build.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::config::{ConfigError, TaskKey, UnsupportedSourceKind};
use crate::consts::DEFAULT_STATE_DIR;
use crate::invocation::FlagMerge;
use crate::scan::ScanError;
use crate::stale::StaleReason;
use crate::state::{BuildLockError, StateError};

/// Errors that can occur during build execution.
#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  UnsupportedSourceKind(#[from] UnsupportedSourceKind),

  #[error(transparent)]
  Scan(#[from] ScanError),

  /// The compiler exited non-zero.
  #[error("compile failed with exit code {code:?}: {cmd}")]
  CompileFailed {
    cmd: String,
    code: Option<i32>,
    stderr: String,
  },

  /// The linker or archiver exited non-zero.
  #[error("link failed with exit code {code:?}: {cmd}")]
  LinkFailed {
    cmd: String,
    code: Option<i32>,
    stderr: String,
  },

  /// The process could not be started.
  #[error("failed to start `{cmd}`: {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: std::io::Error,
  },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error(transparent)]
  State(#[from] StateError),

  #[error(transparent)]
  Lock(#[from] BuildLockError),

  #[error("build task panicked: {0}")]
  TaskPanicked(String),
}

impl ExecuteError {
  /// Captured stderr of the failed process, if any.
  pub fn stderr(&self) -> Option<&str> {
    match self {
      ExecuteError::CompileFailed { stderr, .. } | ExecuteError::LinkFailed { stderr, .. } => Some(stderr),
      ExecuteError::Scan(ScanError::Failed { stderr, .. }) => Some(stderr),
      _ => None,
    }
  }
}

/// Identifies one node of the task graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskId {
  Compile(TaskKey),
  Link(String),
}

impl TaskId {
  pub fn target(&self) -> &str {
    match self {
      TaskId::Compile(key) => &key.target,
      TaskId::Link(target) => target,
    }
  }

  pub fn is_link(&self) -> bool {
    matches!(self, TaskId::Link(_))
  }
}

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TaskId::Compile(key) => write!(f, "{}", key),
      TaskId::Link(target) => write!(f, "link@{}", target),
    }
  }
}

impl Serialize for TaskId {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

/// Outcome of one compile or link task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
  /// The process ran and succeeded.
  Success,
  UpToDate,
  ScanFailed,
  CompileFailed,
  LinkFailed,
  /// Not started because another task of the same target failed.
  Skipped,
}

impl TaskStatus {
  pub fn is_failure(self) -> bool {
    matches!(
      self,
      TaskStatus::ScanFailed | TaskStatus::CompileFailed | TaskStatus::LinkFailed | TaskStatus::Skipped
    )
  }
}

impl fmt::Display for TaskStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      TaskStatus::Success => "success",
      TaskStatus::UpToDate => "up to date",
      TaskStatus::ScanFailed => "scan failed",
      TaskStatus::CompileFailed => "compile failed",
      TaskStatus::LinkFailed => "link failed",
      TaskStatus::Skipped => "skipped",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
  Built,
  UpToDate,
  Failed,
}

impl fmt::Display for TargetStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      TargetStatus::Built => "built",
      TargetStatus::UpToDate => "up to date",
      TargetStatus::Failed => "failed",
    };
    f.write_str(s)
  }
}

fn serialize_display<T: fmt::Display, S: Serializer>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error> {
  match value {
    Some(value) => serializer.collect_str(value),
    None => serializer.serialize_none(),
  }
}

/// Result of a single task.
#[derive(Debug, Serialize)]
pub struct TaskReport {
  pub id: TaskId,
  pub status: TaskStatus,
  /// Why the task ran, when it did.
  #[serde(serialize_with = "serialize_display")]
  pub reason: Option<StaleReason>,
  /// Rendered command line of the process that ran (or failed to).
  pub invocation: Option<String>,
  pub exit_code: Option<i32>,
  #[serde(serialize_with = "serialize_display")]
  pub error: Option<ExecuteError>,
  /// Whether a dependency scan ran for this task.
  pub scanned: bool,
}

impl TaskReport {
  pub fn new(id: TaskId, status: TaskStatus) -> Self {
    Self {
      id,
      status,
      reason: None,
      invocation: None,
      exit_code: None,
      error: None,
      scanned: false,
    }
  }

  /// Whether an external compiler, linker or archiver process was started.
  pub fn invoked(&self) -> bool {
    matches!(
      self.status,
      TaskStatus::Success | TaskStatus::CompileFailed | TaskStatus::LinkFailed
    ) && self.invocation.is_some()
  }
}

/// Result of a whole build.
#[derive(Debug, Default, Serialize)]
pub struct BuildReport {
  /// Task reports in graph order.
  pub tasks: Vec<TaskReport>,
  pub targets: BTreeMap<String, TargetStatus>,
}

impl BuildReport {
  /// Returns true if no target failed.
  pub fn is_success(&self) -> bool {
    self.targets.values().all(|s| *s != TargetStatus::Failed)
  }

  pub fn task(&self, id: &TaskId) -> Option<&TaskReport> {
    self.tasks.iter().find(|t| &t.id == id)
  }

  pub fn compile(&self, target: &str, source: &str) -> Option<&TaskReport> {
    self.task(&TaskId::Compile(TaskKey::new(target, Path::new(source))))
  }

  pub fn link(&self, target: &str) -> Option<&TaskReport> {
    self.task(&TaskId::Link(target.to_string()))
  }

  pub fn target(&self, name: &str) -> Option<TargetStatus> {
    self.targets.get(name).copied()
  }

  pub fn count(&self, status: TaskStatus) -> usize {
    self.tasks.iter().filter(|t| t.status == status).count()
  }

  /// Number of compiler, linker and archiver processes started.
  pub fn invocations(&self) -> usize {
    self.tasks.iter().filter(|t| t.invoked()).count()
  }

  pub fn failures(&self) -> impl Iterator<Item = &TaskReport> {
    self.tasks.iter().filter(|t| t.status.is_failure() && t.status != TaskStatus::Skipped)
  }
}

/// Configuration for build execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Directory every process runs in; relative paths resolve against it.
  pub root: PathBuf,

  /// Holds the dependency store and the build lock.
  pub state_dir: PathBuf,

  /// Maximum number of processes running at once.
  pub parallelism: usize,

  pub flag_merge: FlagMerge,

  /// Treat resolvable library files as link inputs.
  pub track_libraries: bool,

  /// Caller-supplied flags appended to every compile.
  pub extra_flags: Vec<String>,
}

impl ExecuteConfig {
  pub fn new(root: &Path) -> Self {
    Self {
      root: root.to_path_buf(),
      state_dir: root.join(DEFAULT_STATE_DIR),
      parallelism: num_cpus(),
      flag_merge: FlagMerge::default(),
      track_libraries: false,
      extra_flags: Vec::new(),
    }
  }
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self::new(Path::new("."))
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
