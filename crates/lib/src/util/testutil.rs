//! Test collaborators for kiln-lib.
//!
//! [`FakeFs`] is an in-memory file clock: every write or touch moves a logical
//! clock forward, so "newer than" comparisons never depend on the resolution
//! of the real filesystem. [`FakeScanner`] returns canned header sets and
//! [`FakeRunner`] pretends to compile and link by touching the output named by
//! `-o` (or `rcs`) in the fake filesystem.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use crate::config::{SourceFile, TaskKey, Target};
use crate::execute::runner::{CommandOutput, CommandRunner};
use crate::invocation::Invocation;
use crate::scan::{DependencyScanner, ScanError};
use crate::stale::FileStamps;

#[derive(Debug, Default)]
struct Clock {
  now: u64,
  files: HashMap<PathBuf, SystemTime>,
}

#[derive(Debug, Default)]
pub struct FakeFs {
  inner: Mutex<Clock>,
}

impl FakeFs {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  /// Create or update `path`, making it the newest file.
  pub fn touch(&self, path: impl AsRef<Path>) -> SystemTime {
    let mut clock = self.inner.lock().unwrap();
    clock.now += 1;
    let time = SystemTime::UNIX_EPOCH + Duration::from_secs(clock.now);
    clock.files.insert(path.as_ref().to_path_buf(), time);
    time
  }

  pub fn touch_all(&self, paths: &[&str]) {
    for path in paths {
      self.touch(path);
    }
  }

  pub fn remove(&self, path: impl AsRef<Path>) {
    self.inner.lock().unwrap().files.remove(path.as_ref());
  }
}

impl FileStamps for FakeFs {
  fn modified(&self, path: &Path) -> Option<SystemTime> {
    self.inner.lock().unwrap().files.get(path).copied()
  }
}

/// Returns configured header sets instead of running a compiler.
#[derive(Debug, Default)]
pub struct FakeScanner {
  headers: Mutex<HashMap<PathBuf, BTreeSet<PathBuf>>>,
  failing: Mutex<HashSet<PathBuf>>,
  calls: Mutex<Vec<TaskKey>>,
}

impl FakeScanner {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn set_headers(&self, source: &str, headers: &[&str]) {
    self
      .headers
      .lock()
      .unwrap()
      .insert(PathBuf::from(source), headers.iter().map(PathBuf::from).collect());
  }

  pub fn fail(&self, source: &str) {
    self.failing.lock().unwrap().insert(PathBuf::from(source));
  }

  pub fn calls(&self) -> Vec<TaskKey> {
    self.calls.lock().unwrap().clone()
  }

  pub fn scanned(&self) -> Vec<String> {
    self.calls().iter().map(ToString::to_string).collect()
  }

  pub fn clear(&self) {
    self.calls.lock().unwrap().clear();
  }
}

impl DependencyScanner for FakeScanner {
  async fn discover(&self, target: &Target, source: &SourceFile) -> Result<BTreeSet<PathBuf>, ScanError> {
    self.calls.lock().unwrap().push(target.task_key(source));

    if self.failing.lock().unwrap().contains(&source.path) {
      return Err(ScanError::Failed {
        cmd: format!("fake-scan {}", source),
        code: Some(1),
        stderr: format!("{}: fatal error", source),
      });
    }

    Ok(self.headers.lock().unwrap().get(&source.path).cloned().unwrap_or_default())
  }
}

/// Records invocations and touches their outputs in a [`FakeFs`].
#[derive(Debug)]
pub struct FakeRunner {
  fs: Arc<FakeFs>,
  failing: Mutex<HashSet<String>>,
  calls: Mutex<Vec<Invocation>>,
}

impl FakeRunner {
  pub fn new(fs: Arc<FakeFs>) -> Arc<Self> {
    Arc::new(Self {
      fs,
      failing: Mutex::new(HashSet::new()),
      calls: Mutex::new(Vec::new()),
    })
  }

  /// Make every invocation mentioning `arg` exit with code 1.
  pub fn fail_on(&self, arg: &str) {
    self.failing.lock().unwrap().insert(arg.to_string());
  }

  pub fn recover(&self) {
    self.failing.lock().unwrap().clear();
  }

  pub fn calls(&self) -> Vec<Invocation> {
    self.calls.lock().unwrap().clone()
  }

  /// Sources passed to compile invocations, in call order.
  pub fn compiled(&self) -> Vec<String> {
    self
      .calls()
      .iter()
      .filter(|inv| inv.args.first().map(String::as_str) == Some("-c"))
      .filter_map(|inv| inv.args.last().cloned())
      .collect()
  }

  /// Artifacts produced by link or archive invocations, in call order.
  pub fn linked(&self) -> Vec<String> {
    self
      .calls()
      .iter()
      .filter(|inv| inv.args.first().map(String::as_str) != Some("-c"))
      .filter_map(output_of)
      .collect()
  }

  pub fn clear(&self) {
    self.calls.lock().unwrap().clear();
  }
}

fn output_of(invocation: &Invocation) -> Option<String> {
  let args = &invocation.args;
  if args.first().map(String::as_str) == Some("rcs") {
    return args.get(1).cloned();
  }
  let pos = args.iter().position(|a| a == "-o")?;
  args.get(pos + 1).cloned()
}

impl CommandRunner for FakeRunner {
  async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
    self.calls.lock().unwrap().push(invocation.clone());

    let failing = self.failing.lock().unwrap().clone();
    if let Some(arg) = invocation.args.iter().find(|a| failing.contains(*a)) {
      return Ok(CommandOutput {
        code: Some(1),
        stdout: String::new(),
        stderr: format!("{}: error: expected ';'", arg),
      });
    }

    if let Some(output) = output_of(invocation) {
      self.fs.touch(output);
    }

    Ok(CommandOutput {
      code: Some(0),
      ..CommandOutput::default()
    })
  }
}

/// Replies to every invocation with the same output.
#[derive(Debug)]
pub struct ScriptedRunner {
  reply: CommandOutput,
  calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
  pub fn replying(reply: CommandOutput) -> Self {
    Self {
      reply,
      calls: Mutex::new(Vec::new()),
    }
  }

  pub fn calls(&self) -> Vec<Invocation> {
    self.calls.lock().unwrap().clone()
  }
}

impl CommandRunner for ScriptedRunner {
  async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
    self.calls.lock().unwrap().push(invocation.clone());
    Ok(self.reply.clone())
  }
}
