//! Rendering of compiler and linker command lines.
//!
//! Every invocation is an argv array plus an environment policy; nothing is
//! ever passed through a shell. The rendered form ([`Invocation`]'s
//! `Display`) is only used for logs and reports.
//!
//! # Flag merging
//!
//! Compile flags are the union of target-wide flags, per-file flags and any
//! caller-supplied flags. Two policies exist:
//!
//! - [`FlagMerge::Ordered`] keeps the first occurrence of each flag in the
//!   order target, file, caller. Safe for order-sensitive flags such as
//!   `-Wall -Wno-unused` or `-O0 -O2`.
//! - [`FlagMerge::Sorted`] treats the flags as a set and emits them sorted.
//!   This loses relative order, so `-O2 -O0` and `-O0 -O2` render the same;
//!   only use it with independent boolean-style flags and defines.
//!
//! Include directories are always deduplicated and sorted so invocation
//! strings are reproducible.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{ArtifactKind, EnvPolicy, SourceFile, Target, UnsupportedSourceKind};
use crate::platform;

/// How target, per-file and caller flags are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagMerge {
  /// Insert if absent, preserving first-occurrence order.
  #[default]
  Ordered,
  /// Set semantics, emitted in sorted order.
  Sorted,
}

/// A fully rendered external process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
  pub program: String,
  pub args: Vec<String>,
  pub env: EnvPolicy,
  pub cwd: Option<PathBuf>,
}

impl Invocation {
  pub fn new(program: &str) -> Self {
    Self {
      program: program.to_string(),
      args: Vec::new(),
      env: EnvPolicy::default(),
      cwd: None,
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn with_env(mut self, env: EnvPolicy) -> Self {
    self.env = env;
    self
  }

  pub fn with_cwd(mut self, cwd: &Path) -> Self {
    self.cwd = Some(cwd.to_path_buf());
    self
  }
}

impl fmt::Display for Invocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", quote(&self.program))?;
    for arg in &self.args {
      write!(f, " {}", quote(arg))?;
    }
    Ok(())
  }
}

/// Quote an argument for display when it would not survive word splitting.
fn quote(arg: &str) -> String {
  let plain = !arg.is_empty()
    && arg
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || "-_./=+:,@%^".contains(c));
  if plain {
    arg.to_string()
  } else {
    format!("'{}'", arg.replace('\'', r"'\''"))
  }
}

/// Merge flag lists according to `policy`; duplicates are always dropped.
pub fn merge_flags(lists: &[&[String]], policy: FlagMerge) -> Vec<String> {
  match policy {
    FlagMerge::Ordered => {
      let mut seen = BTreeSet::new();
      let mut merged = Vec::new();
      for flag in lists.iter().flat_map(|l| l.iter()) {
        if seen.insert(flag.as_str()) {
          merged.push(flag.clone());
        }
      }
      merged
    }
    FlagMerge::Sorted => lists
      .iter()
      .flat_map(|l| l.iter().cloned())
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect(),
  }
}

/// Target-wide plus per-file include directories, deduplicated and sorted.
pub fn merge_include_dirs(target: &Target, source: &SourceFile) -> Vec<String> {
  target
    .include_dirs
    .iter()
    .chain(source.include_dirs.iter())
    .cloned()
    .collect::<BTreeSet<_>>()
    .into_iter()
    .collect()
}

fn include_args(target: &Target, source: &SourceFile) -> impl Iterator<Item = String> {
  merge_include_dirs(target, source)
    .into_iter()
    .map(|dir| format!("-I{}", dir))
}

fn path_arg(path: &Path) -> String {
  path.to_string_lossy().to_string()
}

/// `<compiler> -MM <source> -I<dir>...`
pub fn scan_invocation(target: &Target, source: &SourceFile) -> Result<Invocation, UnsupportedSourceKind> {
  let compiler = target.compiler_for(source)?;
  Ok(
    Invocation::new(compiler)
      .arg("-MM")
      .arg(path_arg(&source.path))
      .args(include_args(target, source))
      .with_env(target.env.clone()),
  )
}

/// `<compiler> -c -o <object> <flags> -I<dir>... <source>`
pub fn compile_invocation(
  target: &Target,
  source: &SourceFile,
  object: &Path,
  extra_flags: &[String],
  policy: FlagMerge,
) -> Result<Invocation, UnsupportedSourceKind> {
  let compiler = target.compiler_for(source)?;
  let flags = merge_flags(&[&target.flags, &source.flags, extra_flags], policy);

  Ok(
    Invocation::new(compiler)
      .arg("-c")
      .arg("-o")
      .arg(path_arg(object))
      .args(flags)
      .args(include_args(target, source))
      .arg(path_arg(&source.path))
      .with_env(target.env.clone()),
  )
}

/// Link (or archive) the target's objects, given in declared source order.
pub fn link_invocation(target: &Target, objects: &[PathBuf]) -> Invocation {
  match target.kind {
    ArtifactKind::StaticLibrary => Invocation::new(&target.toolchain.ar)
      .arg("rcs")
      .arg(path_arg(&target.output))
      .args(objects.iter().map(|o| path_arg(o)))
      .with_env(target.env.clone()),
    ArtifactKind::Executable => {
      let mut invocation = Invocation::new(target.linker())
        .arg("-o")
        .arg(path_arg(&target.output))
        .args(objects.iter().map(|o| path_arg(o)))
        .args(target.library_dirs.iter().map(|d| format!("-L{}", d)));

      if !target.libraries.is_empty() {
        let libs = target.libraries.iter().map(|l| format!("-l{}", l));
        // Grouping lets mutually dependent static archives resolve in any order.
        invocation = if platform::supports_link_groups() {
          invocation.arg("-Wl,--start-group").args(libs).arg("-Wl,--end-group")
        } else {
          invocation.args(libs)
        };
      }

      invocation.args(target.link_flags.iter().cloned()).with_env(target.env.clone())
    }
  }
}
