//! Staleness decisions for compile and link tasks.
//!
//! Two levels of gating keep rebuilds cheap:
//!
//! - a source is only re-scanned when it, or one of its recorded headers, is
//!   newer than the record's stamp;
//! - an object is only recompiled when the source or a current header is newer
//!   than the object, or the scan in this build changed the header set.
//!
//! All modification times come through [`FileStamps`], so the rules can be
//! tested with synthetic clocks.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::Target;
use crate::platform;
use crate::state::DependencyRecord;

/// Source of file modification times.
pub trait FileStamps: Send + Sync + 'static {
  /// Modification time of `path`, `None` if it does not exist.
  fn modified(&self, path: &Path) -> Option<SystemTime>;

  fn exists(&self, path: &Path) -> bool {
    self.modified(path).is_some()
  }
}

/// Reads modification times from disk, resolving relative paths against a
/// project root.
#[derive(Debug, Clone)]
pub struct Filesystem {
  root: PathBuf,
}

impl Filesystem {
  pub fn new(root: &Path) -> Self {
    Self {
      root: root.to_path_buf(),
    }
  }
}

impl FileStamps for Filesystem {
  fn modified(&self, path: &Path) -> Option<SystemTime> {
    std::fs::metadata(self.root.join(path)).and_then(|m| m.modified()).ok()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
  MissingOutput,
  MissingSource,
  SourceNewer,
  HeaderNewer(PathBuf),
  MissingHeader(PathBuf),
  /// The scan in this build produced a different header set.
  DependenciesChanged,
  ObjectNewer(PathBuf),
  LibraryNewer(PathBuf),
  /// A compile task of the target ran in this build.
  Recompiled,
}

impl fmt::Display for StaleReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StaleReason::MissingOutput => write!(f, "output missing"),
      StaleReason::MissingSource => write!(f, "source missing"),
      StaleReason::SourceNewer => write!(f, "source changed"),
      StaleReason::HeaderNewer(path) => write!(f, "header {} changed", path.display()),
      StaleReason::MissingHeader(path) => write!(f, "header {} missing", path.display()),
      StaleReason::DependenciesChanged => write!(f, "dependencies changed"),
      StaleReason::ObjectNewer(path) => write!(f, "object {} changed", path.display()),
      StaleReason::LibraryNewer(path) => write!(f, "library {} changed", path.display()),
      StaleReason::Recompiled => write!(f, "objects recompiled"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
  Fresh,
  Stale(StaleReason),
}

impl Staleness {
  pub fn is_stale(&self) -> bool {
    matches!(self, Staleness::Stale(_))
  }

  pub fn reason(&self) -> Option<&StaleReason> {
    match self {
      Staleness::Fresh => None,
      Staleness::Stale(reason) => Some(reason),
    }
  }
}

fn newer(input: Option<SystemTime>, than: SystemTime) -> bool {
  input.is_some_and(|t| t > than)
}

/// Newest modification time among `source` and `headers`.
pub fn record_stamp(stamps: &impl FileStamps, source: &Path, headers: &BTreeSet<PathBuf>) -> Option<SystemTime> {
  std::iter::once(source)
    .chain(headers.iter().map(PathBuf::as_path))
    .filter_map(|p| stamps.modified(p))
    .max()
}

/// Whether `source` needs a fresh dependency scan.
pub fn needs_rescan(stamps: &impl FileStamps, source: &Path, record: Option<&DependencyRecord>) -> bool {
  let Some(record) = record else {
    return true;
  };
  let Some(stamp) = record.stamp else {
    return true;
  };

  match stamps.modified(source) {
    None => return true,
    Some(t) if t > stamp => return true,
    Some(_) => {}
  }

  record.headers.iter().any(|header| match stamps.modified(header) {
    None => true,
    Some(t) => t > stamp,
  })
}

/// Whether the object for `source` must be rebuilt.
///
/// `headers` is the current header set, after any rescan in this build;
/// `dependencies_changed` says whether that rescan produced a different set.
pub fn compile_staleness(
  stamps: &impl FileStamps,
  source: &Path,
  object: &Path,
  headers: &BTreeSet<PathBuf>,
  dependencies_changed: bool,
) -> Staleness {
  let Some(object_time) = stamps.modified(object) else {
    return Staleness::Stale(StaleReason::MissingOutput);
  };

  match stamps.modified(source) {
    None => return Staleness::Stale(StaleReason::MissingSource),
    Some(t) if t > object_time => return Staleness::Stale(StaleReason::SourceNewer),
    Some(_) => {}
  }

  for header in headers {
    match stamps.modified(header) {
      None => return Staleness::Stale(StaleReason::MissingHeader(header.clone())),
      Some(t) if t > object_time => return Staleness::Stale(StaleReason::HeaderNewer(header.clone())),
      Some(_) => {}
    }
  }

  if dependencies_changed {
    return Staleness::Stale(StaleReason::DependenciesChanged);
  }

  Staleness::Fresh
}

/// Whether the target's artifact must be relinked.
pub fn link_staleness(
  stamps: &impl FileStamps,
  output: &Path,
  objects: &[PathBuf],
  recompiled: bool,
  libraries: &[PathBuf],
) -> Staleness {
  let Some(output_time) = stamps.modified(output) else {
    return Staleness::Stale(StaleReason::MissingOutput);
  };

  if recompiled {
    return Staleness::Stale(StaleReason::Recompiled);
  }

  if let Some(object) = objects.iter().find(|o| newer(stamps.modified(o), output_time)) {
    return Staleness::Stale(StaleReason::ObjectNewer(object.clone()));
  }

  if let Some(library) = libraries.iter().find(|l| newer(stamps.modified(l), output_time)) {
    return Staleness::Stale(StaleReason::LibraryNewer(library.clone()));
  }

  Staleness::Fresh
}

/// Library files the linker would pick for the target's `-l` names.
///
/// Each name resolves to the first existing candidate across the library
/// search directories; names that resolve to nothing (system libraries) are
/// left out.
pub fn resolve_libraries(stamps: &impl FileStamps, target: &Target) -> Vec<PathBuf> {
  target
    .libraries
    .iter()
    .filter_map(|name| {
      let candidates = platform::library_file_names(name);
      target.library_dirs.iter().find_map(|dir| {
        candidates
          .iter()
          .map(|file| Path::new(dir).join(file))
          .find(|path| stamps.exists(path))
      })
    })
    .collect()
}
