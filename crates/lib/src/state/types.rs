//! Persisted dependency records.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::DEPS_STORE_VERSION;

/// Headers discovered for one (target, source) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
  pub headers: BTreeSet<PathBuf>,
  /// Newest modification time among the source and its headers when the
  /// scan ran. `None` if none of them could be stat'ed.
  pub stamp: Option<SystemTime>,
}

impl DependencyRecord {
  pub fn new(headers: BTreeSet<PathBuf>, stamp: Option<SystemTime>) -> Self {
    Self { headers, stamp }
  }
}

/// On-disk layout of `deps.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyFile {
  pub version: u32,
  /// Keyed by `source@target`.
  pub records: BTreeMap<String, DependencyRecord>,
}

impl Default for DependencyFile {
  fn default() -> Self {
    Self {
      version: DEPS_STORE_VERSION,
      records: BTreeMap::new(),
    }
  }
}

#[derive(Debug, Error)]
pub enum StateError {
  #[error("failed to create state directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to read dependency store: {0}")]
  Read(#[source] io::Error),

  #[error("failed to write dependency store: {0}")]
  Write(#[source] io::Error),

  #[error("failed to parse dependency store: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize dependency store: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("unsupported dependency store version {0}, run `kiln clean` to reset it")]
  UnsupportedVersion(u32),
}
