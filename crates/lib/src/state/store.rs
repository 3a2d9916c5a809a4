//! Dependency state store.
//!
//! # Storage Layout
//!
//! ```text
//! {state_dir}/
//! ├── .lock        # BuildLock
//! └── deps.json    # DependencyFile: version + records keyed by source@target
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::types::{DependencyFile, DependencyRecord, StateError};
use crate::config::TaskKey;
use crate::consts::{DEPS_FILENAME, DEPS_STORE_VERSION};

/// In-memory view of `deps.json`, shared between concurrent tasks.
///
/// Every read and write goes through one mutex, so writes for the same key are
/// serialized. Nothing reaches disk until [`DependencyStore::save`].
#[derive(Debug)]
pub struct DependencyStore {
  path: PathBuf,
  records: Mutex<BTreeMap<String, DependencyRecord>>,
}

impl DependencyStore {
  /// An empty store that will be saved under `state_dir`.
  pub fn new(state_dir: &Path) -> Self {
    Self {
      path: state_dir.join(DEPS_FILENAME),
      records: Mutex::new(BTreeMap::new()),
    }
  }

  /// Load the store from `state_dir`, or start empty if it does not exist yet.
  pub fn load(state_dir: &Path) -> Result<Self, StateError> {
    let store = Self::new(state_dir);

    let content = match fs::read_to_string(&store.path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(store),
      Err(e) => return Err(StateError::Read(e)),
    };

    let file: DependencyFile = serde_json::from_str(&content).map_err(StateError::Parse)?;
    if file.version != DEPS_STORE_VERSION {
      return Err(StateError::UnsupportedVersion(file.version));
    }

    debug!(path = ?store.path, records = file.records.len(), "loaded dependency store");
    *store.lock() = file.records;
    Ok(store)
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn lock(&self) -> MutexGuard<'_, BTreeMap<String, DependencyRecord>> {
    // Records are plain data; a panic elsewhere cannot leave one half-written.
    self.records.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn get(&self, key: &TaskKey) -> Option<DependencyRecord> {
    self.lock().get(&key.to_string()).cloned()
  }

  /// Store a record, returning the one it replaced.
  pub fn put(&self, key: &TaskKey, record: DependencyRecord) -> Option<DependencyRecord> {
    self.lock().insert(key.to_string(), record)
  }

  pub fn remove(&self, key: &TaskKey) -> Option<DependencyRecord> {
    self.lock().remove(&key.to_string())
  }

  /// Drop every record belonging to `target`.
  pub fn remove_target(&self, target: &str) -> usize {
    let mut records = self.lock();
    let before = records.len();
    records.retain(|key, _| key.rsplit_once('@').is_none_or(|(_, owner)| owner != target));
    before - records.len()
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  /// Write the store to disk.
  ///
  /// Uses atomic write (write to temp, then rename) to prevent corruption.
  pub fn save(&self) -> Result<(), StateError> {
    let file = DependencyFile {
      version: DEPS_STORE_VERSION,
      records: self.lock().clone(),
    };

    if let Some(dir) = self.path.parent() {
      fs::create_dir_all(dir).map_err(StateError::CreateDir)?;
    }

    let temp_path = self.path.with_extension("json.tmp");
    let content = serde_json::to_string_pretty(&file).map_err(StateError::Serialize)?;
    fs::write(&temp_path, &content).map_err(StateError::Write)?;
    fs::rename(&temp_path, &self.path).map_err(StateError::Write)?;

    debug!(path = ?self.path, records = file.records.len(), "saved dependency store");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeSet;
  use std::time::{Duration, SystemTime};

  use tempfile::TempDir;

  use super::*;

  fn key(target: &str, source: &str) -> TaskKey {
    TaskKey::new(target, Path::new(source))
  }

  fn record(headers: &[&str]) -> DependencyRecord {
    DependencyRecord::new(
      headers.iter().map(PathBuf::from).collect::<BTreeSet<_>>(),
      Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000)),
    )
  }

  #[test]
  fn missing_file_loads_empty() {
    let temp = TempDir::new().unwrap();
    let store = DependencyStore::load(temp.path()).unwrap();
    assert!(store.is_empty());
  }

  #[test]
  fn records_survive_save_and_load() {
    let temp = TempDir::new().unwrap();
    let store = DependencyStore::new(temp.path());
    store.put(&key("main", "src/b.cpp"), record(&["src/common.h"]));
    store.save().unwrap();

    let loaded = DependencyStore::load(temp.path()).unwrap();
    assert_eq!(loaded.get(&key("main", "src/b.cpp")), Some(record(&["src/common.h"])));
    assert!(!temp.path().join("deps.json.tmp").exists());
  }

  #[test]
  fn same_source_in_two_targets_is_two_records() {
    let temp = TempDir::new().unwrap();
    let store = DependencyStore::new(temp.path());
    store.put(&key("main", "a.cpp"), record(&["main.h"]));
    store.put(&key("ut", "a.cpp"), record(&["ut.h"]));

    assert_eq!(store.len(), 2);
    store.remove(&key("main", "a.cpp"));
    assert_eq!(store.get(&key("ut", "a.cpp")), Some(record(&["ut.h"])));
  }

  #[test]
  fn remove_target_only_touches_that_target() {
    let temp = TempDir::new().unwrap();
    let store = DependencyStore::new(temp.path());
    store.put(&key("main", "a.cpp"), record(&[]));
    store.put(&key("main", "b.cpp"), record(&[]));
    store.put(&key("ut", "a.cpp"), record(&[]));

    assert_eq!(store.remove_target("main"), 2);
    assert_eq!(store.len(), 1);
  }

  #[test]
  fn remove_target_matches_whole_target_name() {
    let temp = TempDir::new().unwrap();
    let store = DependencyStore::new(temp.path());
    store.put(&key("main", "a.cpp"), record(&[]));
    store.put(&key("submain", "a.cpp"), record(&[]));
    store.put(&key("ut", "x@main.cpp"), record(&[]));

    assert_eq!(store.remove_target("main"), 1);
    assert!(store.get(&key("submain", "a.cpp")).is_some());
    assert!(store.get(&key("ut", "x@main.cpp")).is_some());
  }

  #[test]
  fn unsupported_version_is_rejected() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(DEPS_FILENAME), r#"{"version": 99, "records": {}}"#).unwrap();

    let err = DependencyStore::load(temp.path()).unwrap_err();
    assert!(matches!(err, StateError::UnsupportedVersion(99)));
  }

  #[test]
  fn corrupt_file_is_a_parse_error() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(DEPS_FILENAME), "not json").unwrap();

    assert!(matches!(DependencyStore::load(temp.path()), Err(StateError::Parse(_))));
  }
}
