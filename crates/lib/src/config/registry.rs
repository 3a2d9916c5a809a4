//! Named registry of build targets.
//!
//! The registry is populated once by the configuration layer and then handed
//! to the task graph builder. It is never mutated while a build runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::types::{ConfigError, Defaults, Target, TargetDef};

#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
  defaults: Defaults,
  targets: BTreeMap<String, Arc<Target>>,
}

impl TargetRegistry {
  pub fn new(defaults: Defaults) -> Self {
    Self {
      defaults,
      targets: BTreeMap::new(),
    }
  }

  pub fn defaults(&self) -> &Defaults {
    &self.defaults
  }

  /// Register a target, replacing any earlier target with the same name.
  ///
  /// Returns the replaced target, if any.
  pub fn register(&mut self, def: TargetDef) -> Result<Option<Arc<Target>>, ConfigError> {
    if def.name.is_empty() {
      return Err(ConfigError::EmptyName);
    }
    if def.name.contains('@') {
      return Err(ConfigError::InvalidTargetName(def.name));
    }

    let target = Arc::new(def.resolve(&self.defaults));
    debug!(target = %target.name, sources = target.sources.len(), "registered target");

    let replaced = self.targets.insert(target.name.clone(), target);
    if let Some(ref old) = replaced {
      warn!(target = %old.name, "target registered twice, keeping the last definition");
    }
    Ok(replaced)
  }

  /// Register a target, failing if the name is already taken.
  pub fn try_register(&mut self, def: TargetDef) -> Result<Arc<Target>, ConfigError> {
    if self.targets.contains_key(&def.name) {
      return Err(ConfigError::DuplicateTarget(def.name));
    }
    let name = def.name.clone();
    self.register(def)?;
    self.get(&name).ok_or(ConfigError::UnknownTarget(name))
  }

  pub fn get(&self, name: &str) -> Option<Arc<Target>> {
    self.targets.get(name).cloned()
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.targets.keys().map(String::as_str)
  }

  pub fn targets(&self) -> impl Iterator<Item = &Arc<Target>> {
    self.targets.values()
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }

  /// Targets named in `names`, or every target when `names` is empty.
  pub fn select(&self, names: &[String]) -> Result<Vec<Arc<Target>>, ConfigError> {
    if names.is_empty() {
      return Ok(self.targets.values().cloned().collect());
    }

    let mut selected = Vec::new();
    for name in names {
      let target = self.get(name).ok_or_else(|| ConfigError::UnknownTarget(name.clone()))?;
      if !selected.iter().any(|t: &Arc<Target>| t.name == target.name) {
        selected.push(target);
      }
    }
    Ok(selected)
  }
}
