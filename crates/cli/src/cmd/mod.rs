mod build;
mod clean;
mod plan;
mod targets;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use kiln_lib::config::{BuildFile, TargetRegistry};
use kiln_lib::execute::ExecuteConfig;

pub use build::{BuildArgs, cmd_build};
pub use clean::cmd_clean;
pub use plan::cmd_plan;
pub use targets::cmd_targets;

/// A loaded build file plus everything derived from it.
pub struct Project {
  pub registry: TargetRegistry,
  pub config: ExecuteConfig,
}

/// Load `file` and resolve its targets. Relative paths in the build file are
/// relative to the directory containing it.
pub fn load_project(file: &Path) -> Result<Project> {
  let build_file = BuildFile::load(file).with_context(|| format!("Failed to load build file: {}", file.display()))?;

  let parent = match file.parent() {
    Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
    _ => PathBuf::from("."),
  };
  let root = dunce::canonicalize(&parent).with_context(|| format!("Failed to resolve {}", parent.display()))?;

  let registry = build_file.to_registry().context("Invalid build file")?;
  let config = build_file.execute_config(&root);
  debug!(root = %root.display(), targets = registry.len(), "loaded build file");

  Ok(Project { registry, config })
}
