//! Declarative build file (`kiln.toml`).
//!
//! The file is plain data: global defaults, reusable source groups, and
//! targets. Every relative path in it is relative to the directory holding
//! the file, which is also the working directory of every compiler and
//! linker invocation.
//!
//! ```toml
//! [defaults]
//! cxx = "clang++"
//! object_root = "obj/build"
//!
//! [groups.core]
//! sources = ["src/a.cpp", { path = "src/b.cpp", flags = ["-DYES"] }]
//!
//! [targets.main]
//! groups = ["core"]
//! flags = ["-DMAIN"]
//!
//! [targets.ut]
//! groups = ["core"]
//! sources = ["ut/ut.cpp"]
//! flags = ["-DUT"]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use super::registry::TargetRegistry;
use super::types::{ArtifactKind, ConfigError, Defaults, EnvPolicy, Language, ObjectLayout, SourceFile, TargetDef, Toolchain};
use crate::consts::{DEFAULT_OBJECT_ROOT, DEFAULT_STATE_DIR};
use crate::execute::ExecuteConfig;
use crate::invocation::FlagMerge;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildFile {
  #[serde(default)]
  pub defaults: DefaultsSection,
  #[serde(default)]
  pub groups: BTreeMap<String, GroupSection>,
  #[serde(default)]
  pub targets: BTreeMap<String, TargetSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultsSection {
  pub cc: Option<String>,
  pub cxx: Option<String>,
  pub ar: Option<String>,
  pub object_root: Option<PathBuf>,
  pub state_dir: Option<PathBuf>,
  pub parallelism: Option<usize>,
  pub flag_merge: Option<FlagMerge>,
  pub track_libraries: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupSection {
  #[serde(default)]
  pub sources: Vec<SourceEntry>,
}

/// A source given either as a bare path or with per-file overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SourceEntry {
  Path(PathBuf),
  Detailed(SourceFile),
}

impl From<&SourceEntry> for SourceFile {
  fn from(entry: &SourceEntry) -> Self {
    match entry {
      SourceEntry::Path(path) => SourceFile::new(path.clone()),
      SourceEntry::Detailed(source) => source.clone(),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutName {
  #[default]
  Flat,
  Mirror,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSection {
  #[serde(default)]
  pub kind: ArtifactKind,
  /// Source groups whose files come first, in the listed order.
  #[serde(default)]
  pub groups: Vec<String>,
  #[serde(default)]
  pub sources: Vec<SourceEntry>,
  #[serde(default)]
  pub flags: Vec<String>,
  #[serde(default)]
  pub include_dirs: Vec<String>,
  #[serde(default)]
  pub libraries: Vec<String>,
  #[serde(default)]
  pub library_dirs: Vec<String>,
  #[serde(default)]
  pub link_flags: Vec<String>,
  pub output: Option<PathBuf>,
  pub object_dir: Option<PathBuf>,
  #[serde(default)]
  pub layout: LayoutName,
  /// Base directory for the mirror layout (defaults to the build file directory).
  pub base_dir: Option<PathBuf>,
  pub cc: Option<String>,
  pub cxx: Option<String>,
  pub ar: Option<String>,
  #[serde(default)]
  pub extensions: BTreeMap<String, Language>,
  #[serde(default)]
  pub env: EnvPolicy,
}

impl BuildFile {
  /// Read and parse a build file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::parse(&content, path)
  }

  /// Parse build file text; `path` is only used in error messages.
  pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
    toml::from_str(content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Registry defaults: file settings first, then `CC`/`CXX`/`AR`, then built-ins.
  pub fn defaults(&self) -> Defaults {
    let env = Toolchain::from_env();
    let section = &self.defaults;
    Defaults {
      toolchain: Toolchain {
        cc: section.cc.clone().unwrap_or(env.cc),
        cxx: section.cxx.clone().unwrap_or(env.cxx),
        ar: section.ar.clone().unwrap_or(env.ar),
      },
      object_root: section
        .object_root
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OBJECT_ROOT)),
    }
  }

  /// Build a registry holding every target in the file.
  ///
  /// Group references are expanded here; a target naming a missing group is
  /// a configuration error.
  pub fn to_registry(&self) -> Result<TargetRegistry, ConfigError> {
    let defaults = self.defaults();
    let mut registry = TargetRegistry::new(defaults.clone());

    for (name, section) in &self.targets {
      let mut sources: Vec<SourceFile> = Vec::new();
      for group in &section.groups {
        let entries = self.groups.get(group).ok_or_else(|| ConfigError::UnknownGroup {
          target: name.clone(),
          group: group.clone(),
        })?;
        sources.extend(entries.sources.iter().map(SourceFile::from));
      }
      sources.extend(section.sources.iter().map(SourceFile::from));

      let toolchain = if section.cc.is_some() || section.cxx.is_some() || section.ar.is_some() {
        Some(Toolchain {
          cc: section.cc.clone().unwrap_or_else(|| defaults.toolchain.cc.clone()),
          cxx: section.cxx.clone().unwrap_or_else(|| defaults.toolchain.cxx.clone()),
          ar: section.ar.clone().unwrap_or_else(|| defaults.toolchain.ar.clone()),
        })
      } else {
        None
      };

      let layout = match section.layout {
        LayoutName::Flat => ObjectLayout::Flat,
        LayoutName::Mirror => ObjectLayout::Mirror {
          base: section.base_dir.clone().unwrap_or_else(|| PathBuf::from(".")),
        },
      };

      let def = TargetDef {
        name: name.clone(),
        sources,
        kind: section.kind,
        flags: section.flags.clone(),
        include_dirs: section.include_dirs.clone(),
        libraries: section.libraries.clone(),
        library_dirs: section.library_dirs.clone(),
        link_flags: section.link_flags.clone(),
        output: section.output.clone(),
        object_dir: section.object_dir.clone(),
        layout,
        toolchain,
        extensions: section.extensions.clone(),
        env: section.env.clone(),
      };

      registry.try_register(def)?;
    }

    debug!(targets = registry.len(), groups = self.groups.len(), "loaded build file");
    Ok(registry)
  }

  /// Execution settings for a build rooted at `root`.
  pub fn execute_config(&self, root: &Path) -> ExecuteConfig {
    let section = &self.defaults;
    let mut config = ExecuteConfig::new(root);
    config.state_dir = root.join(
      section
        .state_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR)),
    );
    if let Some(parallelism) = section.parallelism {
      config.parallelism = parallelism.max(1);
    }
    if let Some(flag_merge) = section.flag_merge {
      config.flag_merge = flag_merge;
    }
    if let Some(track) = section.track_libraries {
      config.track_libraries = track;
    }
    config
  }
}
