//! Types describing build targets and their sources.
//!
//! A [`TargetDef`] is what the configuration layer hands in: every optional
//! field may be left unset. Registering it resolves those fields against the
//! registry [`Defaults`] and produces an immutable [`Target`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{DEFAULT_AR, DEFAULT_CC, DEFAULT_CXX, DEFAULT_OBJECT_ROOT, OBJECT_EXTENSION};
use crate::platform;

/// Errors raised while assembling targets into a buildable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// A target with this name is already registered.
  #[error("duplicate target: {0}")]
  DuplicateTarget(String),

  /// A target name was selected that is not registered.
  #[error("unknown target: {0}")]
  UnknownTarget(String),

  /// A target references a source group that does not exist.
  #[error("target {target} references unknown source group: {group}")]
  UnknownGroup { target: String, group: String },

  /// Target names are used in object paths and task keys.
  #[error("target name must not be empty")]
  EmptyName,

  /// `@` separates source and target in task keys.
  #[error("target name must not contain '@': {0}")]
  InvalidTargetName(String),

  /// A target has nothing to compile.
  #[error("target {0} has no sources")]
  NoSources(String),

  /// Structure-replicating layout needs every source under its base directory.
  #[error("source {} of target {target} is not under base directory {}", path.display(), base.display())]
  OutsideBaseDir {
    target: String,
    path: PathBuf,
    base: PathBuf,
  },

  /// Two compile tasks would write the same object file.
  #[error("object path collision at {}: {first} and {second}", path.display())]
  ObjectPathCollision {
    path: PathBuf,
    first: TaskKey,
    second: TaskKey,
  },

  /// The build file could not be read.
  #[error("failed to read build file {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The build file is not valid TOML or has an unexpected shape.
  #[error("failed to parse build file {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

/// A source file whose extension is not mapped to any language.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported source kind: {} (extension {extension:?})", path.display())]
pub struct UnsupportedSourceKind {
  pub path: PathBuf,
  pub extension: Option<String>,
}

/// Compiler family of a translation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
  C,
  #[serde(alias = "c++", alias = "cpp")]
  Cxx,
}

impl fmt::Display for Language {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Language::C => write!(f, "c"),
      Language::Cxx => write!(f, "c++"),
    }
  }
}

/// Extension map every target starts from.
pub fn default_extensions() -> BTreeMap<String, Language> {
  let mut map = BTreeMap::new();
  map.insert("c".to_string(), Language::C);
  for ext in ["cc", "cpp", "cxx", "c++"] {
    map.insert(ext.to_string(), Language::Cxx);
  }
  map
}

/// Toolchain binaries used for a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolchain {
  pub cc: String,
  pub cxx: String,
  pub ar: String,
}

impl Default for Toolchain {
  fn default() -> Self {
    Self {
      cc: DEFAULT_CC.to_string(),
      cxx: DEFAULT_CXX.to_string(),
      ar: DEFAULT_AR.to_string(),
    }
  }
}

impl Toolchain {
  /// Default toolchain with `CC`, `CXX` and `AR` from the environment taking precedence.
  pub fn from_env() -> Self {
    let defaults = Self::default();
    Self {
      cc: std::env::var("CC").unwrap_or(defaults.cc),
      cxx: std::env::var("CXX").unwrap_or(defaults.cxx),
      ar: std::env::var("AR").unwrap_or(defaults.ar),
    }
  }

  pub fn compiler(&self, language: Language) -> &str {
    match language {
      Language::C => &self.cc,
      Language::Cxx => &self.cxx,
    }
  }
}

/// Where object files are placed inside a target's object directory.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObjectLayout {
  /// All objects directly in the object directory.
  #[default]
  Flat,
  /// Objects mirror the source's directory relative to `base`.
  Mirror { base: PathBuf },
}

/// What the link step produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
  #[default]
  Executable,
  StaticLibrary,
}

/// Environment handed to compiler and linker processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvPolicy {
  /// Start from the parent process environment.
  #[serde(default = "default_true")]
  pub inherit: bool,
  /// Variables set on top of (or instead of) the inherited environment.
  #[serde(default)]
  pub vars: BTreeMap<String, String>,
}

impl Default for EnvPolicy {
  fn default() -> Self {
    Self {
      inherit: true,
      vars: BTreeMap::new(),
    }
  }
}

fn default_true() -> bool {
  true
}

/// A translation unit plus its per-file overrides.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceFile {
  pub path: PathBuf,
  #[serde(default)]
  pub include_dirs: Vec<String>,
  #[serde(default)]
  pub flags: Vec<String>,
}

impl SourceFile {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      include_dirs: Vec::new(),
      flags: Vec::new(),
    }
  }

  pub fn with_flags<I, S>(mut self, flags: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.flags.extend(flags.into_iter().map(Into::into));
    self
  }

  pub fn with_include_dirs<I, S>(mut self, dirs: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.include_dirs.extend(dirs.into_iter().map(Into::into));
    self
  }

  pub fn extension(&self) -> Option<&str> {
    self.path.extension().and_then(|e| e.to_str())
  }
}

impl From<&str> for SourceFile {
  fn from(path: &str) -> Self {
    SourceFile::new(path)
  }
}

impl fmt::Display for SourceFile {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", posix(&self.path))
  }
}

/// Identity of a compile task: one source compiled for one target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskKey {
  pub target: String,
  pub source: PathBuf,
}

impl TaskKey {
  pub fn new(target: &str, source: &Path) -> Self {
    Self {
      target: target.to_string(),
      source: source.to_path_buf(),
    }
  }
}

impl fmt::Display for TaskKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}@{}", posix(&self.source), self.target)
  }
}

/// Process-independent settings that unset target fields fall back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
  pub toolchain: Toolchain,
  /// Each target's objects go to `<object_root>/<target name>` unless it sets its own directory.
  pub object_root: PathBuf,
}

impl Default for Defaults {
  fn default() -> Self {
    Self {
      toolchain: Toolchain::default(),
      object_root: PathBuf::from(DEFAULT_OBJECT_ROOT),
    }
  }
}

impl Defaults {
  pub fn from_env() -> Self {
    Self {
      toolchain: Toolchain::from_env(),
      ..Self::default()
    }
  }
}

/// A target as described by the configuration layer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TargetDef {
  pub name: String,
  pub sources: Vec<SourceFile>,
  pub kind: ArtifactKind,
  pub flags: Vec<String>,
  pub include_dirs: Vec<String>,
  pub libraries: Vec<String>,
  pub library_dirs: Vec<String>,
  pub link_flags: Vec<String>,
  pub output: Option<PathBuf>,
  pub object_dir: Option<PathBuf>,
  pub layout: ObjectLayout,
  pub toolchain: Option<Toolchain>,
  /// Added to (and overriding entries of) the default extension map.
  pub extensions: BTreeMap<String, Language>,
  pub env: EnvPolicy,
}

impl TargetDef {
  pub fn new(name: &str) -> Self {
    Self {
      name: name.to_string(),
      ..Self::default()
    }
  }

  pub fn source(mut self, source: impl Into<SourceFile>) -> Self {
    self.sources.push(source.into());
    self
  }

  pub fn flag(mut self, flag: &str) -> Self {
    self.flags.push(flag.to_string());
    self
  }

  pub fn include_dir(mut self, dir: &str) -> Self {
    self.include_dirs.push(dir.to_string());
    self
  }

  pub fn library(mut self, name: &str) -> Self {
    self.libraries.push(name.to_string());
    self
  }

  pub fn library_dir(mut self, dir: &str) -> Self {
    self.library_dirs.push(dir.to_string());
    self
  }

  pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
    self.output = Some(path.into());
    self
  }

  pub fn object_dir(mut self, path: impl Into<PathBuf>) -> Self {
    self.object_dir = Some(path.into());
    self
  }

  pub fn layout(mut self, layout: ObjectLayout) -> Self {
    self.layout = layout;
    self
  }

  pub fn kind(mut self, kind: ArtifactKind) -> Self {
    self.kind = kind;
    self
  }

  pub fn toolchain(mut self, toolchain: Toolchain) -> Self {
    self.toolchain = Some(toolchain);
    self
  }

  /// Fill every unset field from `defaults`.
  pub fn resolve(self, defaults: &Defaults) -> Target {
    let output = self.output.unwrap_or_else(|| match self.kind {
      ArtifactKind::Executable => PathBuf::from(format!("{}{}", self.name, platform::exe_suffix())),
      ArtifactKind::StaticLibrary => PathBuf::from(platform::static_library_name(&self.name)),
    });
    let object_dir = self
      .object_dir
      .unwrap_or_else(|| defaults.object_root.join(&self.name));

    let mut extensions = default_extensions();
    extensions.extend(
      self
        .extensions
        .into_iter()
        .map(|(ext, lang)| (ext.trim_start_matches('.').to_string(), lang)),
    );

    Target {
      name: self.name,
      sources: self.sources,
      kind: self.kind,
      flags: self.flags,
      include_dirs: self.include_dirs,
      libraries: self.libraries,
      library_dirs: self.library_dirs,
      link_flags: self.link_flags,
      output,
      object_dir,
      layout: self.layout,
      toolchain: self.toolchain.unwrap_or_else(|| defaults.toolchain.clone()),
      extensions,
      env: self.env,
    }
  }
}

/// A registered target with every setting resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
  pub name: String,
  pub sources: Vec<SourceFile>,
  pub kind: ArtifactKind,
  pub flags: Vec<String>,
  pub include_dirs: Vec<String>,
  pub libraries: Vec<String>,
  pub library_dirs: Vec<String>,
  pub link_flags: Vec<String>,
  pub output: PathBuf,
  pub object_dir: PathBuf,
  pub layout: ObjectLayout,
  pub toolchain: Toolchain,
  pub extensions: BTreeMap<String, Language>,
  pub env: EnvPolicy,
}

impl Target {
  /// Language of a source, looked up by its file extension.
  pub fn language_of(&self, source: &SourceFile) -> Result<Language, UnsupportedSourceKind> {
    source
      .extension()
      .and_then(|ext| self.extensions.get(ext))
      .copied()
      .ok_or_else(|| UnsupportedSourceKind {
        path: source.path.clone(),
        extension: source.extension().map(str::to_string),
      })
  }

  pub fn compiler_for(&self, source: &SourceFile) -> Result<&str, UnsupportedSourceKind> {
    Ok(self.toolchain.compiler(self.language_of(source)?))
  }

  /// The C++ driver links the whole target if any source is C++.
  pub fn linker(&self) -> &str {
    let has_cxx = self
      .sources
      .iter()
      .any(|s| matches!(self.language_of(s), Ok(Language::Cxx)));
    if has_cxx { &self.toolchain.cxx } else { &self.toolchain.cc }
  }

  pub fn task_key(&self, source: &SourceFile) -> TaskKey {
    TaskKey::new(&self.name, &source.path)
  }

  /// Object file written by compiling `source` for this target.
  pub fn object_path(&self, source: &SourceFile) -> Result<PathBuf, ConfigError> {
    let dir = match &self.layout {
      ObjectLayout::Flat => self.object_dir.clone(),
      ObjectLayout::Mirror { base } => {
        let parent = source.path.parent().unwrap_or_else(|| Path::new(""));
        let relative = strip_base(parent, base).ok_or_else(|| ConfigError::OutsideBaseDir {
          target: self.name.clone(),
          path: source.path.clone(),
          base: base.clone(),
        })?;
        self.object_dir.join(relative)
      }
    };

    let file_name = source.path.file_name().map(PathBuf::from).unwrap_or_default();
    Ok(dir.join(file_name).with_extension(OBJECT_EXTENSION))
  }

  /// Object files of every source, in declared source order.
  pub fn objects(&self) -> Result<Vec<PathBuf>, ConfigError> {
    self.sources.iter().map(|s| self.object_path(s)).collect()
  }
}

/// `parent` relative to `base`, treating `.` and an empty path as the same root.
fn strip_base<'a>(parent: &'a Path, base: &Path) -> Option<&'a Path> {
  let parent = parent.strip_prefix(".").unwrap_or(parent);
  let base = base.strip_prefix(".").unwrap_or(base);
  parent.strip_prefix(base).ok()
}

fn posix(path: &Path) -> String {
  path.to_string_lossy().replace('\\', "/")
}
