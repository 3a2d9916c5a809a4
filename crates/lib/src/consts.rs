//! Names and defaults shared across the crate.

/// Build file looked up in the working directory when none is given.
pub const BUILD_FILE_NAME: &str = "kiln.toml";

pub const DEFAULT_CC: &str = "gcc";
pub const DEFAULT_CXX: &str = "g++";
pub const DEFAULT_AR: &str = "ar";

pub const DEFAULT_OBJECT_ROOT: &str = "build/obj";
pub const DEFAULT_STATE_DIR: &str = "build/.kiln";

pub const OBJECT_EXTENSION: &str = "o";

/// Dependency store file inside the state directory.
pub const DEPS_FILENAME: &str = "deps.json";

/// Bumped whenever the dependency store layout changes.
pub const DEPS_STORE_VERSION: u32 = 1;
