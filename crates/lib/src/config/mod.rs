//! Configuration model.
//!
//! Targets are described with [`TargetDef`], resolved against [`Defaults`] and
//! kept in an explicit [`TargetRegistry`] that the task graph builder reads.
//!
//! # Submodules
//!
//! - [`file`] - `kiln.toml` loader producing a registry and execution settings
//! - [`registry`] - the named target registry

pub mod file;
pub mod registry;
mod types;

pub use file::BuildFile;
pub use registry::TargetRegistry;
pub use types::*;
