//! kiln-lib: incremental C/C++ build orchestration.
//!
//! This crate turns target descriptions into compiler and linker invocations
//! and decides which of them need to run:
//! - `config`: targets, sources, toolchains and the `kiln.toml` loader
//! - `scan`: header dependency discovery through the compiler
//! - `stale`: staleness rules for compile and link tasks
//! - `invocation`: deterministic argv rendering
//! - `execute`: the task graph and the parallel scheduler
//! - `state`: persisted dependency records and the build lock

pub mod config;
pub mod consts;
pub mod execute;
pub mod invocation;
pub mod platform;
pub mod scan;
pub mod stale;
pub mod state;
#[cfg(test)]
mod util;
