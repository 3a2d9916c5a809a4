//! Build state kept between runs.
//!
//! # Submodules
//!
//! - [`store`] - dependency records keyed by `source@target`
//! - [`lock`] - advisory lock guarding the state directory

pub mod lock;
pub mod store;
mod types;

pub use lock::{BuildLock, BuildLockError, LockMode};
pub use store::DependencyStore;
pub use types::*;
