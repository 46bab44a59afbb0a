//! Utility modules for the mirror synchronizer.

pub mod errors;
pub mod logger;

pub use errors::{MirrorError, Result};
