//! Mirror Sync Library
//!
//! Replicates selected remote file-server paths into a local tree, fetching
//! only files that are new or changed according to a ledger of remote
//! modification tokens, and prunes files that aged out of the mirror.

pub mod config;
pub mod events;
pub mod ledger;
pub mod lock;
pub mod orchestrator;
pub mod pointer;
pub mod remote;
pub mod retention;
pub mod sync;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use orchestrator::{Orchestrator, RunSummary};
pub use utils::errors::MirrorError;
pub type Result<T> = std::result::Result<T, MirrorError>;
