//! Change detection and transfer for one mirrored directory.

pub mod engine;
pub mod job;

pub use engine::{SyncEngine, SyncReport};
pub use job::{decide, Decision, FetchReason, JobSpec, PointerSpec, SyncJob};
