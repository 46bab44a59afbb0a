//! Custom error types for the mirror synchronizer.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("You're not allowed to execute this run")]
    Authorization,

    #[error("Could not change to remote directory {path}: {reason}")]
    RemoteDirectory { path: String, reason: String },

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error at {path}: {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to resolve latest pointer {path}: {reason}")]
    PointerResolution { path: PathBuf, reason: String },

    #[error("Incomplete transfer of {name}: expected {expected} bytes, got {actual}")]
    IncompleteTransfer {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("Another run holds the lock at {0}")]
    Locked(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid name pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

impl MirrorError {
    /// Wrap an I/O error with the local path it concerns.
    pub fn local(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MirrorError::LocalIo {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, MirrorError>;
