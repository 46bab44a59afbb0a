//! Sync jobs and the per-file decision rule.

use crate::remote::RemoteFile;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A job as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Remote directory, e.g. `/releases/amd64/autobuilds/`
    pub remote: String,

    /// Local directory relative to the mirror root
    pub local: String,

    /// Glob matched against remote file names
    pub pattern: String,

    /// Present when the fetched file is a latest-version pointer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<PointerSpec>,
}

/// Follow-up job parameterized by the directory a pointer file names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerSpec {
    /// Pointer file name inside the job's local directory (defaults to the
    /// job's pattern, which is then a literal name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Pattern for the dependent job inside the named directory
    pub pattern: String,
}

impl JobSpec {
    pub fn new(remote: &str, local: &str, pattern: &str) -> Self {
        Self {
            remote: remote.to_string(),
            local: local.to_string(),
            pattern: pattern.to_string(),
            pointer: None,
        }
    }

    pub fn with_pointer(mut self, pattern: &str) -> Self {
        self.pointer = Some(PointerSpec {
            file: None,
            pattern: pattern.to_string(),
        });
        self
    }

    pub fn job(&self) -> SyncJob {
        SyncJob::new(&self.remote, &self.local, &self.pattern)
    }

    /// Name of the pointer file, if this job fetches one.
    pub fn pointer_file(&self) -> Option<&str> {
        self.pointer
            .as_ref()
            .map(|p| p.file.as_deref().unwrap_or(&self.pattern))
    }

    /// The job that syncs `version_dir` below this job's directories.
    pub fn dependent_job(&self, version_dir: &str) -> Option<SyncJob> {
        let pointer = self.pointer.as_ref()?;
        let remote = format!("{}/{}/", self.remote.trim_end_matches('/'), version_dir);
        let local = format!("{}/{}/", self.local.trim_end_matches('/'), version_dir);
        Some(SyncJob::new(&remote, &local, &pointer.pattern))
    }
}

/// One (remote directory, local directory, pattern) unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub remote_directory: String,
    /// Relative to the mirror root
    pub local_directory: PathBuf,
    pub name_pattern: String,
}

impl SyncJob {
    pub fn new(remote_directory: &str, local_directory: &str, name_pattern: &str) -> Self {
        Self {
            remote_directory: remote_directory.to_string(),
            local_directory: PathBuf::from(local_directory),
            name_pattern: name_pattern.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReason {
    New,
    Size,
    Mtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Fetch(FetchReason),
    Unchanged,
}

/// Decide what to do with one remote file.
///
/// Checks run in a fixed order: existence, then size, then the recorded
/// mtime token. A size mismatch never consults the ledger.
pub fn decide(local_size: Option<u64>, recorded_mtime: Option<&str>, remote: &RemoteFile) -> Decision {
    let Some(local_size) = local_size else {
        return Decision::Fetch(FetchReason::New);
    };
    if local_size != remote.size {
        return Decision::Fetch(FetchReason::Size);
    }
    if recorded_mtime != Some(remote.mtime.as_str()) {
        return Decision::Fetch(FetchReason::Mtime);
    }
    Decision::Unchanged
}
