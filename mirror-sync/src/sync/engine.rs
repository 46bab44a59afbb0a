//! Sync engine: reconciles one local directory against its remote source.
//!
//! For every remote file matching the job's pattern the engine decides
//! between fetching and keeping the local copy (see [`decide`]). Local
//! filesystem timestamps are never used to detect change; they are only
//! refreshed so that the retention sweeper sees the file as alive.

use super::job::{decide, Decision, FetchReason, SyncJob};
use crate::events::{EventSink, SyncEvent};
use crate::ledger::{KeyBy, Ledger};
use crate::remote::{RemoteFile, RemoteSource};
use crate::transfer::progress::{format_bytes, format_speed, TransferTimer};
use crate::utils::errors::{MirrorError, Result};
use filetime::FileTime;
use glob::Pattern;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Outcome of one job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub new_files: usize,
    pub changed_files: usize,
    pub unchanged_files: usize,
    pub bytes_fetched: u64,
}

impl SyncReport {
    pub fn fetched_files(&self) -> usize {
        self.new_files + self.changed_files
    }

    pub fn merge(&mut self, other: &SyncReport) {
        self.new_files += other.new_files;
        self.changed_files += other.changed_files;
        self.unchanged_files += other.unchanged_files;
        self.bytes_fetched += other.bytes_fetched;
    }
}

pub struct SyncEngine<'a> {
    root: PathBuf,
    key_by: KeyBy,
    remote: &'a dyn RemoteSource,
}

impl<'a> SyncEngine<'a> {
    pub fn new(root: impl Into<PathBuf>, key_by: KeyBy, remote: &'a dyn RemoteSource) -> Self {
        Self {
            root: root.into(),
            key_by,
            remote,
        }
    }

    pub fn local_dir(&self, job: &SyncJob) -> PathBuf {
        self.root.join(&job.local_directory)
    }

    /// Mirror one job.
    ///
    /// A remote directory that cannot be entered aborts the job with
    /// `MirrorError::RemoteDirectory`; callers treat that as fatal for the run.
    pub async fn sync(
        &self,
        job: &SyncJob,
        ledger: &mut Ledger,
        events: &mut dyn EventSink,
    ) -> Result<SyncReport> {
        info!(
            remote = %job.remote_directory,
            local = %job.local_directory.display(),
            pattern = %job.name_pattern,
            "Syncing from {}",
            self.remote.label()
        );

        let pattern = Pattern::new(&job.name_pattern)?;
        let local_dir = self.local_dir(job);
        self.ensure_local_dir(job, &local_dir, events).await?;

        let remote_files = match self.remote.list(&job.remote_directory, &pattern).await {
            Ok(files) => files,
            Err(e) => {
                let message = match &e {
                    MirrorError::RemoteDirectory { path, .. } => format!("could not change to {path}"),
                    other => other.to_string(),
                };
                events.emit(SyncEvent::Error(message));
                return Err(e);
            }
        };
        debug!("{} remote files match {}", remote_files.len(), job.name_pattern);

        let mut report = SyncReport::default();
        for remote_file in &remote_files {
            self.reconcile(job, remote_file, &local_dir, ledger, events, &mut report)
                .await?;
        }

        info!(
            "Synced {}: {} new, {} changed, {} unchanged, {} fetched",
            job.remote_directory,
            report.new_files,
            report.changed_files,
            report.unchanged_files,
            format_bytes(report.bytes_fetched)
        );

        Ok(report)
    }

    async fn ensure_local_dir(
        &self,
        job: &SyncJob,
        local_dir: &Path,
        events: &mut dyn EventSink,
    ) -> Result<()> {
        if tokio::fs::metadata(local_dir).await.is_ok_and(|m| m.is_dir()) {
            return Ok(());
        }
        match tokio::fs::create_dir_all(local_dir).await {
            Ok(()) => {
                events.emit(SyncEvent::CreatedDir(job.local_directory.clone()));
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(MirrorError::local(local_dir, e)),
        }
    }

    async fn reconcile(
        &self,
        job: &SyncJob,
        remote_file: &RemoteFile,
        local_dir: &Path,
        ledger: &mut Ledger,
        events: &mut dyn EventSink,
        report: &mut SyncReport,
    ) -> Result<()> {
        let local_path = local_dir.join(&remote_file.name);
        let key = self.key_by.key_for(&self.root, &local_path);

        let local_size = match tokio::fs::metadata(&local_path).await {
            Ok(metadata) if metadata.is_file() => Some(metadata.len()),
            Ok(_) => None,
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(MirrorError::local(&local_path, e)),
        };
        let recorded = ledger.find(&key).map(str::to_string);

        match decide(local_size, recorded.as_deref(), remote_file) {
            Decision::Unchanged => {
                touch(&local_path).await?;
                report.unchanged_files += 1;
                events.emit(SyncEvent::Unchanged(remote_file.name.clone()));
            }
            Decision::Fetch(reason) => {
                report.bytes_fetched += self.fetch(job, remote_file, &local_path).await?;

                match reason {
                    FetchReason::New => {
                        ledger.append(&key, &remote_file.mtime)?;
                        report.new_files += 1;
                        events.emit(SyncEvent::NewFile(remote_file.name.clone()));
                    }
                    FetchReason::Size | FetchReason::Mtime => {
                        report.changed_files += 1;
                        events.emit(if reason == FetchReason::Size {
                            SyncEvent::ChangedSize(remote_file.name.clone())
                        } else {
                            SyncEvent::ChangedMtime {
                                name: remote_file.name.clone(),
                                recorded,
                                remote: remote_file.mtime.clone(),
                            }
                        });
                        if !ledger.replace(&key, &remote_file.mtime)? {
                            events.emit(SyncEvent::LostMtime {
                                key,
                                remote_mtime: remote_file.mtime.clone(),
                            });
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Download into a hidden sibling, then rename over the local copy.
    async fn fetch(
        &self,
        job: &SyncJob,
        remote_file: &RemoteFile,
        local_path: &Path,
    ) -> Result<u64> {
        let temp_path = local_path.with_file_name(format!(".{}.part", remote_file.name));
        let timer = TransferTimer::start();

        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| MirrorError::local(&temp_path, e))?;
        let retrieved = self
            .remote
            .retrieve(&job.remote_directory, &remote_file.name, &mut file)
            .await;
        let result = match retrieved {
            Ok(written) => file
                .sync_all()
                .await
                .map(|_| written)
                .map_err(|e| MirrorError::local(&temp_path, e)),
            Err(e) => Err(e),
        };
        drop(file);

        let written = match result {
            Ok(written) if written == remote_file.size => written,
            Ok(written) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(MirrorError::IncompleteTransfer {
                    name: remote_file.name.clone(),
                    expected: remote_file.size,
                    actual: written,
                });
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(e);
            }
        };

        tokio::fs::rename(&temp_path, local_path)
            .await
            .map_err(|e| MirrorError::local(local_path, e))?;

        info!(
            "Fetched {} ({}, {})",
            remote_file.name,
            format_bytes(written),
            format_speed(timer.rate(written))
        );
        Ok(written)
    }
}

/// Set the mtime of `path` to now.
async fn touch(path: &Path) -> Result<()> {
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || filetime::set_file_mtime(&target, FileTime::now()))
        .await
        .map_err(std::io::Error::from)
        .and_then(|touched| touched)
        .map_err(|e| MirrorError::local(path, e))
}
