//! Retention sweeper.
//!
//! Deletes mirrored files that have not been confirmed or fetched within the
//! retention window, drops their ledger entries, and removes directories
//! that end up empty. The engine refreshes the mtime of every file it still
//! sees upstream, so only files that vanished upstream age out.

use crate::events::{EventSink, SyncEvent};
use crate::ledger::{KeyBy, Ledger};
use crate::utils::errors::{MirrorError, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

const SECS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted_files: usize,
    pub deleted_dirs: usize,
}

pub struct Sweeper {
    /// Mirror root; ledger keys and event paths are relative to it
    root: PathBuf,
    key_by: KeyBy,
    window: Duration,
    exempt: Vec<PathBuf>,
}

impl Sweeper {
    pub fn new(root: impl Into<PathBuf>, key_by: KeyBy, retention_days: u64) -> Self {
        Self {
            root: root.into(),
            key_by,
            window: Duration::from_secs(retention_days * SECS_PER_DAY),
            exempt: Vec::new(),
        }
    }

    /// Never delete `path`, whatever its age.
    pub fn exempt(mut self, path: impl Into<PathBuf>) -> Self {
        self.exempt.push(path.into());
        self
    }

    /// Sweep `tree` using the current time.
    pub fn sweep(
        &self,
        tree: &Path,
        ledger: &mut Ledger,
        events: &mut dyn EventSink,
    ) -> Result<SweepReport> {
        self.sweep_at(tree, SystemTime::now(), ledger, events)
    }

    /// Sweep `tree` as if the current time were `now`. The tree itself is
    /// never removed.
    pub fn sweep_at(
        &self,
        tree: &Path,
        now: SystemTime,
        ledger: &mut Ledger,
        events: &mut dyn EventSink,
    ) -> Result<SweepReport> {
        let cutoff = now.checked_sub(self.window).unwrap_or(SystemTime::UNIX_EPOCH);
        let mut report = SweepReport::default();

        if !tree.is_dir() {
            debug!("Nothing to sweep at {}", tree.display());
            return Ok(report);
        }

        self.sweep_dir(tree, true, cutoff, ledger, events, &mut report)?;

        info!(
            "Retention sweep of {}: {} files and {} directories deleted",
            tree.display(),
            report.deleted_files,
            report.deleted_dirs
        );
        Ok(report)
    }

    fn sweep_dir(
        &self,
        dir: &Path,
        is_tree_root: bool,
        cutoff: SystemTime,
        ledger: &mut Ledger,
        events: &mut dyn EventSink,
        report: &mut SweepReport,
    ) -> Result<()> {
        let entries = list_entries(dir)?;
        if entries.is_empty() {
            if !is_tree_root {
                self.remove_dir(dir, events, report)?;
            }
            return Ok(());
        }

        for entry in entries {
            let path = entry.path();

            // Directories are only pruned once empty, never by their own age.
            if entry.file_type().is_dir() {
                self.sweep_dir(path, false, cutoff, ledger, events, report)?;
                continue;
            }

            let modified = entry
                .metadata()
                .map_err(|e| MirrorError::local(path, e.into()))?
                .modified()
                .map_err(|e| MirrorError::local(path, e))?;
            if modified >= cutoff || self.exempt.iter().any(|p| p == path) {
                continue;
            }

            std::fs::remove_file(path).map_err(|e| MirrorError::local(path, e))?;
            ledger.delete(&self.key_by.key_for(&self.root, path))?;
            report.deleted_files += 1;
            events.emit(SyncEvent::DeletedFile(self.display_path(path)));
        }

        if !is_tree_root && list_entries(dir)?.is_empty() {
            self.remove_dir(dir, events, report)?;
        }

        Ok(())
    }

    fn remove_dir(
        &self,
        dir: &Path,
        events: &mut dyn EventSink,
        report: &mut SweepReport,
    ) -> Result<()> {
        std::fs::remove_dir(dir).map_err(|e| MirrorError::local(dir, e))?;
        report.deleted_dirs += 1;
        events.emit(SyncEvent::DeletedDir(self.display_path(dir)));
        Ok(())
    }

    fn display_path(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root).unwrap_or(path).to_path_buf()
    }
}

/// Immediate children of `dir`, without following symlinks.
fn list_entries(dir: &Path) -> Result<Vec<DirEntry>> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| entry.map_err(|e| MirrorError::local(dir, e.into())))
        .collect()
}
