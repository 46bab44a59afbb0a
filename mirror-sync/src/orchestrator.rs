//! Job orchestrator - runs the configured jobs in order, then the sweeper.
//!
//! Jobs run strictly one after another because a pointer job must finish
//! before the versioned directory it names can be synced. Any failure ends
//! the run: there is no partial-success continuation and no retry, the next
//! scheduled run starts over.

use crate::config::Config;
use crate::events::{EventSink, SyncEvent};
use crate::ledger::Ledger;
use crate::lock::RunLock;
use crate::pointer::resolve_pointer;
use crate::remote::{self, RemoteSource};
use crate::retention::{SweepReport, Sweeper};
use crate::sync::{JobSpec, SyncEngine, SyncReport};
use crate::transfer::progress::{format_bytes, format_duration};
use crate::utils::errors::{MirrorError, Result};
use chrono::{DateTime, Utc};
use filetime::FileTime;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Outcome of a full run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub jobs_run: usize,
    pub sync: SyncReport,
    pub sweep: SweepReport,
    pub elapsed: Duration,
}

pub struct Orchestrator {
    config: Config,
    remote: Box<dyn RemoteSource>,
}

impl Orchestrator {
    pub fn new(config: Config, remote: Box<dyn RemoteSource>) -> Self {
        Self { config, remote }
    }

    /// Build an orchestrator with the remote source named in `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let remote = remote::from_config(&config.remote)?;
        Ok(Self::new(config, remote))
    }

    /// Check the caller's token against the configured secret. Without a
    /// configured secret every run is refused.
    pub fn authorize(&self, token: Option<&str>) -> Result<()> {
        match self.config.auth.token.as_deref() {
            Some(secret) if !secret.is_empty() && token == Some(secret) => Ok(()),
            Some(secret) if !secret.is_empty() => Err(MirrorError::Authorization),
            _ => {
                warn!("No auth.token configured, refusing to run");
                Err(MirrorError::Authorization)
            }
        }
    }

    /// Run every job, then sweep and refresh the marker file.
    ///
    /// An unauthorized call returns before touching the filesystem.
    pub async fn run(&self, token: Option<&str>, events: &mut dyn EventSink) -> Result<RunSummary> {
        self.authorize(token)?;

        let started_at = Utc::now();
        let timer = Instant::now();
        let _lock = RunLock::acquire(&self.config.lock_path())?;
        let mut ledger = Ledger::load(self.config.ledger_path())?;

        info!(
            "Starting run at {} against {} ({} jobs, ledger has {} entries)",
            started_at.to_rfc3339(),
            self.remote.label(),
            self.config.jobs.len(),
            ledger.len()
        );

        let engine = SyncEngine::new(
            &self.config.mirror.root,
            self.config.ledger.key_by,
            self.remote.as_ref(),
        );

        let mut sync = SyncReport::default();
        let mut jobs_run = 0;
        for spec in &self.config.jobs {
            jobs_run += self.run_job(&engine, spec, &mut ledger, events, &mut sync).await?;
        }

        let sweep = self.sweep_and_mark(&mut ledger, events)?;

        let summary = RunSummary {
            started_at,
            jobs_run,
            sync,
            sweep,
            elapsed: timer.elapsed(),
        };
        info!(
            "Run finished in {}: {} jobs, {} fetched ({}), {} unchanged, {} deleted",
            format_duration(summary.elapsed),
            summary.jobs_run,
            summary.sync.fetched_files(),
            format_bytes(summary.sync.bytes_fetched),
            summary.sync.unchanged_files,
            summary.sweep.deleted_files
        );
        Ok(summary)
    }

    /// Only run the retention sweep and marker refresh.
    pub fn sweep_only(&self, token: Option<&str>, events: &mut dyn EventSink) -> Result<SweepReport> {
        self.authorize(token)?;
        let _lock = RunLock::acquire(&self.config.lock_path())?;
        let mut ledger = Ledger::load(self.config.ledger_path())?;
        self.sweep_and_mark(&mut ledger, events)
    }

    /// Sync one configured job and, for pointer jobs, the version it names.
    /// Returns the number of jobs executed.
    async fn run_job(
        &self,
        engine: &SyncEngine<'_>,
        spec: &JobSpec,
        ledger: &mut Ledger,
        events: &mut dyn EventSink,
        sync: &mut SyncReport,
    ) -> Result<usize> {
        let job = spec.job();
        sync.merge(&engine.sync(&job, ledger, events).await?);

        let Some(pointer_file) = spec.pointer_file() else {
            return Ok(1);
        };

        let pointer_path = engine.local_dir(&job).join(pointer_file);
        let version = match resolve_pointer(&pointer_path) {
            Ok(version) => version,
            Err(e) => {
                events.emit(SyncEvent::Error(e.to_string()));
                return Err(e);
            }
        };
        info!("{} points at {}", pointer_file, version);

        match spec.dependent_job(&version) {
            Some(dependent) => {
                sync.merge(&engine.sync(&dependent, ledger, events).await?);
                Ok(2)
            }
            None => Ok(1),
        }
    }

    fn sweep_and_mark(&self, ledger: &mut Ledger, events: &mut dyn EventSink) -> Result<SweepReport> {
        let marker = self.config.marker_path();
        let report = Sweeper::new(
            &self.config.mirror.root,
            self.config.ledger.key_by,
            self.config.mirror.retention_days,
        )
        .exempt(&marker)
        .exempt(self.config.ledger_path())
        .exempt(self.config.lock_path())
        .sweep(&self.config.tree_path(), ledger, events)?;

        refresh_marker(&marker)?;
        Ok(report)
    }
}

/// Bump the marker's mtime, creating it empty if it is missing.
fn refresh_marker(path: &Path) -> Result<()> {
    if !path.exists() {
        warn!("Marker {} missing, creating it", path.display());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MirrorError::local(parent, e))?;
        }
        std::fs::File::create(path).map_err(|e| MirrorError::local(path, e))?;
        return Ok(());
    }
    filetime::set_file_mtime(path, FileTime::now()).map_err(|e| MirrorError::local(path, e))
}

/// Process exit code for a run outcome: 0 success, 2 refused, 1 any failure.
pub fn exit_code<T>(result: &Result<T>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(MirrorError::Authorization) => 2,
        Err(_) => 1,
    }
}
