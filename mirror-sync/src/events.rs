//! Operational event stream.
//!
//! Every decision the engine and sweeper take is emitted as a [`SyncEvent`].
//! The stdout sink renders them as the `--- `-prefixed lines operators grep
//! for; tests collect them into a `Vec`.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    CreatedDir(PathBuf),
    NewFile(String),
    ChangedSize(String),
    ChangedMtime {
        name: String,
        recorded: Option<String>,
        remote: String,
    },
    Unchanged(String),
    LostMtime { key: String, remote_mtime: String },
    DeletedFile(PathBuf),
    DeletedDir(PathBuf),
    Error(String),
}

impl SyncEvent {
    /// Whether this event reports a download.
    pub fn is_fetch(&self) -> bool {
        matches!(
            self,
            SyncEvent::NewFile(_) | SyncEvent::ChangedSize(_) | SyncEvent::ChangedMtime { .. }
        )
    }
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEvent::CreatedDir(path) => write!(f, "--- Created dir: {}", path.display()),
            SyncEvent::NewFile(name) => write!(f, "--- New file: {name}"),
            SyncEvent::ChangedSize(name) => write!(f, "--- Changed file (size): {name}"),
            SyncEvent::ChangedMtime {
                name,
                recorded,
                remote,
            } => write!(
                f,
                "--- Changed file (mtime): {} {} {}",
                name,
                recorded.as_deref().unwrap_or("None"),
                remote
            ),
            SyncEvent::Unchanged(name) => write!(f, "--- Same file: {name}"),
            SyncEvent::LostMtime { key, remote_mtime } => {
                write!(f, "--- Added lost mtime: {key} : {remote_mtime}")
            }
            SyncEvent::DeletedFile(path) => write!(f, "--- Deleted file: {}", path.display()),
            SyncEvent::DeletedDir(path) => {
                write!(f, "--- Deleting empty folder: {}", path.display())
            }
            SyncEvent::Error(message) => write!(f, "--- Error: {message}"),
        }
    }
}

/// Receiver of sync events.
pub trait EventSink {
    fn emit(&mut self, event: SyncEvent);
}

impl EventSink for Vec<SyncEvent> {
    fn emit(&mut self, event: SyncEvent) {
        self.push(event);
    }
}

/// Writes each event as one line to stdout and mirrors it to tracing.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl EventSink for StdoutSink {
    fn emit(&mut self, event: SyncEvent) {
        match &event {
            SyncEvent::Error(_) => tracing::error!(event = ?event, "sync event"),
            _ => tracing::debug!(event = ?event, "sync event"),
        }
        let mut stdout = std::io::stdout().lock();
        // A closed stdout must not abort the run.
        let _ = writeln!(stdout, "{event}");
    }
}
