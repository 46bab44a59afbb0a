//! Mtime ledger: last-known remote modification token per mirrored file.
//!
//! The on-disk format is one `"<file_key> : <remote_mtime>"` line per entry,
//! kept human-diffable and compatible with ledgers written by earlier runs.
//! The whole file is loaded into memory and rewritten atomically
//! (temp file + rename) after every mutation.

use crate::utils::errors::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

const SEPARATOR: &str = " : ";

/// How a ledger key is derived from a local file path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyBy {
    /// Bare file name. Files sharing a name in different directories collide.
    Name,
    /// Path relative to the mirror root, `/`-separated.
    #[default]
    Path,
}

impl KeyBy {
    /// Ledger key for `file`, which lives somewhere under `root`.
    pub fn key_for(self, root: &Path, file: &Path) -> String {
        match self {
            KeyBy::Name => file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            KeyBy::Path => {
                let relative = file.strip_prefix(root).unwrap_or(file);
                relative
                    .components()
                    .filter_map(|c| match c {
                        Component::Normal(part) => Some(part.to_string_lossy()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("/")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub key: String,
    pub remote_mtime: String,
}

impl LedgerEntry {
    fn parse(line: &str) -> Option<Self> {
        let (key, mtime) = line.split_once(SEPARATOR)?;
        if key.is_empty() {
            return None;
        }
        Some(Self {
            key: key.to_string(),
            remote_mtime: mtime.trim_end().to_string(),
        })
    }
}

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    /// Load the ledger at `path`. A missing file is an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No ledger at {}, starting empty", path.display());
                String::new()
            }
            Err(e) => return Err(MirrorError::local(&path, e)),
        };

        let mut entries: Vec<LedgerEntry> = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let Some(entry) = LedgerEntry::parse(line) else {
                warn!("Ignoring malformed ledger line {}: {:?}", lineno + 1, line);
                continue;
            };
            // First occurrence wins, later duplicates are dropped on the next write.
            if entries.iter().any(|e| e.key == entry.key) {
                warn!("Dropping duplicate ledger entry for {}", entry.key);
                continue;
            }
            entries.push(entry);
        }

        Ok(Self { path, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Recorded remote mtime for `key`, if any.
    pub fn find(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.remote_mtime.as_str())
    }

    /// Record a first-seen file. An existing entry for the key is overwritten.
    pub fn append(&mut self, key: &str, remote_mtime: &str) -> Result<()> {
        self.upsert(key, remote_mtime);
        self.persist()
    }

    /// Replace the recorded mtime for `key`.
    ///
    /// Returns `false` when there was no prior entry; the entry is appended
    /// in that case.
    pub fn replace(&mut self, key: &str, remote_mtime: &str) -> Result<bool> {
        let existed = self.upsert(key, remote_mtime);
        self.persist()?;
        Ok(existed)
    }

    /// Remove the entry for `key`. Returns whether one existed.
    pub fn delete(&mut self, key: &str) -> Result<bool> {
        let before = self.entries.len();
        self.entries.retain(|e| e.key != key);
        if self.entries.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    fn upsert(&mut self, key: &str, remote_mtime: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => {
                entry.remote_mtime = remote_mtime.to_string();
                true
            }
            None => {
                self.entries.push(LedgerEntry {
                    key: key.to_string(),
                    remote_mtime: remote_mtime.to_string(),
                });
                false
            }
        }
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.key);
            out.push_str(SEPARATOR);
            out.push_str(&entry.remote_mtime);
            out.push('\n');
        }
        out
    }

    /// Write-to-temp-then-rename so a crash never leaves a torn ledger.
    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| MirrorError::local(parent, e))?;
            }
        }

        let temp_name = format!(
            ".{}.{}.tmp",
            self.path
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_default(),
            std::process::id()
        );
        let temp_path = self.path.with_file_name(&temp_name);

        let mut temp_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| MirrorError::local(&temp_path, e))?;

        temp_file
            .write_all(self.render().as_bytes())
            .map_err(|e| MirrorError::local(&temp_path, e))?;
        temp_file
            .sync_all()
            .map_err(|e| MirrorError::local(&temp_path, e))?;
        drop(temp_file);

        fs::rename(&temp_path, &self.path).map_err(|e| MirrorError::local(&self.path, e))?;

        Ok(())
    }
}
