//! Configuration management for the mirror synchronizer.
//!
//! Loads configuration from TOML file with environment variable overrides.

use crate::ledger::KeyBy;
use crate::sync::JobSpec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mirror: MirrorConfig,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub jobs: Vec<JobSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Local working root; every other local path is relative to it
    pub root: PathBuf,

    /// Subtree of the root swept by retention
    #[serde(default = "default_tree")]
    pub tree: PathBuf,

    /// Retention-exempt marker, relative to the tree
    #[serde(default = "default_marker_file")]
    pub marker_file: PathBuf,

    /// Files untouched for this many days are deleted
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,

    /// Run-lock file, relative to the root
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteKind {
    /// HTTP(S) server exposing directory indexes
    Http,
    /// Directory on a mounted filesystem
    Fs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_kind")]
    pub kind: RemoteKind,

    /// Base URL (http) or base directory (fs) of the remote tree
    pub base_url: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Ledger file, relative to the root
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,

    /// How ledger keys are derived from local files
    #[serde(default)]
    pub key_by: KeyBy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret required to start a run (no gating when unset)
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_tree() -> PathBuf {
    PathBuf::from("releases")
}

fn default_marker_file() -> PathBuf {
    PathBuf::from(".htaccess")
}

fn default_retention_days() -> u64 {
    60
}

fn default_lock_file() -> PathBuf {
    PathBuf::from(".mirror-sync.lock")
}

fn default_remote_kind() -> RemoteKind {
    RemoteKind::Http
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_read_timeout() -> u64 {
    300
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("mtime.log")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
            key_by: KeyBy::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Override selected values from `MIRROR_SYNC_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("MIRROR_SYNC_TOKEN") {
            self.auth.token = Some(token);
        }
        if let Ok(url) = std::env::var("MIRROR_SYNC_BASE_URL") {
            self.remote.base_url = url;
        }
        if let Ok(root) = std::env::var("MIRROR_SYNC_ROOT") {
            self.mirror.root = PathBuf::from(root);
        }
    }

    pub fn tree_path(&self) -> PathBuf {
        self.mirror.root.join(&self.mirror.tree)
    }

    pub fn marker_path(&self) -> PathBuf {
        self.tree_path().join(&self.mirror.marker_file)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.mirror.root.join(&self.ledger.path)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.mirror.root.join(&self.mirror.lock_file)
    }

    /// Create a default configuration mirroring the Gentoo release tree
    pub fn default() -> Self {
        Config {
            mirror: MirrorConfig {
                root: PathBuf::from("."),
                tree: default_tree(),
                marker_file: default_marker_file(),
                retention_days: default_retention_days(),
                lock_file: default_lock_file(),
            },
            remote: RemoteConfig {
                kind: RemoteKind::Http,
                base_url: "https://ftp.fi.muni.cz/pub/linux/gentoo".to_string(),
                connect_timeout_secs: default_connect_timeout(),
                read_timeout_secs: default_read_timeout(),
            },
            ledger: LedgerConfig::default(),
            auth: AuthConfig::default(),
            log: LogConfig::default(),
            jobs: vec![
                JobSpec::new(
                    "/releases/snapshots/current/",
                    "releases/snapshots/current/",
                    "portage-latest.tar.bz*",
                ),
                JobSpec::new(
                    "/releases/amd64/autobuilds/",
                    "releases/amd64/autobuilds/",
                    "latest-stage3-amd64-hardened.txt",
                )
                .with_pointer("stage3-amd64-hardened-*"),
                JobSpec::new(
                    "/releases/x86/autobuilds/",
                    "releases/x86/autobuilds/",
                    "latest-stage3-i686-hardened.txt",
                )
                .with_pointer("stage3-i686-hardened-*"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_file_gets_defaults() {
        let config: Config = toml::from_str(
            r#"
            [mirror]
            root = "/srv/mirror"

            [remote]
            base_url = "https://example.org/pub"

            [[jobs]]
            remote = "/releases/amd64/autobuilds/"
            local = "releases/amd64/autobuilds/"
            pattern = "latest-stage3-amd64-hardened.txt"

            [jobs.pointer]
            pattern = "stage3-amd64-hardened-*"
            "#,
        )
        .unwrap();

        assert_eq!(config.mirror.retention_days, 60);
        assert_eq!(config.remote.kind, RemoteKind::Http);
        assert_eq!(config.remote.connect_timeout_secs, 30);
        assert_eq!(config.ledger.key_by, KeyBy::Path);
        assert_eq!(config.ledger_path(), PathBuf::from("/srv/mirror/mtime.log"));
        assert_eq!(
            config.marker_path(),
            PathBuf::from("/srv/mirror/releases/.htaccess")
        );
        assert!(config.auth.token.is_none());

        let pointer = config.jobs[0].pointer.as_ref().unwrap();
        assert_eq!(pointer.pattern, "stage3-amd64-hardened-*");
        assert!(pointer.file.is_none());
    }

    #[test]
    fn test_example_file_parses() {
        let config: Config = toml::from_str(include_str!("../mirror-sync.example.toml")).unwrap();
        assert_eq!(config.jobs, Config::default().jobs);
        assert_eq!(config.auth.token.as_deref(), Some("insert your own token here"));
        assert_eq!(config.tree_path(), PathBuf::from("/var/www/mirror/releases"));
    }

    #[test]
    fn test_default_job_list() {
        let config = Config::default();
        assert_eq!(config.jobs.len(), 3);
        assert!(config.jobs[0].pointer.is_none());
        assert!(config.jobs[1].pointer.is_some());
        assert!(config.jobs[2].pointer.is_some());
    }

    #[test]
    fn test_fs_remote_and_name_keys() {
        let config: Config = toml::from_str(
            r#"
            [mirror]
            root = "."

            [remote]
            kind = "fs"
            base_url = "/mnt/upstream"

            [ledger]
            key_by = "name"
            "#,
        )
        .unwrap();

        assert_eq!(config.remote.kind, RemoteKind::Fs);
        assert_eq!(config.ledger.key_by, KeyBy::Name);
        assert!(config.jobs.is_empty());
    }
}
