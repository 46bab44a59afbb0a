//! Remote lister/fetcher contract.
//!
//! The engine never talks to a transport directly. Anything that can list a
//! directory, report a file's size and modification token, and stream its
//! bytes can act as the upstream of a mirror.

pub mod fs;
pub mod http;

use crate::config::{RemoteConfig, RemoteKind};
use crate::utils::errors::Result;
use async_trait::async_trait;
use glob::{MatchOptions, Pattern};
use std::time::Duration;
use tokio::io::AsyncWrite;

/// A remote file as reported by the lister.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub name: String,
    pub size: u64,
    /// Opaque modification token, only ever compared for equality.
    pub mtime: String,
}

#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Human-readable label identifying this source.
    fn label(&self) -> String;

    /// Names of the plain files in `directory`.
    ///
    /// Fails with `MirrorError::RemoteDirectory` when the directory cannot
    /// be entered.
    async fn list_names(&self, directory: &str) -> Result<Vec<String>>;

    /// Size and modification token of one file.
    async fn stat(&self, directory: &str, name: &str) -> Result<RemoteFile>;

    /// Stream the file's bytes into `dest`, returning the byte count.
    async fn retrieve(
        &self,
        directory: &str,
        name: &str,
        dest: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64>;

    /// Files in `directory` whose names match `pattern`, sorted by name.
    async fn list(&self, directory: &str, pattern: &Pattern) -> Result<Vec<RemoteFile>> {
        let options = MatchOptions {
            require_literal_leading_dot: true,
            ..MatchOptions::new()
        };

        let mut names: Vec<String> = self
            .list_names(directory)
            .await?
            .into_iter()
            .filter(|name| pattern.matches_with(name, options))
            .collect();
        names.sort();
        names.dedup();

        let mut files = Vec::with_capacity(names.len());
        for name in names {
            files.push(self.stat(directory, &name).await?);
        }
        Ok(files)
    }
}

/// Build the configured remote source.
pub fn from_config(config: &RemoteConfig) -> Result<Box<dyn RemoteSource>> {
    match config.kind {
        RemoteKind::Http => Ok(Box::new(http::HttpSource::new(
            &config.base_url,
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.read_timeout_secs),
        )?)),
        RemoteKind::Fs => Ok(Box::new(fs::FsSource::new(&config.base_url))),
    }
}
