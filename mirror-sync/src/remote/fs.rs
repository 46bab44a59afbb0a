//! Remote source backed by a directory on a mounted filesystem.

use super::{RemoteFile, RemoteSource};
use crate::utils::errors::{MirrorError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone)]
pub struct FsSource {
    base: PathBuf,
}

impl FsSource {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn dir_path(&self, directory: &str) -> PathBuf {
        self.base.join(directory.trim_start_matches('/'))
    }
}

/// Seconds since the epoch, as the opaque token the ledger stores.
fn mtime_token(path: &Path, modified: SystemTime) -> Result<String> {
    let secs = modified
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_err(|e| MirrorError::Remote(format!("{}: {}", path.display(), e)))?
        .as_secs();
    Ok(secs.to_string())
}

#[async_trait]
impl RemoteSource for FsSource {
    fn label(&self) -> String {
        format!("file://{}", self.base.display())
    }

    async fn list_names(&self, directory: &str) -> Result<Vec<String>> {
        let dir = self.dir_path(directory);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
                return Err(MirrorError::RemoteDirectory {
                    path: directory.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(MirrorError::local(&dir, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MirrorError::local(&dir, e))?
        {
            if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    async fn stat(&self, directory: &str, name: &str) -> Result<RemoteFile> {
        let path = self.dir_path(directory).join(name);
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| MirrorError::Remote(format!("{}: {}", path.display(), e)))?;
        let modified = metadata
            .modified()
            .map_err(|e| MirrorError::Remote(format!("{}: {}", path.display(), e)))?;

        Ok(RemoteFile {
            name: name.to_string(),
            size: metadata.len(),
            mtime: mtime_token(&path, modified)?,
        })
    }

    async fn retrieve(
        &self,
        directory: &str,
        name: &str,
        dest: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64> {
        let path = self.dir_path(directory).join(name);
        let mut file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| MirrorError::Remote(format!("{}: {}", path.display(), e)))?;
        let copied = tokio::io::copy(&mut file, &mut *dest).await?;
        dest.flush().await?;
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use glob::Pattern;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_list_filters_by_pattern() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let dir = temp_dir.path().join("pub/snapshots");
        fs::create_dir_all(dir.join("nested"))?;
        fs::write(dir.join("portage-latest.tar.bz2"), b"12345")?;
        fs::write(dir.join("portage-latest.tar.bz2.md5sum"), b"abc")?;
        fs::write(dir.join("portage-20240101.tar.bz2"), b"old")?;
        set_file_mtime(dir.join("portage-latest.tar.bz2"), FileTime::from_unix_time(1_700_000_000, 0))?;

        let source = FsSource::new(temp_dir.path());
        let files = source
            .list("/pub/snapshots/", &Pattern::new("portage-latest.tar.bz*")?)
            .await?;

        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["portage-latest.tar.bz2", "portage-latest.tar.bz2.md5sum"]);
        assert_eq!(files[0].size, 5);
        assert_eq!(files[0].mtime, "1700000000");
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_directory_is_remote_directory_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let source = FsSource::new(temp_dir.path());

        let err = source
            .list("/does/not/exist/", &Pattern::new("*")?)
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::RemoteDirectory { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_retrieve_copies_bytes() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("file.txt"), b"content")?;
        let source = FsSource::new(temp_dir.path());

        let mut buf: Vec<u8> = Vec::new();
        let n = source.retrieve("/", "file.txt", &mut buf).await?;
        assert_eq!(n, 7);
        assert_eq!(buf, b"content");
        Ok(())
    }
}
