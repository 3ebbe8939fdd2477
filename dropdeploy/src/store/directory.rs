//! Local directory store adapter.
//!
//! Keeps deployed artifacts in a plain directory tree, mapping remote paths
//! onto paths below a fixed root. Useful for offline runs and for
//! exercising the deploy pipeline in tests. Uses atomic write (temp file →
//! fsync → rename) to prevent partial uploads.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use dropdeploy_common::store::{EntryKind, RemoteEntry, RemoteStore, SearchMatch, StoreError};

pub struct DirectoryStore {
    base_path: PathBuf,
}

impl DirectoryStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, remote_path: &str) -> PathBuf {
        // Prevent path traversal
        let key = remote_path.trim_start_matches('/').replace("..", "");
        self.base_path.join(key)
    }

    /// Remote path for a filesystem path below the base, forward-slash
    /// joined with a leading `/`.
    fn remote_path_of(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.base_path).ok()?;
        let mut remote = String::new();
        for segment in rel.components() {
            remote.push('/');
            remote.push_str(&segment.as_os_str().to_string_lossy());
        }
        Some(remote)
    }

    async fn walk(
        &self,
        start: PathBuf,
        recursive: bool,
    ) -> Result<Vec<(PathBuf, std::fs::Metadata)>, StoreError> {
        let mut found = Vec::new();
        let mut stack = vec![start];
        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    found.push((path.clone(), meta));
                    if recursive {
                        stack.push(path);
                    }
                } else if meta.is_file() {
                    found.push((path, meta));
                }
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl RemoteStore for DirectoryStore {
    async fn upload(
        &self,
        remote_path: &str,
        src: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<(), StoreError> {
        let dest = self.full_path(remote_path);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = dest.with_extension("tmp");
        let mut tmp = tokio::fs::File::create(&tmp_path).await?;
        tokio::io::copy(src, &mut tmp).await?;
        tmp.sync_all().await?;
        drop(tmp);

        tokio::fs::rename(&tmp_path, &dest).await?;
        debug!(path = %remote_path, "directory upload complete");
        Ok(())
    }

    async fn download(
        &self,
        remote_path: &str,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StoreError> {
        let src_path = self.full_path(remote_path);
        let mut src = match tokio::fs::File::open(&src_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(remote_path.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let written = tokio::io::copy(&mut src, dest).await?;
        dest.flush().await?;
        Ok(written)
    }

    async fn list(
        &self,
        remote_path: &str,
        recursive: bool,
    ) -> Result<Vec<RemoteEntry>, StoreError> {
        let start = self.full_path(remote_path);
        if !start.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for (path, meta) in self.walk(start, recursive).await? {
            let Some(remote) = self.remote_path_of(&path) else {
                continue;
            };
            let modified = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or(DateTime::UNIX_EPOCH);
            entries.push(RemoteEntry {
                path: remote,
                modified,
                kind: if meta.is_dir() {
                    EntryKind::Folder
                } else {
                    EntryKind::File
                },
            });
        }
        Ok(entries)
    }

    async fn delete(&self, remote_path: &str) -> Result<(), StoreError> {
        let path = self.full_path(remote_path);
        if !path.exists() {
            return Err(StoreError::NotFound(remote_path.to_string()));
        }
        tokio::fs::remove_file(&path).await?;
        debug!(path = %remote_path, "directory delete complete");
        Ok(())
    }

    async fn search(&self, query: &str, scope: &str) -> Result<Vec<SearchMatch>, StoreError> {
        let start = self.full_path(scope);
        if !start.is_dir() {
            return Ok(Vec::new());
        }

        let mut matches = Vec::new();
        for (path, meta) in self.walk(start, true).await? {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            if name.contains(query) {
                matches.push(SearchMatch {
                    name,
                    kind: if meta.is_dir() {
                        EntryKind::Folder
                    } else {
                        EntryKind::File
                    },
                });
            }
        }
        Ok(matches)
    }
}
