//! Operation coordinator: each public function is one complete run of a
//! subcommand against a resolved option set and a store handle.

use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::debug;

use dropdeploy_common::store::RemoteStore;

use crate::config::Options;
use crate::retention;
use crate::uploader;

/// Upload the configured artifact file or directory tree.
pub async fn deploy(opts: &Options, store: &dyn RemoteStore) -> Result<()> {
    debug!(artifact = %opts.artifacts_path.display(), remote = %opts.remote_root, "deploying");
    uploader::upload_artifact(store, &opts.artifacts_path, &opts.remote_root).await?;
    debug!("uploading complete");
    Ok(())
}

/// Download the remote object at the deploy path into the local artifact
/// path.
pub async fn download(opts: &Options, store: &dyn RemoteStore) -> Result<()> {
    debug!(artifact = %opts.artifacts_path.display(), remote = %opts.remote_root, "downloading");
    let mut out = tokio::fs::File::create(&opts.artifacts_path)
        .await
        .with_context(|| format!("failed to create {}", opts.artifacts_path.display()))?;
    let written = store
        .download(&opts.remote_root, &mut out)
        .await
        .with_context(|| format!("failed to download {}", opts.remote_root))?;
    debug!(bytes = written, "download complete");
    Ok(())
}

/// Apply the retention policy to the remote deploy folder.
///
/// Operates on one listing snapshot: the listing is taken once, the
/// deletion set is computed from it, and the deletes are issued in the
/// computed order without re-querying.
pub async fn prune(opts: &Options, store: &dyn RemoteStore) -> Result<()> {
    let entries = store
        .list(&opts.remote_root, true)
        .await
        .with_context(|| format!("failed to list {}", opts.remote_root))?;
    debug!(count = entries.iter().filter(|e| e.is_file()).count(), "remote files listed");

    let deletions = retention::compute_deletions(&entries, opts.max_files, opts.max_days, Utc::now());
    for path in &deletions {
        debug!(path = %path, "delete");
        store
            .delete(path)
            .await
            .with_context(|| format!("failed to delete {path}"))?;
    }

    let deleted: HashSet<&str> = deletions.iter().map(String::as_str).collect();
    for entry in entries.iter().filter(|e| e.is_file() && !deleted.contains(e.path.as_str())) {
        debug!(path = %entry.path, "keep");
    }
    Ok(())
}

/// Check whether an object named exactly like the configured search term
/// exists below the remote deploy folder.
///
/// Returns `0` when found and `-1` when not. A store failure during the
/// search is downgraded to `-1`; only store errors are caught, anything
/// else propagates.
pub async fn exists(opts: &Options, store: &dyn RemoteStore) -> Result<i32> {
    let term = opts
        .search
        .as_deref()
        .context("search is required for exists (set it in dropdeploy.toml or pass --search)")?;
    debug!(term = %term, remote = %opts.remote_root, "searching");

    let matches = match store.search(term, &opts.remote_root).await {
        Ok(matches) => matches,
        Err(err) => {
            debug!(error = %err, "search failed, file not found");
            return Ok(-1);
        }
    };

    if matches.iter().any(|m| m.name == term) {
        debug!("file found");
        Ok(0)
    } else {
        debug!("file not found");
        Ok(-1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use chrono::{DateTime, Duration};
    use tokio::io::{AsyncRead, AsyncWrite};

    use dropdeploy_common::store::{EntryKind, RemoteEntry, SearchMatch, StoreError};

    use crate::config::BackendKind;
    use crate::store::DirectoryStore;

    fn options(remote_root: &str, artifacts_path: PathBuf) -> Options {
        Options {
            artifacts_path,
            remote_root: remote_root.to_string(),
            token_env: "DROPBOX_OAUTH_BEARER".to_string(),
            max_days: 0,
            max_files: 0,
            debug: false,
            search: None,
            backend: BackendKind::Directory,
            directory_root: None,
        }
    }

    /// Store double with a canned listing and search result, recording
    /// every delete in order.
    struct FakeStore {
        entries: Vec<RemoteEntry>,
        search: Result<Vec<SearchMatch>, ()>,
        deleted: Mutex<Vec<String>>,
    }

    impl FakeStore {
        fn with_entries(entries: Vec<RemoteEntry>) -> Self {
            Self {
                entries,
                search: Ok(Vec::new()),
                deleted: Mutex::new(Vec::new()),
            }
        }

        fn with_search(search: Result<Vec<SearchMatch>, ()>) -> Self {
            Self {
                entries: Vec::new(),
                search,
                deleted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl RemoteStore for FakeStore {
        async fn upload(
            &self,
            _remote_path: &str,
            _src: &mut (dyn AsyncRead + Send + Unpin),
        ) -> Result<(), StoreError> {
            Ok(())
        }

        async fn download(
            &self,
            remote_path: &str,
            _dest: &mut (dyn AsyncWrite + Send + Unpin),
        ) -> Result<u64, StoreError> {
            Err(StoreError::NotFound(remote_path.to_string()))
        }

        async fn list(
            &self,
            _remote_path: &str,
            _recursive: bool,
        ) -> Result<Vec<RemoteEntry>, StoreError> {
            Ok(self.entries.clone())
        }

        async fn delete(&self, remote_path: &str) -> Result<(), StoreError> {
            self.deleted.lock().unwrap().push(remote_path.to_string());
            Ok(())
        }

        async fn search(
            &self,
            _query: &str,
            _scope: &str,
        ) -> Result<Vec<SearchMatch>, StoreError> {
            match &self.search {
                Ok(matches) => Ok(matches.clone()),
                Err(()) => Err(StoreError::Api {
                    status: 500,
                    summary: "internal".to_string(),
                }),
            }
        }
    }

    fn file_entry(path: &str, age_days: i64, now: DateTime<Utc>) -> RemoteEntry {
        RemoteEntry {
            path: path.to_string(),
            modified: now - Duration::days(age_days),
            kind: EntryKind::File,
        }
    }

    #[tokio::test]
    async fn test_prune_deletes_in_policy_order() {
        let now = Utc::now();
        let store = FakeStore::with_entries(vec![
            file_entry("/d/new", 1, now),
            file_entry("/d/oldest", 30, now),
            file_entry("/d/stale", 10, now),
            file_entry("/d/older", 20, now),
        ]);

        let mut opts = options("/d", PathBuf::new());
        opts.max_files = 2;
        opts.max_days = 7;
        prune(&opts, &store).await.unwrap();

        // Count pass drops the 2 oldest, then the age pass catches /d/stale.
        let deleted = store.deleted.lock().unwrap().clone();
        assert_eq!(deleted, vec!["/d/oldest", "/d/older", "/d/stale"]);
    }

    #[tokio::test]
    async fn test_prune_without_bounds_deletes_nothing() {
        let now = Utc::now();
        let store = FakeStore::with_entries(vec![file_entry("/d/ancient", 900, now)]);
        let opts = options("/d", PathBuf::new());
        prune(&opts, &store).await.unwrap();
        assert!(store.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exists_found() {
        let store = FakeStore::with_search(Ok(vec![SearchMatch {
            name: "app.zip".to_string(),
            kind: EntryKind::File,
        }]));
        let mut opts = options("/d", PathBuf::new());
        opts.search = Some("app.zip".to_string());
        assert_eq!(exists(&opts, &store).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_exists_requires_exact_name() {
        let store = FakeStore::with_search(Ok(vec![SearchMatch {
            name: "app.zip.sha256".to_string(),
            kind: EntryKind::File,
        }]));
        let mut opts = options("/d", PathBuf::new());
        opts.search = Some("app.zip".to_string());
        assert_eq!(exists(&opts, &store).await.unwrap(), -1);
    }

    #[tokio::test]
    async fn test_exists_swallows_store_errors() {
        let store = FakeStore::with_search(Err(()));
        let mut opts = options("/d", PathBuf::new());
        opts.search = Some("app.zip".to_string());
        assert_eq!(exists(&opts, &store).await.unwrap(), -1);
    }

    #[tokio::test]
    async fn test_exists_without_search_term_is_an_error() {
        let store = FakeStore::with_search(Ok(Vec::new()));
        let opts = options("/d", PathBuf::new());
        assert!(exists(&opts, &store).await.is_err());
    }

    #[tokio::test]
    async fn test_deploy_then_download_roundtrip() {
        let local = tempfile::tempdir().unwrap();
        let artifact = local.path().join("app.zip");
        std::fs::write(&artifact, b"artifact bytes").unwrap();

        let remote = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(remote.path());

        let opts = options("/deploy", artifact.clone());
        deploy(&opts, &store).await.unwrap();

        let restored = local.path().join("restored.zip");
        let opts = options("/deploy/app.zip", restored.clone());
        download(&opts, &store).await.unwrap();

        assert_eq!(std::fs::read(&restored).unwrap(), b"artifact bytes");
    }

    #[tokio::test]
    async fn test_download_to_unwritable_path_fails() {
        let remote = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(remote.path());
        store.upload("/deploy/app.zip", &mut &b"x"[..]).await.unwrap();

        let opts = options(
            "/deploy/app.zip",
            PathBuf::from("/nonexistent-dir/restored.zip"),
        );
        assert!(download(&opts, &store).await.is_err());
    }
}
