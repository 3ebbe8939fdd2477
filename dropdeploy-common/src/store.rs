use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncWrite};

/// What kind of object a remote entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Folder,
}

/// One object in a remote listing.
///
/// Immutable snapshot produced by [`RemoteStore::list`]; only consumed,
/// never mutated.
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    /// Full remote path, unique within the store.
    pub path: String,
    /// Server-side modification time.
    pub modified: DateTime<Utc>,
    pub kind: EntryKind,
}

impl RemoteEntry {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// One result returned by [`RemoteStore::search`].
#[derive(Debug, Clone)]
pub struct SearchMatch {
    /// Object name without its directory part.
    pub name: String,
    pub kind: EntryKind,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store error: HTTP {status} - {summary}")]
    Api { status: u16, summary: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait implemented by all storage adapters.
///
/// Each adapter handles the raw I/O for a specific target (Dropbox over
/// HTTP, a local directory). The coordinator is responsible for option
/// resolution, path mapping, and retention; the adapter is responsible only
/// for uploading, downloading, deleting, listing, and searching objects.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// Upload everything readable from `src` to `remote_path`, replacing
    /// any object already stored there.
    async fn upload(
        &self,
        remote_path: &str,
        src: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<(), StoreError>;

    /// Stream the object at `remote_path` into `dest`, returning the number
    /// of bytes written.
    async fn download(
        &self,
        remote_path: &str,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StoreError>;

    /// List entries under `remote_path`, descending into subfolders when
    /// `recursive` is set.
    async fn list(
        &self,
        remote_path: &str,
        recursive: bool,
    ) -> Result<Vec<RemoteEntry>, StoreError>;

    /// Delete the object at `remote_path`.
    async fn delete(&self, remote_path: &str) -> Result<(), StoreError>;

    /// Search for objects named like `query` below the `scope` folder.
    async fn search(&self, query: &str, scope: &str) -> Result<Vec<SearchMatch>, StoreError>;
}

/// Normalize a remote root so it always starts with `/`.
pub fn normalize_remote_root(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Join a remote directory and an object name with a single `/`.
pub fn join_remote(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_remote_root() {
        assert_eq!(normalize_remote_root("/ci/builds"), "/ci/builds");
        assert_eq!(normalize_remote_root("ci/builds"), "/ci/builds");
        assert_eq!(normalize_remote_root("/"), "/");
    }

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/deploy", "app.zip"), "/deploy/app.zip");
        assert_eq!(join_remote("/deploy/", "app.zip"), "/deploy/app.zip");
        assert_eq!(join_remote("/", "app.zip"), "/app.zip");
    }

    #[test]
    fn test_entry_kind() {
        let entry = RemoteEntry {
            path: "/deploy/app.zip".to_string(),
            modified: Utc::now(),
            kind: EntryKind::File,
        };
        assert!(entry.is_file());

        let folder = RemoteEntry {
            kind: EntryKind::Folder,
            ..entry
        };
        assert!(!folder.is_file());
    }
}
