//! Artifact upload: walks the local source and maps each file onto the
//! remote folder layout.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;
use walkdir::WalkDir;

use dropdeploy_common::store::{join_remote, RemoteStore};

/// Compute the remote directory a local file deploys into.
///
/// A file directly inside `upload_root` lands in `remote_root` itself; a
/// file in a subdirectory lands in `remote_root` extended with the
/// subdirectory's path relative to `upload_root`, joined with forward
/// slashes on every platform.
pub fn remote_directory_for(
    local_file: &Path,
    upload_root: &Path,
    remote_root: &str,
) -> Result<String> {
    let dir = local_file.parent().unwrap_or(upload_root);
    if dir == upload_root {
        return Ok(remote_root.to_string());
    }

    let rel = dir.strip_prefix(upload_root).with_context(|| {
        format!(
            "{} is not inside the upload root {}",
            local_file.display(),
            upload_root.display()
        )
    })?;

    let mut remote_dir = remote_root.to_string();
    for segment in rel.components() {
        remote_dir.push('/');
        remote_dir.push_str(&segment.as_os_str().to_string_lossy());
    }
    Ok(remote_dir)
}

/// Upload a single file or a whole directory tree to `remote_root`.
///
/// Directory uploads visit regular files in sorted order, so a re-run over
/// an unchanged tree produces the same remote layout; symlinks and
/// directories are skipped. The batch aborts at the first file that fails.
pub async fn upload_artifact(
    store: &dyn RemoteStore,
    source: &Path,
    remote_root: &str,
) -> Result<()> {
    if source.is_dir() {
        upload_directory(store, source, remote_root).await
    } else {
        upload_file(store, source, remote_root).await
    }
}

async fn upload_directory(store: &dyn RemoteStore, root: &Path, remote_root: &str) -> Result<()> {
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let remote_dir = remote_directory_for(entry.path(), root, remote_root)?;
        upload_file(store, entry.path(), &remote_dir).await?;
    }
    Ok(())
}

async fn upload_file(store: &dyn RemoteStore, file: &Path, remote_dir: &str) -> Result<()> {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .with_context(|| format!("{} has no file name", file.display()))?;
    let target = join_remote(remote_dir, &name);

    debug!(file = %file.display(), target = %target, "uploading");
    let mut src = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("failed to open {}", file.display()))?;
    store
        .upload(&target, &mut src)
        .await
        .with_context(|| format!("failed to upload {}", file.display()))?;
    Ok(())
}
