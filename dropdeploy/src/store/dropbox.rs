//! Dropbox HTTP API adapter.
//!
//! Talks to the Dropbox v2 endpoints directly with reqwest and a bearer
//! token, so no SDK dependency is needed. Payloads that fit in one chunk go
//! through a single `files/upload` call; anything larger is sent through an
//! upload session in fixed-size chunks.

use std::fmt::Write as _;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use dropdeploy_common::store::{EntryKind, RemoteEntry, RemoteStore, SearchMatch, StoreError};

const RPC_URL: &str = "https://api.dropboxapi.com/2";
const CONTENT_URL: &str = "https://content.dropboxapi.com/2";
const UPLOAD_CHUNK_SIZE: usize = 8 * 1024 * 1024;

pub struct DropboxStore {
    client: Client,
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = ".tag")]
enum Metadata {
    #[serde(rename = "file")]
    File {
        name: String,
        path_display: Option<String>,
        path_lower: Option<String>,
        server_modified: DateTime<Utc>,
    },
    #[serde(rename = "folder")]
    Folder {
        name: String,
        path_display: Option<String>,
        path_lower: Option<String>,
    },
    #[serde(other)]
    Other,
}

impl Metadata {
    fn into_entry(self) -> Option<RemoteEntry> {
        match self {
            Metadata::File {
                name,
                path_display,
                path_lower,
                server_modified,
            } => Some(RemoteEntry {
                path: path_display.or(path_lower).unwrap_or(name),
                modified: server_modified,
                kind: EntryKind::File,
            }),
            Metadata::Folder {
                name,
                path_display,
                path_lower,
            } => Some(RemoteEntry {
                path: path_display.or(path_lower).unwrap_or(name),
                // Folders carry no server timestamp.
                modified: DateTime::UNIX_EPOCH,
                kind: EntryKind::Folder,
            }),
            Metadata::Other => None,
        }
    }

    fn into_search_match(self) -> Option<SearchMatch> {
        match self {
            Metadata::File { name, .. } => Some(SearchMatch {
                name,
                kind: EntryKind::File,
            }),
            Metadata::Folder { name, .. } => Some(SearchMatch {
                name,
                kind: EntryKind::Folder,
            }),
            Metadata::Other => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListFolderResponse {
    entries: Vec<Metadata>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    matches: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    metadata: SearchHit,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    metadata: Metadata,
}

#[derive(Debug, Deserialize)]
struct SessionStartResponse {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error_summary: String,
}

/// Serialize a `Dropbox-API-Arg` header value. HTTP header values must be
/// ASCII, so non-ASCII characters are escaped to `\uXXXX`.
fn api_arg(value: &serde_json::Value) -> String {
    let json = value.to_string();
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units).iter() {
                let _ = write!(out, "\\u{unit:04x}");
            }
        }
    }
    out
}

/// Dropbox expresses the root folder as the empty string.
fn folder_arg(path: &str) -> &str {
    if path == "/" {
        ""
    } else {
        path
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let summary = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|e| e.error_summary)
        .unwrap_or(body);
    if summary.contains("not_found") {
        return Err(StoreError::NotFound(summary));
    }
    Err(StoreError::Api {
        status: status.as_u16(),
        summary,
    })
}

/// Read up to `limit` bytes, stopping early only at end of input.
async fn read_chunk(
    src: &mut (dyn AsyncRead + Send + Unpin),
    limit: usize,
) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    (&mut *src).take(limit as u64).read_to_end(&mut buf).await?;
    Ok(buf)
}

impl DropboxStore {
    pub fn new(token: String) -> Self {
        Self {
            client: Client::new(),
            token,
        }
    }

    async fn rpc(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, StoreError> {
        let resp = self
            .client
            .post(format!("{RPC_URL}/{endpoint}"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        check_status(resp).await
    }

    async fn content(
        &self,
        endpoint: &str,
        arg: &serde_json::Value,
        body: Vec<u8>,
    ) -> Result<reqwest::Response, StoreError> {
        let resp = self
            .client
            .post(format!("{CONTENT_URL}/{endpoint}"))
            .bearer_auth(&self.token)
            .header("Dropbox-API-Arg", api_arg(arg))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;
        check_status(resp).await
    }

    /// Upload a payload larger than one chunk through an upload session.
    async fn upload_session(
        &self,
        remote_path: &str,
        first_chunk: Vec<u8>,
        src: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<(), StoreError> {
        let mut offset = first_chunk.len() as u64;
        let start: SessionStartResponse = self
            .content(
                "files/upload_session/start",
                &serde_json::json!({ "close": false }),
                first_chunk,
            )
            .await?
            .json()
            .await?;
        loop {
            let chunk = read_chunk(src, UPLOAD_CHUNK_SIZE).await?;
            let len = chunk.len();
            if len == UPLOAD_CHUNK_SIZE {
                debug!(session = %start.session_id, offset, "appending upload chunk");
                self.content(
                    "files/upload_session/append_v2",
                    &serde_json::json!({
                        "cursor": { "session_id": &start.session_id, "offset": offset },
                        "close": false,
                    }),
                    chunk,
                )
                .await?;
                offset += len as u64;
            } else {
                // Final chunk (possibly empty) commits the upload.
                self.content(
                    "files/upload_session/finish",
                    &serde_json::json!({
                        "cursor": { "session_id": &start.session_id, "offset": offset },
                        "commit": { "path": remote_path, "mode": "overwrite", "mute": true },
                    }),
                    chunk,
                )
                .await?;
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl RemoteStore for DropboxStore {
    async fn upload(
        &self,
        remote_path: &str,
        src: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<(), StoreError> {
        let first_chunk = read_chunk(src, UPLOAD_CHUNK_SIZE).await?;
        if first_chunk.len() < UPLOAD_CHUNK_SIZE {
            self.content(
                "files/upload",
                &serde_json::json!({ "path": remote_path, "mode": "overwrite", "mute": true }),
                first_chunk,
            )
            .await?;
        } else {
            self.upload_session(remote_path, first_chunk, src).await?;
        }
        debug!(path = %remote_path, "dropbox upload complete");
        Ok(())
    }

    async fn download(
        &self,
        remote_path: &str,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StoreError> {
        let resp = self
            .client
            .post(format!("{CONTENT_URL}/files/download"))
            .bearer_auth(&self.token)
            .header(
                "Dropbox-API-Arg",
                api_arg(&serde_json::json!({ "path": remote_path })),
            )
            .send()
            .await?;
        let mut resp = check_status(resp).await?;

        let mut written = 0u64;
        while let Some(chunk) = resp.chunk().await? {
            dest.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        dest.flush().await?;
        debug!(path = %remote_path, bytes = written, "dropbox download complete");
        Ok(written)
    }

    async fn list(
        &self,
        remote_path: &str,
        recursive: bool,
    ) -> Result<Vec<RemoteEntry>, StoreError> {
        let mut resp: ListFolderResponse = self
            .rpc(
                "files/list_folder",
                serde_json::json!({ "path": folder_arg(remote_path), "recursive": recursive }),
            )
            .await?
            .json()
            .await?;

        let mut entries = Vec::new();
        loop {
            entries.extend(resp.entries.drain(..).filter_map(Metadata::into_entry));
            if !resp.has_more {
                return Ok(entries);
            }
            resp = self
                .rpc(
                    "files/list_folder/continue",
                    serde_json::json!({ "cursor": resp.cursor }),
                )
                .await?
                .json()
                .await?;
        }
    }

    async fn delete(&self, remote_path: &str) -> Result<(), StoreError> {
        self.rpc("files/delete_v2", serde_json::json!({ "path": remote_path }))
            .await?;
        debug!(path = %remote_path, "dropbox delete complete");
        Ok(())
    }

    async fn search(&self, query: &str, scope: &str) -> Result<Vec<SearchMatch>, StoreError> {
        let resp: SearchResponse = self
            .rpc(
                "files/search_v2",
                serde_json::json!({
                    "query": query,
                    "options": { "path": folder_arg(scope) },
                }),
            )
            .await?
            .json()
            .await?;

        Ok(resp
            .matches
            .into_iter()
            .filter_map(|m| m.metadata.metadata.into_search_match())
            .collect())
    }
}
