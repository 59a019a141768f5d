// ── Remote filesystem capability ─────────────────────────────────────────────
//
// Every endpoint the pipeline talks to (SFTP server, S3 bucket, the in-memory
// test backend) implements `RemoteFs`. The engine never sees backend types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use thiserror::Error;

// ── Listing types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One listing result. Produced by [`RemoteFs::list`] and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub path: String,
    pub kind: EntryKind,
    pub size_bytes: u64,
}

impl RemoteEntry {
    pub fn file(path: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            size_bytes,
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            size_bytes: 0,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn base_name(&self) -> &str {
        base_name(&self.path)
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum FsError {
    /// Connecting or authenticating to the endpoint failed.
    #[error("{endpoint} connection failed: {message}")]
    Connection { endpoint: String, message: String },

    #[error("'{0}' not found")]
    NotFound(String),

    /// A remote operation was rejected by the endpoint.
    #[error("{op} '{path}' failed: {message}")]
    Operation {
        op: &'static str,
        path: String,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    pub fn connection(endpoint: impl Into<String>, message: impl ToString) -> Self {
        FsError::Connection {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    pub fn operation(op: &'static str, path: impl Into<String>, message: impl ToString) -> Self {
        FsError::Operation {
            op,
            path: path.into(),
            message: message.to_string(),
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;

// ── Capability ───────────────────────────────────────────────────────────────

/// The four operations the pipeline needs from an endpoint, plus `rename`
/// for the archive disposition.
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// List the immediate children of `path`.
    async fn list(&self, path: &str) -> FsResult<Vec<RemoteEntry>>;

    /// Stream the full contents of `path` into `sink`, returning the bytes written.
    async fn read_stream(&self, path: &str, sink: &mut (dyn Write + Send)) -> FsResult<u64>;

    /// Create or replace `path` with everything readable from `source`.
    async fn write_stream(&self, path: &str, source: &mut (dyn Read + Send)) -> FsResult<u64>;

    async fn delete(&self, path: &str) -> FsResult<()>;

    async fn rename(&self, from: &str, to: &str) -> FsResult<()>;
}

// ── Path helpers ─────────────────────────────────────────────────────────────

/// Last component of a `/`-separated path.
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// `dir + "/" + name`, without doubling a trailing slash on `dir`.
pub fn join_path(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}
