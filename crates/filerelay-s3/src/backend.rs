//! [`RemoteFs`] over one S3 bucket.
//!
//! Object keys have no leading slash; directory semantics come from the `/`
//! delimiter, so `list("outbound")` returns the keys directly below
//! `outbound/` and the common prefixes one level down.

use crate::client::AwsClient;
use crate::config::S3Config;
use crate::error::AwsResult;
use crate::s3::{CopySource, ListObjectsV2Output, S3Client};
use async_trait::async_trait;
use bytes::Bytes;
use filerelay_core::fs::{FsResult, RemoteEntry, RemoteFs};
use std::io::{Read, Write};
use std::time::Duration;

const DELIMITER: &str = "/";

pub struct S3Fs {
    client: S3Client,
    bucket: String,
}

impl S3Fs {
    pub fn new(client: S3Client, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
        }
    }

    /// Validate `config`, resolve credentials and build the signed client.
    pub fn from_config(config: &S3Config) -> AwsResult<Self> {
        config.validate()?;
        let credentials = config.resolve_credentials()?;
        let client = AwsClient::new(
            credentials,
            config.region(),
            config.retry.clone(),
            config.endpoint.clone(),
            Duration::from_secs(config.request_timeout_secs),
            Duration::from_secs(config.connect_timeout_secs),
        )?;
        log::debug!(
            "S3 backend for bucket {} at {} ({})",
            config.bucket,
            client.endpoint(),
            client.region_name()
        );
        Ok(Self::new(S3Client::new(client), &config.bucket))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn object_key(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

/// `Some("dir/")` for a directory, `None` for the bucket root.
fn list_prefix(path: &str) -> Option<String> {
    let dir = path.trim_matches('/');
    if dir.is_empty() {
        None
    } else {
        Some(format!("{}/", dir))
    }
}

/// Files first, then subdirectories. The zero-byte marker object some tools
/// create for the directory itself is skipped.
fn page_entries(
    page: &ListObjectsV2Output,
    prefix: Option<&str>,
    entries: &mut Vec<RemoteEntry>,
    dirs: &mut Vec<RemoteEntry>,
) {
    for object in &page.contents {
        if Some(object.key.as_str()) == prefix || object.key.ends_with('/') {
            continue;
        }
        entries.push(RemoteEntry::file(object.key.clone(), object.size));
    }
    for common in &page.common_prefixes {
        dirs.push(RemoteEntry::directory(common.prefix.trim_end_matches('/')));
    }
}

#[async_trait]
impl RemoteFs for S3Fs {
    async fn list(&self, path: &str) -> FsResult<Vec<RemoteEntry>> {
        let prefix = list_prefix(path);
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2(&self.bucket, prefix.as_deref(), Some(DELIMITER), token.as_deref())
                .await
                .map_err(|e| e.into_fs_error("list", path))?;
            page_entries(&page, prefix.as_deref(), &mut files, &mut dirs);

            match page.next_continuation_token {
                Some(next) if page.is_truncated => token = Some(next),
                _ => break,
            }
        }

        files.extend(dirs);
        Ok(files)
    }

    async fn read_stream(&self, path: &str, sink: &mut (dyn Write + Send)) -> FsResult<u64> {
        let key = object_key(path);
        let body = self
            .client
            .get_object(&self.bucket, &key)
            .await
            .map_err(|e| e.into_fs_error("read", path))?;
        sink.write_all(&body)?;
        sink.flush()?;
        Ok(body.len() as u64)
    }

    async fn write_stream(&self, path: &str, source: &mut (dyn Read + Send)) -> FsResult<u64> {
        let key = object_key(path);
        let mut buf = Vec::new();
        source.read_to_end(&mut buf)?;
        let len = buf.len() as u64;
        let etag = self
            .client
            .put_object(&self.bucket, &key, Bytes::from(buf))
            .await
            .map_err(|e| e.into_fs_error("write", path))?;
        log::debug!("PutObject s3://{}/{} etag {}", self.bucket, key, etag);
        Ok(len)
    }

    async fn delete(&self, path: &str) -> FsResult<()> {
        self.client
            .delete_object(&self.bucket, &object_key(path))
            .await
            .map_err(|e| e.into_fs_error("delete", path))
    }

    async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let source = CopySource::new(&self.bucket, &object_key(from));
        self.client
            .copy_object(&source, &self.bucket, &object_key(to))
            .await
            .map_err(|e| e.into_fs_error("rename", from))?;
        self.client
            .delete_object(&self.bucket, &object_key(from))
            .await
            .map_err(|e| e.into_fs_error("rename", from))
    }
}
