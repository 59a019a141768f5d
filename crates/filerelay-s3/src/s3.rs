//! S3 object operations used by the relay.
//!
//! Requests are path-style (`/{bucket}/{key}`), which every S3-compatible
//! store accepts.

use crate::client::{self, AwsClient};
use crate::error::{AwsError, AwsResult};
use crate::signing::uri_encode_path;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Types ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Object {
    pub key: String,
    pub size: u64,
    pub last_modified: String,
    pub etag: String,
    pub storage_class: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommonPrefix {
    pub prefix: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListObjectsV2Output {
    pub name: String,
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub key_count: u32,
    pub is_truncated: bool,
    pub contents: Vec<Object>,
    pub common_prefixes: Vec<CommonPrefix>,
    pub next_continuation_token: Option<String>,
}

/// Source of a server-side copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopySource {
    pub bucket: String,
    pub key: String,
}

impl CopySource {
    pub fn new(bucket: &str, key: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    /// `x-amz-copy-source` value; the key must be URL-encoded.
    pub fn to_header_value(&self) -> String {
        format!("/{}/{}", self.bucket, uri_encode_path(&self.key))
    }
}

// ── Client ───────────────────────────────────────────────────────────────────

pub struct S3Client {
    client: AwsClient,
}

impl S3Client {
    pub fn new(client: AwsClient) -> Self {
        Self { client }
    }

    pub fn endpoint(&self) -> String {
        self.client.endpoint()
    }

    /// ListObjectsV2, one page.
    pub async fn list_objects_v2(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        delimiter: Option<&str>,
        continuation_token: Option<&str>,
    ) -> AwsResult<ListObjectsV2Output> {
        let mut query = BTreeMap::new();
        query.insert("list-type".to_string(), "2".to_string());
        if let Some(p) = prefix {
            query.insert("prefix".to_string(), p.to_string());
        }
        if let Some(d) = delimiter {
            query.insert("delimiter".to_string(), d.to_string());
        }
        if let Some(t) = continuation_token {
            query.insert("continuation-token".to_string(), t.to_string());
        }

        let response = self
            .client
            .rest_request("GET", &bucket_path(bucket), &query, BTreeMap::new(), Bytes::new())
            .await
            .map_err(|e| e.with_action("ListObjectsV2"))?;

        Ok(parse_list_objects(&response.text()))
    }

    pub async fn get_object(&self, bucket: &str, key: &str) -> AwsResult<Bytes> {
        let response = self
            .client
            .rest_request(
                "GET",
                &object_path(bucket, key),
                &BTreeMap::new(),
                BTreeMap::new(),
                Bytes::new(),
            )
            .await
            .map_err(|e| e.with_action("GetObject"))?;
        Ok(response.body)
    }

    /// PutObject; returns the ETag.
    pub async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> AwsResult<String> {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/octet-stream".to_string());

        let response = self
            .client
            .rest_request("PUT", &object_path(bucket, key), &BTreeMap::new(), headers, body)
            .await
            .map_err(|e| e.with_action("PutObject"))?;

        Ok(response.headers.get("etag").cloned().unwrap_or_default())
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> AwsResult<()> {
        self.client
            .rest_request(
                "DELETE",
                &object_path(bucket, key),
                &BTreeMap::new(),
                BTreeMap::new(),
                Bytes::new(),
            )
            .await
            .map_err(|e| e.with_action("DeleteObject"))?;
        Ok(())
    }

    /// Server-side copy; returns the new ETag.
    pub async fn copy_object(
        &self,
        source: &CopySource,
        dest_bucket: &str,
        dest_key: &str,
    ) -> AwsResult<String> {
        let mut headers = BTreeMap::new();
        headers.insert("x-amz-copy-source".to_string(), source.to_header_value());

        let response = self
            .client
            .rest_request(
                "PUT",
                &object_path(dest_bucket, dest_key),
                &BTreeMap::new(),
                headers,
                Bytes::new(),
            )
            .await
            .map_err(|e| e.with_action("CopyObject"))?;

        // A 200 can still carry an <Error> document for copies.
        let body = response.text();
        if body.contains("<Error>") {
            return Err(AwsError::parse_xml_error(500, &body).with_action("CopyObject"));
        }
        Ok(client::xml_text(&body, "ETag").unwrap_or_default())
    }
}

fn bucket_path(bucket: &str) -> String {
    format!("/{}", bucket)
}

fn object_path(bucket: &str, key: &str) -> String {
    format!("/{}/{}", bucket, uri_encode_path(key.trim_start_matches('/')))
}

/// Parse a `ListBucketResult` document.
pub fn parse_list_objects(xml: &str) -> ListObjectsV2Output {
    let contents = client::xml_blocks(xml, "Contents")
        .iter()
        .filter_map(|block| {
            let key = client::xml_text(block, "Key")?;
            Some(Object {
                key,
                size: client::xml_text(block, "Size")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0),
                last_modified: client::xml_text(block, "LastModified").unwrap_or_default(),
                etag: client::xml_text(block, "ETag").unwrap_or_default(),
                storage_class: client::xml_text(block, "StorageClass"),
            })
        })
        .collect();

    let common_prefixes = client::xml_blocks(xml, "CommonPrefixes")
        .iter()
        .filter_map(|block| client::xml_text(block, "Prefix"))
        .map(|prefix| CommonPrefix { prefix })
        .collect();

    // <Prefix> also appears inside <CommonPrefixes>; read the top-level one
    // from the part before the first entry.
    let head_end = xml
        .find("<Contents>")
        .into_iter()
        .chain(xml.find("<CommonPrefixes>"))
        .min()
        .unwrap_or(xml.len());
    let head = &xml[..head_end];

    ListObjectsV2Output {
        name: client::xml_text(head, "Name").unwrap_or_default(),
        prefix: client::xml_text(head, "Prefix"),
        delimiter: client::xml_text(head, "Delimiter"),
        key_count: client::xml_text(xml, "KeyCount")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        is_truncated: client::xml_text(xml, "IsTruncated").as_deref() == Some("true"),
        contents,
        common_prefixes,
        next_continuation_token: client::xml_text(xml, "NextContinuationToken"),
    }
}
