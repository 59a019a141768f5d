//! Object-store configuration, credential resolution and region endpoints.
//!
//! The `s3` block of the relay configuration deserializes into [`S3Config`].
//! Keys follow the AWS SDK client options (`region`, `credentials.key`,
//! `credentials.secret`, `endpoint`), so existing configuration files load
//! unchanged; unknown keys such as `version` are ignored.

use crate::error::{AwsError, AwsResult};
use serde::{Deserialize, Serialize};

// ── Serde default helpers ────────────────────────────────────────────────────

fn default_request_timeout_secs() -> u64 {
    30
}
fn default_connect_timeout_secs() -> u64 {
    10
}

// ── Regions ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AwsRegion {
    /// Region code (e.g., "us-east-1").
    pub name: String,
}

impl AwsRegion {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    /// Path-style S3 endpoint for this region.
    pub fn s3_endpoint(&self) -> String {
        if self.name.starts_with("cn-") {
            format!("https://s3.{}.amazonaws.com.cn", self.name)
        } else {
            format!("https://s3.{}.amazonaws.com", self.name)
        }
    }
}

impl Default for AwsRegion {
    fn default() -> Self {
        Self::new("us-east-1")
    }
}

// ── Credentials ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Present for temporary credentials.
    pub session_token: Option<String>,
    /// Where the credentials came from, for diagnostics.
    pub provider_name: Option<String>,
}

impl AwsCredentials {
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            session_token: None,
            provider_name: Some("static".to_string()),
        }
    }

    pub fn is_temporary(&self) -> bool {
        self.session_token.is_some()
    }

    /// `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` / `AWS_SESSION_TOKEN`.
    pub fn from_environment() -> Option<Self> {
        let access_key = std::env::var("AWS_ACCESS_KEY_ID").ok()?;
        let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok()?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();
        Some(Self {
            access_key_id: access_key,
            secret_access_key: secret_key,
            session_token,
            provider_name: Some("environment".to_string()),
        })
    }
}

/// `credentials` block as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticCredentials {
    pub key: String,
    pub secret: String,
    #[serde(default)]
    pub token: Option<String>,
}

// ── Retry Configuration ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per request (default: 3).
    pub max_attempts: u32,
    pub mode: RetryMode,
    /// Initial backoff in milliseconds (default: 500).
    pub initial_backoff_ms: u64,
    /// Backoff ceiling in milliseconds (default: 20_000).
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            mode: RetryMode::Standard,
            initial_backoff_ms: 500,
            max_backoff_ms: 20_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum RetryMode {
    /// Exponential backoff with full jitter.
    Standard,
    /// Exponential backoff without jitter.
    Legacy,
}

// ── Bucket configuration ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub region: String,
    pub bucket: String,
    #[serde(default)]
    pub credentials: Option<StaticCredentials>,
    /// Custom endpoint (MinIO, LocalStack, Ceph RGW, …). Always path-style.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl S3Config {
    pub fn new(region: &str, bucket: &str) -> Self {
        Self {
            region: region.to_string(),
            bucket: bucket.to_string(),
            credentials: None,
            endpoint: None,
            retry: RetryConfig::default(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }

    pub fn region(&self) -> AwsRegion {
        AwsRegion::new(&self.region)
    }

    pub fn validate(&self) -> AwsResult<()> {
        if self.bucket.trim().is_empty() {
            return Err(AwsError::validation("s3.bucket is required"));
        }
        if self.region.trim().is_empty() {
            return Err(AwsError::validation("s3.region is required"));
        }
        if let Some(ref endpoint) = self.endpoint {
            url::Url::parse(endpoint).map_err(|e| {
                AwsError::validation(&format!(
                    "s3.endpoint '{}' is not a valid URL: {}",
                    endpoint, e
                ))
            })?;
        }
        if let Some(ref creds) = self.credentials {
            if creds.key.is_empty() || creds.secret.is_empty() {
                return Err(AwsError::validation("s3.credentials needs both key and secret"));
            }
        }
        Ok(())
    }

    /// Credentials from the file, falling back to the environment.
    pub fn resolve_credentials(&self) -> AwsResult<AwsCredentials> {
        if let Some(ref creds) = self.credentials {
            let mut resolved = AwsCredentials::new(&creds.key, &creds.secret);
            resolved.session_token = creds.token.clone();
            return Ok(resolved);
        }
        AwsCredentials::from_environment().ok_or_else(|| {
            AwsError::credential_error(
                "no s3.credentials in configuration and AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY are not set",
            )
        })
    }
}
