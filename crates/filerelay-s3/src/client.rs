//! Signed HTTP client for S3.
//!
//! Every request is signed with SigV4 and retried with exponential backoff
//! while the object store reports a retryable failure.

use crate::config::{AwsCredentials, AwsRegion, RetryConfig, RetryMode};
use crate::error::{AwsError, AwsResult};
use crate::signing::{self, SigV4Signer};
use bytes::Bytes;
use chrono::Utc;
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;

const SERVICE: &str = "s3";

#[derive(Debug, Clone)]
pub struct AwsClient {
    http: Client,
    credentials: AwsCredentials,
    region: AwsRegion,
    retry_config: RetryConfig,
    /// Custom endpoint URL override (MinIO, LocalStack, …).
    endpoint_override: Option<String>,
    user_agent: String,
}

#[derive(Debug, Clone)]
pub struct AwsResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
    pub request_id: Option<String>,
}

impl AwsResponse {
    /// Body as text; XML responses are always UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Error for a non-2xx response. HEAD and some proxies send no body, so
    /// the `x-amz-request-id` header fills in a missing request id.
    pub fn to_error(&self) -> AwsError {
        let err = AwsError::parse_xml_error(self.status, &self.text());
        match (&err.request_id, &self.request_id) {
            (None, Some(id)) => err.with_request_id(id.clone()),
            _ => err,
        }
    }
}

impl AwsClient {
    pub fn new(
        credentials: AwsCredentials,
        region: AwsRegion,
        retry_config: RetryConfig,
        endpoint_override: Option<String>,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> AwsResult<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| AwsError::validation(&format!("HTTP client could not be built: {}", e)))?;

        Ok(Self {
            http,
            credentials,
            region,
            retry_config,
            endpoint_override: endpoint_override.map(|e| e.trim_end_matches('/').to_string()),
            user_agent: format!("filerelay/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    pub fn endpoint(&self) -> String {
        match self.endpoint_override {
            Some(ref url) => url.clone(),
            None => self.region.s3_endpoint(),
        }
    }

    pub fn region_name(&self) -> &str {
        &self.region.name
    }

    /// Signed REST request. `path` must already be URI-encoded.
    pub async fn rest_request(
        &self,
        method: &str,
        path: &str,
        query_params: &BTreeMap<String, String>,
        extra_headers: BTreeMap<String, String>,
        body: Bytes,
    ) -> AwsResult<AwsResponse> {
        let base = self.endpoint();
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        let url = if query_params.is_empty() {
            format!("{}{}", base, path)
        } else {
            format!("{}{}?{}", base, path, signing::build_query_string(query_params))
        };

        let mut headers = extra_headers;
        headers.insert("host".to_string(), extract_host(&base));

        self.execute_with_retry(method, &url, headers, body).await
    }

    async fn execute_with_retry(
        &self,
        method: &str,
        url: &str,
        headers: BTreeMap<String, String>,
        body: Bytes,
    ) -> AwsResult<AwsResponse> {
        let max_attempts = self.retry_config.max_attempts.max(1);

        for attempt in 0..max_attempts {
            let error = match self.execute_signed(method, url, &headers, &body).await {
                Ok(response) if (200..300).contains(&response.status) => return Ok(response),
                Ok(response) => response.to_error(),
                Err(e) => e,
            };

            if error.retryable && attempt + 1 < max_attempts {
                let delay = self.calculate_backoff(attempt);
                log::warn!(
                    "S3 {} {} failed (attempt {}/{}): {} - retrying in {}ms",
                    method,
                    url,
                    attempt + 1,
                    max_attempts,
                    error.code,
                    delay
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                continue;
            }
            return Err(error);
        }

        Err(AwsError::new(
            "MaxRetriesExceeded",
            &format!("Request failed after {} attempts", max_attempts),
            0,
        ))
    }

    async fn execute_signed(
        &self,
        method: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &Bytes,
    ) -> AwsResult<AwsResponse> {
        let signer = SigV4Signer::new(
            &self.credentials.access_key_id,
            &self.credentials.secret_access_key,
            self.credentials.session_token.as_deref(),
            &self.region.name,
            SERVICE,
        );

        let signed = signer.sign_request(method, url, headers, body, Utc::now());

        let http_method: reqwest::Method = method
            .parse()
            .map_err(|_| AwsError::validation(&format!("Invalid HTTP method: {}", method)))?;
        let mut req = self.http.request(http_method, &signed.url);

        for (key, value) in &signed.headers {
            req = req.header(key.as_str(), value.as_str());
        }
        req = req.header("user-agent", &self.user_agent);

        if let Some(b) = signed.body {
            req = req.body(b);
        }

        let resp = req.send().await.map_err(AwsError::from)?;

        let status = resp.status().as_u16();
        let mut resp_headers = BTreeMap::new();
        for (key, value) in resp.headers() {
            if let Ok(v) = value.to_str() {
                resp_headers.insert(key.as_str().to_string(), v.to_string());
            }
        }
        let request_id = resp_headers.get("x-amz-request-id").cloned();
        let resp_body = resp.bytes().await.map_err(AwsError::from)?;

        Ok(AwsResponse {
            status,
            headers: resp_headers,
            body: resp_body,
            request_id,
        })
    }

    /// Exponential backoff, optionally with full jitter.
    fn calculate_backoff(&self, attempt: u32) -> u64 {
        let base = self.retry_config.initial_backoff_ms;
        let max = self.retry_config.max_backoff_ms;
        let exponential = base.saturating_mul(2u64.saturating_pow(attempt));
        let capped = exponential.min(max);

        match self.retry_config.mode {
            RetryMode::Standard => {
                use rand::Rng;
                let mut rng = rand::thread_rng();
                rng.gen_range(0..=capped)
            }
            RetryMode::Legacy => capped,
        }
    }
}

fn extract_host(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            let host = u.host_str()?.to_string();
            Some(match u.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host,
            })
        })
        .unwrap_or_else(|| "s3.amazonaws.com".to_string())
}

// ── XML helpers ──────────────────────────────────────────────────────────────

/// First `<tag>text</tag>` value, entity-decoded.
pub fn xml_text(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)?;
    Some(xml_unescape(&xml[start..start + end]))
}

/// Every `<tag …>…</tag>` block, markup included.
pub fn xml_blocks(xml: &str, tag: &str) -> Vec<String> {
    let mut results = Vec::new();
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut search_from = 0;
    while let Some(start) = xml[search_from..].find(&open) {
        let abs_start = search_from + start;
        if let Some(end) = xml[abs_start..].find(&close) {
            let full_end = abs_start + end + close.len();
            results.push(xml[abs_start..full_end].to_string());
            search_from = full_end;
        } else {
            break;
        }
    }
    results
}

pub fn xml_unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#13;", "\r")
        .replace("&#10;", "\n")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(endpoint: Option<&str>, mode: RetryMode) -> AwsClient {
        let retry = RetryConfig {
            mode,
            ..RetryConfig::default()
        };
        AwsClient::new(
            AwsCredentials::new("AKIDEXAMPLE", "secret"),
            AwsRegion::new("eu-central-1"),
            retry,
            endpoint.map(str::to_string),
            Duration::from_secs(30),
            Duration::from_secs(10),
        )
        .unwrap()
    }

    fn response(status: u16, body: &str, request_id: Option<&str>) -> AwsResponse {
        AwsResponse {
            status,
            headers: BTreeMap::new(),
            body: Bytes::from(body.to_string()),
            request_id: request_id.map(str::to_string),
        }
    }

    #[test]
    fn error_takes_request_id_from_header_when_body_is_empty() {
        let err = response(404, "", Some("4442587FB7D0A2F9")).to_error();
        assert_eq!(err.code, "NotFound");
        assert_eq!(err.request_id.as_deref(), Some("4442587FB7D0A2F9"));
        assert!(err.to_string().contains("[RequestId: 4442587FB7D0A2F9]"));
    }

    #[test]
    fn error_prefers_request_id_from_body() {
        let body = "<Error><Code>AccessDenied</Code><Message>no</Message><RequestId>body-id</RequestId></Error>";
        let err = response(403, body, Some("header-id")).to_error();
        assert_eq!(err.code, "AccessDenied");
        assert_eq!(err.request_id.as_deref(), Some("body-id"));
    }

    #[test]
    fn extract_host_variants() {
        assert_eq!(
            extract_host("https://s3.us-west-2.amazonaws.com/bucket"),
            "s3.us-west-2.amazonaws.com"
        );
        assert_eq!(extract_host("http://localhost:9000"), "localhost:9000");
    }

    #[test]
    fn endpoint_override_wins() {
        assert_eq!(
            client(None, RetryMode::Standard).endpoint(),
            "https://s3.eu-central-1.amazonaws.com"
        );
        assert_eq!(
            client(Some("http://minio:9000/"), RetryMode::Standard).endpoint(),
            "http://minio:9000"
        );
    }

    #[test]
    fn legacy_backoff_is_capped_exponential() {
        let c = client(None, RetryMode::Legacy);
        assert_eq!(c.calculate_backoff(0), 500);
        assert_eq!(c.calculate_backoff(1), 1000);
        assert_eq!(c.calculate_backoff(10), 20_000);
        assert!(client(None, RetryMode::Standard).calculate_backoff(3) <= 4000);
    }

    #[test]
    fn xml_text_simple_and_escaped() {
        let xml = "<Contents><Key>a&amp;b &lt;1&gt;.edi</Key></Contents>";
        assert_eq!(xml_text(xml, "Key").as_deref(), Some("a&b <1>.edi"));
        assert_eq!(xml_text(xml, "Missing"), None);
    }

    #[test]
    fn xml_blocks_multiple() {
        let xml = "<R><Contents><Key>1</Key></Contents><Contents><Key>2</Key></Contents></R>";
        let blocks = xml_blocks(xml, "Contents");
        assert_eq!(blocks.len(), 2);
        assert!(blocks[1].contains("<Key>2</Key>"));
    }

    #[test]
    fn unescape_does_not_double_decode() {
        assert_eq!(xml_unescape("&amp;lt;"), "&lt;");
    }
}
