//! Object-store error type.
//!
//! S3 reports failures as an XML `<Error>` document next to the HTTP status.
//! [`AwsError`] keeps the code, message and request id from that document and
//! classifies whether the request is worth retrying.

use filerelay_core::FsError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsError {
    /// S3 error code (e.g. "NoSuchKey", "AccessDenied").
    pub code: String,
    pub message: String,
    /// HTTP status; 0 when the request never got a response.
    pub status_code: u16,
    pub request_id: Option<String>,
    /// Operation that failed (e.g. "GetObject").
    pub action: Option<String>,
    pub retryable: bool,
}

impl fmt::Display for AwsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S3 error [{}]: {} (HTTP {})", self.code, self.message, self.status_code)?;
        if let Some(ref action) = self.action {
            write!(f, " during {}", action)?;
        }
        if let Some(ref req_id) = self.request_id {
            write!(f, " [RequestId: {}]", req_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for AwsError {}

impl AwsError {
    pub fn new(code: &str, message: &str, status_code: u16) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            status_code,
            request_id: None,
            action: None,
            retryable: Self::is_retryable_code(code, status_code),
        }
    }

    /// Client-side configuration problem; never retried.
    pub fn validation(message: &str) -> Self {
        Self {
            code: "ValidationError".to_string(),
            message: message.to_string(),
            status_code: 400,
            request_id: None,
            action: None,
            retryable: false,
        }
    }

    pub fn credential_error(message: &str) -> Self {
        Self {
            code: "CredentialError".to_string(),
            message: message.to_string(),
            status_code: 401,
            request_id: None,
            action: None,
            retryable: false,
        }
    }

    pub fn with_request_id(mut self, id: String) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn with_action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code == 404
            || matches!(self.code.as_str(), "NoSuchKey" | "NoSuchBucket" | "NotFound")
    }

    fn is_retryable_code(code: &str, status_code: u16) -> bool {
        if matches!(status_code, 429 | 500 | 502 | 503 | 504) {
            return true;
        }
        matches!(
            code,
            "Throttling"
                | "ThrottlingException"
                | "RequestLimitExceeded"
                | "BandwidthLimitExceeded"
                | "SlowDown"
                | "InternalError"
                | "ServiceUnavailable"
                | "RequestTimeout"
                | "RequestTimeTooSkewed"
        )
    }

    /// Parse an S3 XML error body.
    ///
    /// ```xml
    /// <Error>
    ///   <Code>NoSuchKey</Code>
    ///   <Message>The specified key does not exist.</Message>
    ///   <RequestId>4442587FB7D0A2F9</RequestId>
    /// </Error>
    /// ```
    ///
    /// HEAD responses and some proxies return no body at all; the status
    /// code alone then determines the error code.
    pub fn parse_xml_error(status_code: u16, body: &str) -> Self {
        let code = extract_xml_tag(body, "Code")
            .unwrap_or_else(|| default_code(status_code).to_string());
        let message = extract_xml_tag(body, "Message")
            .unwrap_or_else(|| format!("HTTP {} from object store", status_code));
        let mut err = Self::new(&code, &message, status_code);
        if let Some(id) = extract_xml_tag(body, "RequestId") {
            err.request_id = Some(id);
        }
        err
    }
}

fn default_code(status_code: u16) -> &'static str {
    match status_code {
        301 | 307 => "PermanentRedirect",
        400 => "BadRequest",
        403 => "AccessDenied",
        404 => "NotFound",
        409 => "Conflict",
        500 => "InternalError",
        503 => "ServiceUnavailable",
        _ => "UnknownError",
    }
}

fn extract_xml_tag(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)?;
    Some(xml[start..start + end].to_string())
}

impl From<reqwest::Error> for AwsError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            code: "HttpError".to_string(),
            message: err.to_string(),
            status_code: err.status().map(|s| s.as_u16()).unwrap_or(0),
            request_id: None,
            action: None,
            retryable: err.is_timeout() || err.is_connect(),
        }
    }
}

impl AwsError {
    /// Map onto the pipeline's filesystem error for operation `op` on `path`.
    pub fn into_fs_error(self, op: &'static str, path: &str) -> FsError {
        if self.is_not_found() {
            FsError::NotFound(path.to_string())
        } else {
            FsError::operation(op, path, self)
        }
    }
}

pub type AwsResult<T> = Result<T, AwsError>;
