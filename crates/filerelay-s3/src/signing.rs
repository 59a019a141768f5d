//! AWS Signature Version 4 for S3 requests.
//!
//! <https://docs.aws.amazon.com/AmazonS3/latest/API/sig-v4-header-based-auth.html>
//!
//! 1. Create a canonical request
//! 2. Create the string to sign
//! 3. Calculate the signing key
//! 4. Add the signature to the request
//!
//! S3 differs from the other services in one respect: the canonical URI is
//! the already-encoded request path, encoded exactly once.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Hash of an empty payload.
pub const EMPTY_PAYLOAD_HASH: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

#[derive(Debug, Clone)]
pub struct SigV4Signer {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub region: String,
    pub service: String,
}

/// A signed request ready to be sent.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub method: String,
    /// Full URL including query string.
    pub url: String,
    /// Headers including the Authorization header.
    pub headers: BTreeMap<String, String>,
    pub body: Option<Bytes>,
}

impl SigV4Signer {
    pub fn new(
        access_key_id: &str,
        secret_access_key: &str,
        session_token: Option<&str>,
        region: &str,
        service: &str,
    ) -> Self {
        Self {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            session_token: session_token.map(|s| s.to_string()),
            region: region.to_string(),
            service: service.to_string(),
        }
    }

    /// Sign a request. `headers` must contain `host`.
    pub fn sign_request(
        &self,
        method: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &Bytes,
        timestamp: DateTime<Utc>,
    ) -> SignedRequest {
        let date_stamp = timestamp.format("%Y%m%d").to_string();
        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();

        let mut signed_headers = headers.clone();
        signed_headers.insert("x-amz-date".to_string(), amz_date.clone());

        if let Some(ref token) = self.session_token {
            signed_headers.insert("x-amz-security-token".to_string(), token.clone());
        }

        let payload_hash = sha256_hex(body);
        signed_headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());

        let (canonical_uri, canonical_querystring) = parse_url_components(url);

        // Step 1
        let canonical_request = self.create_canonical_request(
            method,
            &canonical_uri,
            &canonical_querystring,
            &signed_headers,
            &payload_hash,
        );

        // Step 2
        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let string_to_sign =
            self.create_string_to_sign(&amz_date, &credential_scope, &canonical_request);

        // Step 3
        let signing_key = self.derive_signing_key(&date_stamp);

        // Step 4
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let signed_header_names = self.signed_header_names(&signed_headers);
        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.access_key_id, credential_scope, signed_header_names, signature
        );
        signed_headers.insert("authorization".to_string(), authorization);

        SignedRequest {
            method: method.to_string(),
            url: url.to_string(),
            headers: signed_headers,
            body: if body.is_empty() {
                None
            } else {
                Some(body.clone())
            },
        }
    }

    /// CanonicalRequest =
    ///   HTTPRequestMethod + '\n' +
    ///   CanonicalURI + '\n' +
    ///   CanonicalQueryString + '\n' +
    ///   CanonicalHeaders + '\n' +
    ///   SignedHeaders + '\n' +
    ///   HexEncode(Hash(RequestPayload))
    fn create_canonical_request(
        &self,
        method: &str,
        canonical_uri: &str,
        canonical_querystring: &str,
        headers: &BTreeMap<String, String>,
        payload_hash: &str,
    ) -> String {
        let canonical_headers = self.canonical_headers(headers);
        let signed_headers = self.signed_header_names(headers);

        format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, canonical_uri, canonical_querystring, canonical_headers, signed_headers,
            payload_hash
        )
    }

    fn create_string_to_sign(
        &self,
        amz_date: &str,
        credential_scope: &str,
        canonical_request: &str,
    ) -> String {
        let canonical_request_hash = sha256_hex(canonical_request.as_bytes());
        format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM, amz_date, credential_scope, canonical_request_hash
        )
    }

    /// kSecret  = "AWS4" + SecretAccessKey
    /// kDate    = HMAC-SHA256(kSecret, Date)
    /// kRegion  = HMAC-SHA256(kDate, Region)
    /// kService = HMAC-SHA256(kRegion, Service)
    /// kSigning = HMAC-SHA256(kService, "aws4_request")
    fn derive_signing_key(&self, date_stamp: &str) -> Vec<u8> {
        let k_secret = format!("AWS4{}", self.secret_access_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        hmac_sha256(&k_service, b"aws4_request")
    }

    /// Lowercased, sorted, whitespace-trimmed `name:value\n` lines.
    fn canonical_headers(&self, headers: &BTreeMap<String, String>) -> String {
        let mut sorted: Vec<(String, String)> = headers
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.trim().to_string()))
            .collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        sorted
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect::<String>()
    }

    fn signed_header_names(&self, headers: &BTreeMap<String, String>) -> String {
        let mut names: Vec<String> = headers.keys().map(|k| k.to_lowercase()).collect();
        names.sort();
        names.join(";")
    }
}

// ── Helper functions ─────────────────────────────────────────────────────────

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so the error branch is unreachable.
    match HmacSha256::new_from_slice(key) {
        Ok(mut mac) => {
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        Err(_) => Vec::new(),
    }
}

/// `(canonical_uri, canonical_querystring)` for `url`.
fn parse_url_components(url: &str) -> (String, String) {
    if let Ok(parsed) = url::Url::parse(url) {
        let path = if parsed.path().is_empty() {
            "/".to_string()
        } else {
            parsed.path().to_string()
        };

        let mut query_params: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        query_params.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let query_string = query_params
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<String>>()
            .join("&");

        (path, query_string)
    } else {
        ("/".to_string(), String::new())
    }
}

/// URI-encode per SigV4 (RFC 3986 unreserved characters pass through).
pub fn uri_encode(input: &str) -> String {
    use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
    const AWS_ENCODE_SET: &AsciiSet = &CONTROLS
        .add(b' ')
        .add(b'!')
        .add(b'"')
        .add(b'#')
        .add(b'$')
        .add(b'%')
        .add(b'&')
        .add(b'\'')
        .add(b'(')
        .add(b')')
        .add(b'*')
        .add(b'+')
        .add(b',')
        .add(b'/')
        .add(b':')
        .add(b';')
        .add(b'<')
        .add(b'=')
        .add(b'>')
        .add(b'?')
        .add(b'@')
        .add(b'[')
        .add(b'\\')
        .add(b']')
        .add(b'^')
        .add(b'`')
        .add(b'{')
        .add(b'|')
        .add(b'}');

    utf8_percent_encode(input, AWS_ENCODE_SET).to_string()
}

/// URI-encode an object key, keeping `/` separators.
pub fn uri_encode_path(path: &str) -> String {
    path.split('/')
        .map(uri_encode)
        .collect::<Vec<String>>()
        .join("/")
}

/// Encoded `k=v&…` query string, sorted by key.
pub fn build_query_string(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
        .collect::<Vec<String>>()
        .join("&")
}
