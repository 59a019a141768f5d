// ── SFTP endpoint configuration ─────────────────────────────────────────────

use serde::{Deserialize, Serialize};

fn default_port() -> u16 {
    22
}
fn default_root() -> String {
    "/".to_string()
}
fn default_timeout() -> u64 {
    30
}
fn default_connect_attempts() -> u32 {
    10
}
fn default_connect_retry_delay_ms() -> u64 {
    1000
}
fn default_keepalive() -> u64 {
    30
}

/// The `sftp` block of one transfer profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SftpEndpointConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Path to a private key file (PEM / OpenSSH).
    #[serde(default)]
    pub private_key_path: Option<String>,
    #[serde(default)]
    pub private_key_passphrase: Option<String>,
    /// Expected host key fingerprint: `SHA256:<base64>` or MD5 hex, with or
    /// without colons. Unset means any host key is accepted.
    #[serde(default)]
    pub host_fingerprint: Option<String>,
    /// Every profile path is resolved below this directory.
    #[serde(default = "default_root")]
    pub root: String,
    /// TCP connect and blocking-operation timeout.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_connect_retry_delay_ms")]
    pub connect_retry_delay_ms: u64,
    /// 0 disables keep-alive.
    #[serde(default = "default_keepalive")]
    pub keepalive_interval_secs: u64,
}

impl SftpEndpointConfig {
    pub fn new(host: &str, username: &str) -> Self {
        Self {
            host: host.to_string(),
            port: default_port(),
            username: username.to_string(),
            password: None,
            private_key_path: None,
            private_key_passphrase: None,
            host_fingerprint: None,
            root: default_root(),
            timeout_secs: default_timeout(),
            connect_attempts: default_connect_attempts(),
            connect_retry_delay_ms: default_connect_retry_delay_ms(),
            keepalive_interval_secs: default_keepalive(),
        }
    }

    /// `sftp://user@host:port` for log lines and errors.
    pub fn endpoint(&self) -> String {
        format!("sftp://{}@{}:{}", self.username, self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("sftp.host is required".into());
        }
        if self.username.trim().is_empty() {
            return Err("sftp.username is required".into());
        }
        if self.port == 0 {
            return Err("sftp.port must be non-zero".into());
        }
        Ok(())
    }
}
