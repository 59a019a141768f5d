use filerelay_core::FsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SftpError {
    #[error("cannot resolve address '{0}'")]
    Address(String),

    #[error("TCP connection to {addr} failed: {source}")]
    Tcp {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("SSH handshake failed: {0}")]
    Handshake(#[source] ssh2::Error),

    #[error("host key mismatch: expected {expected}, server offered {actual}")]
    HostKeyMismatch { expected: String, actual: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("SFTP subsystem unavailable: {0}")]
    Channel(#[source] ssh2::Error),

    #[error("gave up after {attempts} connection attempts: {last}")]
    Exhausted { attempts: u32, last: Box<SftpError> },
}

impl SftpError {
    /// Host key mismatches and rejected credentials do not improve with retries.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            SftpError::HostKeyMismatch { .. } | SftpError::Auth(_) | SftpError::Address(_)
        )
    }

    pub fn into_fs_error(self, endpoint: &str) -> FsError {
        FsError::connection(endpoint, self)
    }
}

/// ssh2 failure on `path` during `op`. SFTP status 2 is "no such file".
pub(crate) fn op_error(op: &'static str, path: &str, err: ssh2::Error) -> FsError {
    if matches!(err.code(), ssh2::ErrorCode::SFTP(2)) {
        FsError::NotFound(path.to_string())
    } else {
        FsError::operation(op, path, err)
    }
}
