//! # filerelay-sftp
//!
//! SFTP as a filerelay endpoint, built on `ssh2`. One [`SftpFs`] is one
//! authenticated session whose paths resolve below the configured root.

pub mod error;
pub mod service;
pub mod types;

pub use error::SftpError;
pub use service::{fingerprint_matches, SftpFs};
pub use types::SftpEndpointConfig;
