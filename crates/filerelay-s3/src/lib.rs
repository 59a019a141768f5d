//! # filerelay-s3
//!
//! S3-compatible object storage as a filerelay endpoint. Talks the REST API
//! directly with SigV4-signed requests, so AWS, MinIO and Ceph RGW all work
//! through the same path-style client.

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod s3;
pub mod signing;

pub use backend::S3Fs;
pub use config::{AwsCredentials, AwsRegion, RetryConfig, RetryMode, S3Config, StaticCredentials};
pub use error::{AwsError, AwsResult};
