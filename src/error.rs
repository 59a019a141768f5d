use filerelay_core::{FsError, PipelineError};
use filerelay_s3::AwsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid s3 block: {0}")]
    ObjectStore(#[source] AwsError),

    #[error("profile '{name}': {message}")]
    Profile { name: String, message: String },
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("object store client: {0}")]
    ObjectStore(#[from] AwsError),

    #[error(transparent)]
    Connection(#[from] FsError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl RelayError {
    /// Process exit code when this error ends the run.
    pub fn exit_code(&self) -> u8 {
        1
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
