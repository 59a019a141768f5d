use crate::fs::FsError;
use std::fmt;
use thiserror::Error;

/// Pipeline stage a failure was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Listing,
    Downloading,
    Transforming,
    Uploading,
    Disposing,
    Summarizing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Listing => "listing",
            Stage::Downloading => "downloading",
            Stage::Transforming => "transforming",
            Stage::Uploading => "uploading",
            Stage::Disposing => "disposing",
            Stage::Summarizing => "summarizing",
        };
        f.write_str(s)
    }
}

/// Profile-fatal failures. Per-file size mismatches are not errors; they are
/// logged and the entry is skipped.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} '{path}': {source}")]
    Fs {
        stage: Stage,
        path: String,
        #[source]
        source: FsError,
    },

    #[error("invalid wildcard filter '{pattern}': {message}")]
    Filter { pattern: String, message: String },

    #[error("{stage}: local staging failed: {source}")]
    Staging {
        stage: Stage,
        #[source]
        source: std::io::Error,
    },

    #[error("summary encoding failed: {0}")]
    Summary(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn fs(stage: Stage, path: impl Into<String>, source: FsError) -> Self {
        PipelineError::Fs {
            stage,
            path: path.into(),
            source,
        }
    }

    /// Adapter for `map_err` on local file work done during `stage`.
    pub fn staging(stage: Stage) -> impl FnOnce(std::io::Error) -> Self {
        move |source| PipelineError::Staging { stage, source }
    }

    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Fs { stage, .. } => *stage,
            PipelineError::Filter { .. } => Stage::Listing,
            PipelineError::Staging { stage, .. } => *stage,
            PipelineError::Summary(_) => Stage::Summarizing,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
