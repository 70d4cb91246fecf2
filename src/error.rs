// src/error.rs

use thiserror::Error;

use crate::feed::FeedKind;

/// Problems confined to a single feed row. The row is skipped and the batch continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("malformed timestamp: {0:?}")]
    MalformedTimestamp(String),

    #[error("non-finite {field}: {raw:?}")]
    NonFiniteValue { field: &'static str, raw: String },

    #[error("row has {len} columns, expected at least {expected}")]
    MissingColumns { len: usize, expected: usize },
}

/// Failure to retrieve one raw feed. Fatal to the pipeline run that issued it.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed feed body: {0}")]
    Decode(String),
}

impl FeedError {
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Transport(_) => true,
            Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{feed} feed unavailable: {source}")]
    Feed {
        feed: FeedKind,
        #[source]
        source: FeedError,
    },

    #[error("stitching task failed: {0}")]
    Stitch(#[from] tokio::task::JoinError),

    #[error("pipeline run cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: String, value: String },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
