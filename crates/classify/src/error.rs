use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Why a classifier call produced no usable answer. Every variant ends in a
/// fallback classification; none of them abort a run.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("classifier returned status {0}")]
    Status(u16),

    #[error("classifier timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid classifier response: {0}")]
    InvalidResponse(String),

    #[error("classification cancelled")]
    Cancelled,
}

impl ClassifierError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Status(code) => *code == 429 || *code >= 500,
            Self::InvalidResponse(_) | Self::Cancelled => false,
        }
    }
}

impl From<serde_json::Error> for ClassifierError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache file {} is not a valid cache: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode cache: {0}")]
    Encode(#[from] serde_json::Error),
}
