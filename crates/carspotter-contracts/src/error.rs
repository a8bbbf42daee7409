use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The reply matched neither the plain nor the boxed response shape.
    #[error("malformed model response ({reason}): {raw:?}")]
    MalformedResponse { raw: String, reason: String },
}

impl ParseError {
    pub(crate) fn malformed(raw: &str, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            Self::MalformedResponse { raw, .. } => raw.as_str(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing document exists but is not a serialized record mapping.
    #[error("record store {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("record store io failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("record store encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
