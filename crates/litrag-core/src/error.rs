use thiserror::Error;

use crate::types::FusionSide;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid weight {0}: expected a finite number in [0, 1]")]
    InvalidWeight(f64),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Transient backend failure: connection refused, timeout on the wire,
    /// 5xx or throttling.
    #[error("{backend} {operation} failed: {message}")]
    IndexUnavailable {
        backend: String,
        operation: &'static str,
        message: String,
    },

    /// The backend understood the request and refused it. Retrying the same
    /// request will not help.
    #[error("{backend} rejected {operation}: {message}")]
    IndexRejected {
        backend: String,
        operation: &'static str,
        message: String,
    },

    #[error("Search pipeline not found: {0}")]
    PipelineNotFound(String),

    #[error("{side} sub-query failed during fusion: {source}")]
    PartialFusionFailure {
        side: FusionSide,
        #[source]
        source: Box<Error>,
    },

    #[error("Filter extraction failed: {0}")]
    FilterExtraction(String),

    #[error("Language model error: {0}")]
    LanguageModel(String),

    #[error("{operation} timed out after {elapsed_ms} ms")]
    Timeout {
        operation: &'static str,
        elapsed_ms: u64,
    },

    #[error("{0} cancelled")]
    Cancelled(&'static str),
}

impl Error {
    /// Whether the caller may reasonably retry the same call later.
    /// The core itself never retries.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::EmbeddingUnavailable(_)
            | Error::IndexUnavailable { .. }
            | Error::LanguageModel(_)
            | Error::Timeout { .. } => true,
            Error::PartialFusionFailure { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    pub fn index_unavailable(
        backend: impl Into<String>,
        operation: &'static str,
        message: impl ToString,
    ) -> Self {
        Error::IndexUnavailable {
            backend: backend.into(),
            operation,
            message: message.to_string(),
        }
    }

    pub fn index_rejected(
        backend: impl Into<String>,
        operation: &'static str,
        message: impl ToString,
    ) -> Self {
        Error::IndexRejected {
            backend: backend.into(),
            operation,
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
