use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures reading or writing the persisted identity table and audit log.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed identity table {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Failures of the external identity lookup.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("lookup request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("lookup service returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("unexpected lookup payload: {0}")]
    Payload(String),
}

impl LookupError {
    /// Transport errors and server-side statuses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            LookupError::Http(_) => true,
            LookupError::Status { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            LookupError::Payload(_) => false,
        }
    }
}

/// Failures handing speech records to the indexing store.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("malformed store response: {0}")]
    Response(String),
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
