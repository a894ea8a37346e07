use thiserror::Error;

use crate::types::Capability;

/// Coarse classification used by the orchestrator when labelling failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transient; absorbed by the resilient invoker.
    RateLimited,
    /// Non-retryable: malformed output, auth failure, timeout, retries exhausted.
    CapabilityUnavailable,
    /// Output parsed but broke a contract (e.g. unknown asset ids).
    ValidationFailure,
}

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("{capability} rate limited (retry after {retry_after_ms:?} ms)")]
    RateLimited {
        capability: Capability,
        retry_after_ms: Option<u64>,
    },

    #[error("{capability} still rate limited after {attempts} attempts")]
    RetriesExhausted { capability: Capability, attempts: u32 },

    #[error("{capability} timed out after {after_secs}s")]
    Timeout { capability: Capability, after_secs: u64 },

    #[error("{capability} unavailable: {reason}")]
    Unavailable {
        capability: Capability,
        reason: String,
    },

    #[error("{capability} returned unparseable output: {source}")]
    Malformed {
        capability: Capability,
        #[source]
        source: ParseError,
    },

    #[error("{capability} output failed validation: {reason}")]
    Invalid {
        capability: Capability,
        reason: String,
    },

    #[error("invalid provider URL {0}")]
    InvalidEndpoint(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl CapabilityError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            CapabilityError::RateLimited { .. } => ErrorKind::RateLimited,
            CapabilityError::Invalid { .. } => ErrorKind::ValidationFailure,
            CapabilityError::RetriesExhausted { .. }
            | CapabilityError::Timeout { .. }
            | CapabilityError::Unavailable { .. }
            | CapabilityError::Malformed { .. }
            | CapabilityError::InvalidEndpoint(_)
            | CapabilityError::Http(_) => ErrorKind::CapabilityUnavailable,
        }
    }

    /// Only rate-limit signals are worth another attempt.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        self.kind() == ErrorKind::RateLimited
    }
}

/// Failure to recover a typed value from free-form model output.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("response was empty")]
    Empty,

    #[error("no JSON value found in response")]
    NoJson,

    #[error("JSON did not match the expected shape: {0}")]
    Shape(#[source] serde_json::Error),
}
