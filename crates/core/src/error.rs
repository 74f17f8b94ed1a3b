use thiserror::Error;

/// The error taxonomy shared by every component in the pipeline.
///
/// Variants map onto the design-level kinds from the error handling design:
/// transient-external, config-missing, schema-mismatch, data-quality,
/// invariant-violation and timeout each have a home here so that every
/// layer classifies failures the same way instead of inventing its own.
#[derive(Error, Debug)]
pub enum PrecomputeError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("config missing: {0}")]
    ConfigMissing(String),

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("fetch error: {kind:?} retryable={retryable}: {cause}")]
    Fetch {
        kind: FetchErrorKind,
        retryable: bool,
        cause: String,
    },

    #[error("database error: {0}")]
    Database(String),
}

impl PrecomputeError {
    /// Whether retrying the operation that produced this error might succeed.
    ///
    /// Library code classifies errors up front rather than making callers
    /// pattern-match on variant names; the worker state machine (Worker §4.4)
    /// is the only caller that needs this bit.
    pub fn is_retryable(&self) -> bool {
        match self {
            PrecomputeError::Fetch { retryable, .. } => *retryable,
            PrecomputeError::Timeout(_) => false,
            PrecomputeError::Database(_) => true,
            _ => false,
        }
    }
}

/// Failure modes a market-data fetch can surface (Fetcher §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Timeout,
    RateLimit,
    Empty,
    Transport,
}

pub type Result<T> = std::result::Result<T, PrecomputeError>;
