//! Error types for the Ferrite engine.

use thiserror::Error;

/// All possible errors from the Ferrite engine.
///
/// Every variant renders as a single line; the boundary adapter converts
/// each of these into the failure sentinel of the wire shape the failing
/// function returns, so no native error ever crosses the boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Lifecycle errors
    #[error("open failed: {0}")]
    Open(String),

    #[error("invalid or stale handle")]
    InvalidHandle,

    // Statement errors
    #[error("parameter count mismatch: statement expects {expected}, got {got}")]
    Bind { expected: usize, got: usize },

    #[error("query failed: {0}")]
    Query(String),

    // Transaction errors
    #[error("invalid transaction state: {0}")]
    TransactionState(&'static str),

    // Replication errors
    #[error("sync failed: {0}")]
    Sync(String),

    // Encoding errors
    #[error("result encoding failed: {0}")]
    Encode(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::Open("unable to open database file".into());
        assert_eq!(err.to_string(), "open failed: unable to open database file");

        let err = Error::Bind { expected: 2, got: 1 };
        assert_eq!(
            err.to_string(),
            "parameter count mismatch: statement expects 2, got 1"
        );

        let err = Error::TransactionState("already committed");
        assert_eq!(
            err.to_string(),
            "invalid transaction state: already committed"
        );

        assert_eq!(Error::InvalidHandle.to_string(), "invalid or stale handle");
    }
}
