//! Error types for the FactStore service.

use thiserror::Error;

/// Result type alias for FactStore operations.
pub type FactStoreResult<T> = Result<T, FactStoreError>;

/// Errors raised while bootstrapping or syncing the fact base.
#[derive(Debug, Error)]
pub enum FactStoreError {
    /// A shipped rule file failed to parse — fatal at startup.
    #[error("shipped rule file '{file}' is invalid: {source}")]
    ShippedRule {
        file: &'static str,
        #[source]
        source: cairn_datalog::RuleError,
    },

    #[error("store error: {0}")]
    Store(#[from] cairn_store::StoreError),
}
