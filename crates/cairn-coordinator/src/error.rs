//! Coordinator error taxonomy.

use thiserror::Error;

use cairn_store::{WorkloadKind, WorkloadStatus};

/// Result type alias for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Errors surfaced at the coordinator boundary.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: workload {workload} cannot go from {from:?} to {to:?}")]
    InvalidState {
        workload: String,
        from: WorkloadStatus,
        to: WorkloadStatus,
    },

    #[error("no placement candidates for workload {0}")]
    NoCandidates(String),

    #[error("this platform cannot run {0:?} workloads")]
    UnsupportedKind(WorkloadKind),

    #[error("rule error: {0}")]
    Rule(#[from] cairn_datalog::RuleError),

    #[error("store error: {0}")]
    Store(#[from] cairn_store::StoreError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] cairn_dispatch::DispatchError),
}
