//! The executor protocol and the per-node registry.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use cairn_store::WorkloadRecord;

/// Result type alias for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Boxed future type for executor calls (the trait must stay
/// object-safe so executors can live behind `Arc<dyn Executor>`).
pub type ExecFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Errors surfaced by the dispatcher.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The workload has no placement to route to.
    #[error("workload {0} has no placement")]
    NotFound(String),

    /// No agent is discoverable for the placed node.
    #[error("agent for node {0} is unreachable")]
    AgentUnreachable(String),

    /// The agent is known but its executor is not running.
    #[error("executor on node {0} is not running")]
    ExecutorNotRunning(String),

    /// The executor did not answer within the deadline.
    #[error("dispatch to node {node} timed out after {seconds}s")]
    Timeout { node: String, seconds: u64 },

    /// The executor's own failure, passed through.
    #[error("executor error: {0}")]
    Executor(String),
}

/// The commands the coordinator issues to agents.
///
/// Implementations run the actual process or microvm; that machinery
/// lives agent-side and is not this crate's concern.
pub trait Executor: Send + Sync {
    /// Launch the workload. Resolves once the executor has accepted
    /// (or refused) the launch.
    fn start_workload(&self, workload: WorkloadRecord) -> ExecFuture<Result<(), String>>;

    /// Stop the workload. Called fire-and-forget by the dispatcher.
    fn stop_workload(&self, workload_id: String) -> ExecFuture<Result<(), String>>;

    /// Run a command inside the workload and capture its output.
    fn exec_in_workload(
        &self,
        workload_id: String,
        command: String,
        timeout: Duration,
    ) -> ExecFuture<Result<String, String>>;
}

impl std::fmt::Debug for dyn Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<dyn Executor>")
    }
}

/// Which executor owns which node.
///
/// An entry with no executor means the agent announced itself but its
/// executor is not (or no longer) running — a different failure than
/// an unknown node.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    inner: Arc<RwLock<HashMap<String, Option<Arc<dyn Executor>>>>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce an agent for a node, without an executor yet.
    pub async fn register_agent(&self, node_id: &str) {
        let mut inner = self.inner.write().await;
        inner.entry(node_id.to_string()).or_insert(None);
        debug!(%node_id, "agent registered");
    }

    /// Attach a running executor to a node.
    pub async fn attach_executor(&self, node_id: &str, executor: Arc<dyn Executor>) {
        let mut inner = self.inner.write().await;
        inner.insert(node_id.to_string(), Some(executor));
        info!(%node_id, "executor attached");
    }

    /// Detach the executor but keep the agent entry.
    pub async fn detach_executor(&self, node_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(slot) = inner.get_mut(node_id) {
            *slot = None;
            info!(%node_id, "executor detached");
        }
    }

    /// Remove the agent entirely.
    pub async fn remove_agent(&self, node_id: &str) {
        let mut inner = self.inner.write().await;
        inner.remove(node_id);
    }

    /// Resolve the executor owning a node.
    pub async fn resolve(&self, node_id: &str) -> DispatchResult<Arc<dyn Executor>> {
        let inner = self.inner.read().await;
        match inner.get(node_id) {
            None => Err(DispatchError::AgentUnreachable(node_id.to_string())),
            Some(None) => Err(DispatchError::ExecutorNotRunning(node_id.to_string())),
            Some(Some(executor)) => Ok(Arc::clone(executor)),
        }
    }

    pub async fn registered_nodes(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        inner.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopExecutor;

    impl Executor for NoopExecutor {
        fn start_workload(&self, _workload: WorkloadRecord) -> ExecFuture<Result<(), String>> {
            Box::pin(async { Ok(()) })
        }

        fn stop_workload(&self, _workload_id: String) -> ExecFuture<Result<(), String>> {
            Box::pin(async { Ok(()) })
        }

        fn exec_in_workload(
            &self,
            _workload_id: String,
            _command: String,
            _timeout: Duration,
        ) -> ExecFuture<Result<String, String>> {
            Box::pin(async { Ok(String::new()) })
        }
    }

    #[tokio::test]
    async fn unknown_node_is_unreachable() {
        let registry = ExecutorRegistry::new();
        assert_eq!(
            registry.resolve("n1").await.unwrap_err(),
            DispatchError::AgentUnreachable("n1".to_string())
        );
    }

    #[tokio::test]
    async fn agent_without_executor_is_not_running() {
        let registry = ExecutorRegistry::new();
        registry.register_agent("n1").await;
        assert_eq!(
            registry.resolve("n1").await.unwrap_err(),
            DispatchError::ExecutorNotRunning("n1".to_string())
        );
    }

    #[tokio::test]
    async fn attached_executor_resolves() {
        let registry = ExecutorRegistry::new();
        registry.attach_executor("n1", Arc::new(NoopExecutor)).await;
        assert!(registry.resolve("n1").await.is_ok());
    }

    #[tokio::test]
    async fn detach_keeps_agent_entry() {
        let registry = ExecutorRegistry::new();
        registry.attach_executor("n1", Arc::new(NoopExecutor)).await;
        registry.detach_executor("n1").await;
        assert_eq!(
            registry.resolve("n1").await.unwrap_err(),
            DispatchError::ExecutorNotRunning("n1".to_string())
        );

        registry.remove_agent("n1").await;
        assert_eq!(
            registry.resolve("n1").await.unwrap_err(),
            DispatchError::AgentUnreachable("n1".to_string())
        );
    }
}
