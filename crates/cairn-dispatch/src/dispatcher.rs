//! The dispatcher — deadline-bounded routing to owning executors.

use std::time::Duration;

use tracing::{debug, warn};

use cairn_store::{WorkloadKind, WorkloadRecord};

use crate::executor::{DispatchError, DispatchResult, ExecutorRegistry};

/// Deadline for starting a process workload.
pub const DISPATCH_TIMEOUT_PROCESS: Duration = Duration::from_secs(30);

/// Deadline for starting a microvm workload (boot takes longer).
pub const DISPATCH_TIMEOUT_MICROVM: Duration = Duration::from_secs(60);

/// Routes workload commands to the executor owning their placement.
#[derive(Clone)]
pub struct Dispatcher {
    registry: ExecutorRegistry,
    process_deadline: Duration,
    microvm_deadline: Duration,
}

impl Dispatcher {
    pub fn new(registry: ExecutorRegistry) -> Self {
        Self {
            registry,
            process_deadline: DISPATCH_TIMEOUT_PROCESS,
            microvm_deadline: DISPATCH_TIMEOUT_MICROVM,
        }
    }

    /// Override both deadlines (used by tests).
    pub fn with_deadlines(mut self, process: Duration, microvm: Duration) -> Self {
        self.process_deadline = process;
        self.microvm_deadline = microvm;
        self
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    fn deadline_for(&self, kind: WorkloadKind) -> Duration {
        match kind {
            WorkloadKind::Process => self.process_deadline,
            WorkloadKind::Microvm => self.microvm_deadline,
        }
    }

    /// Start a workload on its placed node, waiting for the executor's
    /// acknowledgement. Every error is explicit — exceeding the
    /// deadline returns `Timeout`, never a hang.
    pub async fn start(&self, workload: &WorkloadRecord) -> DispatchResult<()> {
        let node_id = placed_node(workload)?;
        let executor = self.registry.resolve(node_id).await?;
        let deadline = self.deadline_for(workload.kind);

        debug!(
            workload = %workload.id,
            node = %node_id,
            kind = workload.kind.as_str(),
            deadline_s = deadline.as_secs(),
            "dispatching start"
        );

        match tokio::time::timeout(deadline, executor.start_workload(workload.clone())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(DispatchError::Executor(e)),
            Err(_) => Err(DispatchError::Timeout {
                node: node_id.to_string(),
                seconds: deadline.as_secs(),
            }),
        }
    }

    /// Stop a workload, fire-and-forget. Resolution failures (no
    /// placement, unreachable agent) are reported; the executor's own
    /// result is logged by the spawned task.
    pub async fn stop(&self, workload: &WorkloadRecord) -> DispatchResult<()> {
        let node_id = placed_node(workload)?;
        let executor = self.registry.resolve(node_id).await?;

        let workload_id = workload.id.clone();
        let node = node_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = executor.stop_workload(workload_id.clone()).await {
                warn!(workload = %workload_id, %node, error = %e, "stop dispatch failed");
            }
        });
        Ok(())
    }

    /// Run a command inside a workload and return its output.
    pub async fn exec(
        &self,
        workload: &WorkloadRecord,
        command: &str,
        timeout: Duration,
    ) -> DispatchResult<String> {
        let node_id = placed_node(workload)?;
        let executor = self.registry.resolve(node_id).await?;

        match tokio::time::timeout(
            timeout,
            executor.exec_in_workload(workload.id.clone(), command.to_string(), timeout),
        )
        .await
        {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(DispatchError::Executor(e)),
            Err(_) => Err(DispatchError::Timeout {
                node: node_id.to_string(),
                seconds: timeout.as_secs(),
            }),
        }
    }
}

fn placed_node(workload: &WorkloadRecord) -> DispatchResult<&str> {
    workload
        .node_id
        .as_deref()
        .ok_or_else(|| DispatchError::NotFound(workload.id.clone()))
}
