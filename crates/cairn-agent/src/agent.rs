//! The agent: announce, attach an executor, heartbeat.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use cairn_coordinator::{Announce, Coordinator, CoordinatorError, Heartbeat};
use cairn_dispatch::Executor;
use cairn_store::{NodeStatus, WorkloadStatus};

use crate::detect;

/// Configuration for one agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// This host's name; the cluster-unique node identity.
    pub hostname: String,
    /// Override detected CPU capacity.
    pub cpu_total: Option<i64>,
    /// Override detected memory capacity (MiB).
    pub memory_total_mb: Option<i64>,
    /// How often to heartbeat.
    pub heartbeat_interval: Duration,
}

impl AgentConfig {
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            cpu_total: None,
            memory_total_mb: None,
            heartbeat_interval: Duration::from_secs(5),
        }
    }
}

/// A worker node participating in the cluster.
pub struct Agent {
    config: AgentConfig,
    coordinator: Coordinator,
    /// Assigned node id (set after announce).
    node_id: Option<String>,
}

impl Agent {
    pub fn new(config: AgentConfig, coordinator: Coordinator) -> Self {
        Self {
            config,
            coordinator,
            node_id: None,
        }
    }

    /// The assigned node id (None until announced).
    pub fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }

    /// Announce this host to the coordinator. First contact from an
    /// unknown hostname auto-registers the node with detected
    /// capabilities; later contacts update the same logical node.
    pub async fn announce(&mut self) -> Result<String, CoordinatorError> {
        let (capabilities, hypervisor) = detect::detect_capabilities();
        let (detected_cpus, detected_memory_mb) = detect::detect_resources();

        let node = self.coordinator.announce_node(Announce {
            hostname: self.config.hostname.clone(),
            cpu_total: self.config.cpu_total.unwrap_or(detected_cpus),
            memory_total_mb: self.config.memory_total_mb.unwrap_or(detected_memory_mb),
            hypervisor,
            capabilities,
        })?;

        info!(
            node_id = %node.id,
            hostname = %node.hostname,
            cpu_total = node.cpu_total,
            memory_total_mb = node.memory_total_mb,
            "agent announced"
        );
        self.node_id = Some(node.id.clone());
        Ok(node.id)
    }

    /// Attach this agent's executor so the dispatcher can route
    /// start/stop commands for workloads placed here.
    pub async fn attach_executor(&self, executor: Arc<dyn Executor>) -> Result<(), CoordinatorError> {
        let node_id = self.announced_id()?;
        self.coordinator
            .dispatcher()
            .registry()
            .attach_executor(node_id, executor)
            .await;
        Ok(())
    }

    /// Send one heartbeat carrying current usage.
    pub async fn heartbeat(&self) -> Result<(), CoordinatorError> {
        let node_id = self.announced_id()?;
        let (cpu_used, memory_used_mb) = self.usage(node_id)?;
        self.coordinator.heartbeat_node(
            node_id,
            Heartbeat {
                cpu_used,
                memory_used_mb,
                status: NodeStatus::Available,
            },
        )?;
        debug!(%node_id, cpu_used, memory_used_mb, "heartbeat sent");
        Ok(())
    }

    /// Run the heartbeat loop until shutdown.
    pub async fn run_heartbeat(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.config.heartbeat_interval;
        info!(interval_s = interval.as_secs(), "agent heartbeat loop started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.heartbeat().await {
                        warn!(error = %e, "heartbeat failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("agent heartbeat loop shutting down");
                    break;
                }
            }
        }
    }

    /// Sum the requirements of workloads active on this node. The
    /// agent-side launcher owns the real measurements; requirements
    /// are the accounting the scheduler budgets with.
    fn usage(&self, node_id: &str) -> Result<(i64, i64), CoordinatorError> {
        let workloads = self.coordinator.list_workloads()?;
        let mut cpu_used = 0;
        let mut memory_used_mb = 0;
        for workload in &workloads {
            if workload.node_id.as_deref() == Some(node_id)
                && matches!(
                    workload.status,
                    WorkloadStatus::Starting | WorkloadStatus::Running
                )
            {
                cpu_used += workload.cpu_required;
                memory_used_mb += workload.memory_required_mb;
            }
        }
        Ok((cpu_used, memory_used_mb))
    }

    fn announced_id(&self) -> Result<&str, CoordinatorError> {
        self.node_id
            .as_deref()
            .ok_or_else(|| CoordinatorError::NotFound("agent not announced yet".to_string()))
    }
}
