//! Request and response shapes for coordinator operations.

use std::collections::HashMap;

use cairn_store::{NodeStatus, WorkloadKind, WorkloadStatus};

/// Attributes for creating a node via the admin API.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub hostname: String,
    pub cpu_total: i64,
    pub memory_total_mb: i64,
    pub cpu_used: i64,
    pub memory_used_mb: i64,
    pub status: NodeStatus,
    pub hypervisor: Option<String>,
    pub capabilities: HashMap<String, String>,
    /// Admin-created nodes may be seeded with a heartbeat timestamp.
    pub last_heartbeat_at: Option<u64>,
}

impl NodeSpec {
    pub fn new(hostname: &str, cpu_total: i64, memory_total_mb: i64) -> Self {
        Self {
            hostname: hostname.to_string(),
            cpu_total,
            memory_total_mb,
            cpu_used: 0,
            memory_used_mb: 0,
            status: NodeStatus::Available,
            hypervisor: None,
            capabilities: HashMap::new(),
            last_heartbeat_at: None,
        }
    }
}

/// Partial update for a node. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct NodeUpdate {
    pub status: Option<NodeStatus>,
    pub cpu_total: Option<i64>,
    pub memory_total_mb: Option<i64>,
    pub cpu_used: Option<i64>,
    pub memory_used_mb: Option<i64>,
    pub hypervisor: Option<Option<String>>,
    pub capabilities: Option<HashMap<String, String>>,
}

/// One heartbeat from an agent.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    pub cpu_used: i64,
    pub memory_used_mb: i64,
    pub status: NodeStatus,
}

/// First-contact announcement from an agent: hostname identity plus
/// detected capacity and capabilities.
#[derive(Debug, Clone)]
pub struct Announce {
    pub hostname: String,
    pub cpu_total: i64,
    pub memory_total_mb: i64,
    pub hypervisor: Option<String>,
    pub capabilities: HashMap<String, String>,
}

/// Attributes for deploying a workload.
#[derive(Debug, Clone)]
pub struct WorkloadSpec {
    pub kind: WorkloadKind,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cpu_required: i64,
    pub memory_required_mb: i64,
    pub constraints: HashMap<String, String>,
}

impl WorkloadSpec {
    pub fn process(command: &str, cpu_required: i64, memory_required_mb: i64) -> Self {
        Self {
            kind: WorkloadKind::Process,
            command: command.to_string(),
            args: Vec::new(),
            env: HashMap::new(),
            cpu_required,
            memory_required_mb,
            constraints: HashMap::new(),
        }
    }
}

/// Partial update for a workload, as pushed by agents. `None` leaves
/// the field untouched; status changes are gated by the lifecycle.
#[derive(Debug, Clone, Default)]
pub struct WorkloadUpdate {
    pub status: Option<WorkloadStatus>,
    pub started_at: Option<u64>,
    pub stopped_at: Option<u64>,
    pub error: Option<String>,
    pub ip: Option<String>,
}

/// Attributes for creating a scheduling rule.
#[derive(Debug, Clone)]
pub struct RuleSpec {
    pub name: String,
    pub description: Option<String>,
    pub rule_text: String,
    pub enabled: bool,
    pub priority: i64,
}

/// Partial update for a scheduling rule.
#[derive(Debug, Clone, Default)]
pub struct RuleUpdate {
    pub description: Option<Option<String>>,
    pub rule_text: Option<String>,
    pub enabled: Option<bool>,
    pub priority: Option<i64>,
}

/// Aggregate cluster view computed directly from record queries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClusterStatus {
    pub nodes_total: usize,
    pub nodes_available: usize,
    pub nodes_unavailable: usize,
    pub nodes_draining: usize,
    pub workloads_total: usize,
    pub workloads_pending: usize,
    pub workloads_starting: usize,
    pub workloads_running: usize,
    pub workloads_stopping: usize,
    pub workloads_stopped: usize,
    pub workloads_failed: usize,
    pub cpu_total: i64,
    pub cpu_used: i64,
    pub memory_total_mb: i64,
    pub memory_used_mb: i64,
}
