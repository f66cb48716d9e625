//! Domain types for the Cairn record store.
//!
//! These are the durable source-of-truth records the fact base is
//! projected from. All types are serializable to/from JSON for storage
//! in redb tables. Timestamps are UTC unix seconds; resource counts are
//! `i64` so they flow into the fact model's integer values unchanged.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Unique identifier for a node (UUID string, server-generated).
pub type NodeId = String;

/// Unique identifier for a workload (UUID string, server-generated).
pub type WorkloadId = String;

// ── Node ──────────────────────────────────────────────────────────

/// Availability status of an agent host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Available,
    Unavailable,
    Draining,
}

impl NodeStatus {
    /// The status name as it appears in the rule language.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Available => "available",
            NodeStatus::Unavailable => "unavailable",
            NodeStatus::Draining => "draining",
        }
    }
}

/// One agent host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRecord {
    pub id: NodeId,
    /// Unique across the cluster; re-registrations of the same hostname
    /// are the same logical node.
    pub hostname: String,
    pub status: NodeStatus,
    pub cpu_total: i64,
    pub memory_total_mb: i64,
    pub cpu_used: i64,
    pub memory_used_mb: i64,
    /// Hypervisor tag when the host can run microvms (e.g. "kvm").
    pub hypervisor: Option<String>,
    /// Capability-type → capability-value, matched against workload constraints.
    pub capabilities: HashMap<String, String>,
    /// Unix timestamp of the last heartbeat, absent until first contact.
    pub last_heartbeat_at: Option<u64>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl NodeRecord {
    pub fn cpu_free(&self) -> i64 {
        self.cpu_total - self.cpu_used
    }

    pub fn memory_free_mb(&self) -> i64 {
        self.memory_total_mb - self.memory_used_mb
    }
}

// ── Workload ──────────────────────────────────────────────────────

/// What kind of unit the agent launches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadKind {
    Process,
    Microvm,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Process => "process",
            WorkloadKind::Microvm => "microvm",
        }
    }
}

/// Lifecycle status of a workload.
///
/// The transition graph lives in the shipped lifecycle rules;
/// `Stopped` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadStatus {
    Pending,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl WorkloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadStatus::Pending => "pending",
            WorkloadStatus::Starting => "starting",
            WorkloadStatus::Running => "running",
            WorkloadStatus::Stopping => "stopping",
            WorkloadStatus::Stopped => "stopped",
            WorkloadStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkloadStatus::Stopped | WorkloadStatus::Failed)
    }
}

/// One requested unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkloadRecord {
    pub id: WorkloadId,
    pub kind: WorkloadKind,
    pub status: WorkloadStatus,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cpu_required: i64,
    pub memory_required_mb: i64,
    /// Required capability-type → value; all must match the node.
    pub constraints: HashMap<String, String>,
    /// Placement; set by the coordinator, nullified when the node is deleted.
    pub node_id: Option<NodeId>,
    /// Last failure reason, set by the coordinator or reported by agents.
    pub error: Option<String>,
    pub started_at: Option<u64>,
    pub stopped_at: Option<u64>,
    /// Observed address, reported by the agent for microvms.
    pub ip: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

// ── Workload event ────────────────────────────────────────────────

/// Append-only audit entry for a workload. Never updated, never
/// deleted except by cascade when the workload itself is deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkloadEventRecord {
    pub id: String,
    pub workload_id: WorkloadId,
    pub event_type: String,
    pub metadata: HashMap<String, String>,
    pub inserted_at: u64,
}

impl WorkloadEventRecord {
    /// Build the composite key for the workload_events table.
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.workload_id, self.id)
    }
}

// ── Scheduling rule ───────────────────────────────────────────────

/// A user-supplied rule extending the shipped rule base.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleRecord {
    pub id: String,
    /// Unique across the cluster.
    pub name: String,
    pub description: Option<String>,
    pub rule_text: String,
    pub enabled: bool,
    /// Load order among user rules, ascending.
    pub priority: i64,
    pub created_at: u64,
    pub updated_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_free_resources() {
        let node = NodeRecord {
            id: "n1".to_string(),
            hostname: "host-a".to_string(),
            status: NodeStatus::Available,
            cpu_total: 8,
            memory_total_mb: 16384,
            cpu_used: 3,
            memory_used_mb: 4096,
            hypervisor: None,
            capabilities: HashMap::new(),
            last_heartbeat_at: None,
            created_at: 0,
            updated_at: 0,
        };
        assert_eq!(node.cpu_free(), 5);
        assert_eq!(node.memory_free_mb(), 12288);
    }

    #[test]
    fn status_names_match_rule_language() {
        assert_eq!(NodeStatus::Available.as_str(), "available");
        assert_eq!(WorkloadStatus::Pending.as_str(), "pending");
        assert_eq!(WorkloadKind::Microvm.as_str(), "microvm");
    }

    #[test]
    fn terminal_statuses() {
        assert!(WorkloadStatus::Stopped.is_terminal());
        assert!(WorkloadStatus::Failed.is_terminal());
        assert!(!WorkloadStatus::Running.is_terminal());
        assert!(!WorkloadStatus::Pending.is_terminal());
    }

    #[test]
    fn event_table_key_is_prefixed_by_workload() {
        let event = WorkloadEventRecord {
            id: "e1".to_string(),
            workload_id: "w1".to_string(),
            event_type: "starting".to_string(),
            metadata: HashMap::new(),
            inserted_at: 1000,
        };
        assert_eq!(event.table_key(), "w1:e1");
    }

    #[test]
    fn status_serde_round_trip() {
        let json = serde_json::to_string(&WorkloadStatus::Stopping).unwrap();
        assert_eq!(json, r#""stopping""#);
        let back: WorkloadStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, WorkloadStatus::Stopping);
    }
}
