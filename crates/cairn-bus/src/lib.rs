//! cairn-bus — typed in-process publish/subscribe.
//!
//! Two topics connect the coordinator, the fact store, and the
//! reactor:
//!
//! - **record changes** — emitted by the coordinator façade after
//!   every successful mutation, consumed by the FactStore to keep the
//!   fact base in sync;
//! - **derived snapshots** — emitted by the FactStore after each
//!   evaluation, consumed by the reactor.
//!
//! Delivery is at-least-once within the process with per-subscriber
//! FIFO ordering (tokio broadcast). A subscriber that lags far enough
//! to drop messages is healed by the periodic reconciliation (record
//! changes) or by the next snapshot (snapshots are level-triggered
//! state, not edge-triggered events).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use cairn_store::{NodeRecord, RuleRecord, WorkloadEventRecord, WorkloadRecord};

/// Default per-topic channel capacity.
const DEFAULT_CAPACITY: usize = 256;

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
}

/// The record a change concerns, carried whole so subscribers never
/// have to read the store on the hot path. For deletes this is the
/// last state before removal.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangedRecord {
    Node(NodeRecord),
    Workload(WorkloadRecord),
    Event(WorkloadEventRecord),
    Rule(RuleRecord),
}

impl ChangedRecord {
    /// The changed entity's id.
    pub fn id(&self) -> &str {
        match self {
            ChangedRecord::Node(n) => &n.id,
            ChangedRecord::Workload(w) => &w.id,
            ChangedRecord::Event(e) => &e.id,
            ChangedRecord::Rule(r) => &r.id,
        }
    }

    /// The schema name, for logging.
    pub fn schema(&self) -> &'static str {
        match self {
            ChangedRecord::Node(_) => "node",
            ChangedRecord::Workload(_) => "workload",
            ChangedRecord::Event(_) => "workload_event",
            ChangedRecord::Rule(_) => "scheduling_rule",
        }
    }
}

/// One message on the record-changes topic.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordChange {
    pub op: ChangeOp,
    pub record: ChangedRecord,
}

/// One message on the derived-facts topic: all current derivations of
/// the reactor-relevant predicates, published after each evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DerivedSnapshot {
    pub stale_nodes: Vec<String>,
    pub should_fail: Vec<String>,
    pub orphaned: Vec<String>,
    pub can_restart: Vec<String>,
    pub overloaded: Vec<String>,
}

impl DerivedSnapshot {
    pub fn is_empty(&self) -> bool {
        self.stale_nodes.is_empty()
            && self.should_fail.is_empty()
            && self.orphaned.is_empty()
            && self.can_restart.is_empty()
            && self.overloaded.is_empty()
    }
}

/// The process-wide bus. Cheap to clone; all clones share the topics.
#[derive(Clone)]
pub struct ChangeBus {
    records: broadcast::Sender<RecordChange>,
    snapshots: broadcast::Sender<DerivedSnapshot>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (records, _) = broadcast::channel(capacity);
        let (snapshots, _) = broadcast::channel(capacity);
        Self { records, snapshots }
    }

    /// Publish a record change. Send errors (no subscribers yet) are
    /// normal during startup and ignored.
    pub fn publish_record(&self, op: ChangeOp, record: ChangedRecord) {
        debug!(
            schema = record.schema(),
            id = record.id(),
            ?op,
            "record change published"
        );
        let _ = self.records.send(RecordChange { op, record });
    }

    /// Publish a derived-facts snapshot.
    pub fn publish_snapshot(&self, snapshot: DerivedSnapshot) {
        let _ = self.snapshots.send(snapshot);
    }

    pub fn subscribe_records(&self) -> broadcast::Receiver<RecordChange> {
        self.records.subscribe()
    }

    pub fn subscribe_snapshots(&self) -> broadcast::Receiver<DerivedSnapshot> {
        self.snapshots.subscribe()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}
