//! redb table definitions for the Cairn record store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized
//! domain types). Workload events use composite `{workload_id}:{event_id}`
//! keys so a workload's audit trail is one prefix scan.

use redb::TableDefinition;

/// Node records keyed by `{node_id}`.
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Workload records keyed by `{workload_id}`.
pub const WORKLOADS: TableDefinition<&str, &[u8]> = TableDefinition::new("workloads");

/// Workload events keyed by `{workload_id}:{event_id}`.
pub const WORKLOAD_EVENTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("workload_events");

/// Scheduling rules keyed by `{rule_id}`.
pub const SCHEDULING_RULES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("scheduling_rules");
