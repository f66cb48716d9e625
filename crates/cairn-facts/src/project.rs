//! Projection from durable records to base facts.
//!
//! Each record type maps to exactly one set of base facts; the
//! FactStore drives the live fact base toward the union of these
//! projections. Status and type fields become interned symbols,
//! matching their spelling in the rule language.

use cairn_store::{NodeRecord, WorkloadEventRecord, WorkloadRecord};

use crate::value::{Fact, Value};

/// Predicates (name, arity) projected from a node record, all keyed by
/// node id in the first argument.
pub const NODE_PREDICATES: &[(&str, usize)] = &[
    ("node", 3),
    ("node_resources", 3),
    ("node_resources_used", 3),
    ("node_resources_free", 3),
    ("node_heartbeat", 2),
    ("node_capability", 3),
];

/// Predicates (name, arity) projected from a workload record, keyed by
/// workload id. Event facts are a separate entity and not listed here.
pub const WORKLOAD_PREDICATES: &[(&str, usize)] = &[
    ("workload", 3),
    ("workload_placement", 2),
    ("workload_resources", 3),
    ("workload_constraint", 3),
];

/// Predicates (name, arity) projected from a workload event record.
pub const EVENT_PREDICATES: &[(&str, usize)] = &[("workload_event", 3)];

/// All projected (name, arity) pairs — the reconciliation scope.
pub fn projected_predicates() -> impl Iterator<Item = (&'static str, usize)> {
    NODE_PREDICATES
        .iter()
        .chain(WORKLOAD_PREDICATES)
        .chain(EVENT_PREDICATES)
        .copied()
}

/// A projectable record, dispatched by tag.
#[derive(Debug, Clone)]
pub enum Record {
    Node(NodeRecord),
    Workload(WorkloadRecord),
    Event(WorkloadEventRecord),
}

/// Project any record to its base facts.
pub fn project(record: &Record) -> Vec<Fact> {
    match record {
        Record::Node(node) => project_node(node),
        Record::Workload(workload) => project_workload(workload),
        Record::Event(event) => project_event(event),
    }
}

/// Node → node/3, node_resources/3, node_resources_used/3,
/// node_resources_free/3, plus heartbeat and capability facts.
pub fn project_node(node: &NodeRecord) -> Vec<Fact> {
    let id = Value::str(node.id.clone());
    let mut facts = vec![
        Fact::new(
            "node",
            vec![
                id.clone(),
                Value::str(node.hostname.clone()),
                Value::sym(node.status.as_str()),
            ],
        ),
        Fact::new(
            "node_resources",
            vec![
                id.clone(),
                Value::int(node.cpu_total),
                Value::int(node.memory_total_mb),
            ],
        ),
        Fact::new(
            "node_resources_used",
            vec![
                id.clone(),
                Value::int(node.cpu_used),
                Value::int(node.memory_used_mb),
            ],
        ),
        // Pre-computed difference; never edited independently.
        Fact::new(
            "node_resources_free",
            vec![
                id.clone(),
                Value::int(node.cpu_free()),
                Value::int(node.memory_free_mb()),
            ],
        ),
    ];

    if let Some(beat) = node.last_heartbeat_at {
        facts.push(Fact::new(
            "node_heartbeat",
            vec![id.clone(), Value::int(beat as i64)],
        ));
    }

    for (cap_type, cap_value) in &node.capabilities {
        facts.push(Fact::new(
            "node_capability",
            vec![id.clone(), Value::sym(cap_type), Value::sym(cap_value)],
        ));
    }

    if let Some(hv) = &node.hypervisor {
        facts.push(Fact::new(
            "node_capability",
            vec![id, Value::sym("hypervisor"), Value::sym(hv)],
        ));
    }

    facts
}

/// Workload → workload/3, workload_resources/3, plus placement and
/// constraint facts.
pub fn project_workload(workload: &WorkloadRecord) -> Vec<Fact> {
    let id = Value::str(workload.id.clone());
    let mut facts = vec![
        Fact::new(
            "workload",
            vec![
                id.clone(),
                Value::sym(workload.kind.as_str()),
                Value::sym(workload.status.as_str()),
            ],
        ),
        Fact::new(
            "workload_resources",
            vec![
                id.clone(),
                Value::int(workload.cpu_required),
                Value::int(workload.memory_required_mb),
            ],
        ),
    ];

    if let Some(node_id) = &workload.node_id {
        facts.push(Fact::new(
            "workload_placement",
            vec![id.clone(), Value::str(node_id.clone())],
        ));
    }

    for (cap_type, cap_value) in &workload.constraints {
        facts.push(Fact::new(
            "workload_constraint",
            vec![id.clone(), Value::sym(cap_type), Value::sym(cap_value)],
        ));
    }

    facts
}

/// WorkloadEvent → one workload_event/3.
pub fn project_event(event: &WorkloadEventRecord) -> Vec<Fact> {
    vec![Fact::new(
        "workload_event",
        vec![
            Value::str(event.workload_id.clone()),
            Value::sym(&event.event_type),
            Value::int(event.inserted_at as i64),
        ],
    )]
}
