//! cairn-facts — the normalized fact tuple model.
//!
//! A fact is `(predicate, [arg, ...])` with a fixed arity per
//! predicate; arguments are tagged values (`Symbol | String | Integer`).
//! This crate owns the pure mapping from durable records to base facts
//! and the set-difference used by change handling and reconciliation.
//! No I/O, no mutation — everything here is a function of its inputs.

pub mod diff;
pub mod project;
pub mod value;

pub use diff::diff;
pub use project::{
    EVENT_PREDICATES, NODE_PREDICATES, Record, WORKLOAD_PREDICATES, project, project_event,
    project_node, project_workload, projected_predicates,
};
pub use value::{Fact, Pattern, Symbol, Term, Value};
