//! cairn-store — durable record store for the Cairn coordinator.
//!
//! Backed by [redb](https://docs.rs/redb), this crate owns the four
//! record families the orchestrator persists: nodes, workloads,
//! workload events, and scheduling rules. All domain types are
//! JSON-serialized into redb's `&[u8]` value columns.
//!
//! Relational semantics the rest of the system relies on are enforced
//! at this boundary:
//!
//! - node hostnames are unique;
//! - deleting a node nullifies `node_id` on workloads placed there;
//! - deleting a workload cascades to its events;
//! - resource usage never exceeds capacity.
//!
//! The `RecordStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use store::RecordStore;
pub use types::*;
