//! cairn-reactor — corrective actions from derived facts.
//!
//! The reactor subscribes to derived-fact snapshots and executes the
//! side effects the rules call for: marking stale nodes unavailable,
//! failing workloads whose node died, clearing orphaned placements,
//! re-placing restartable workloads, and logging overload.
//!
//! Snapshots are level-triggered state and arrive every tick, so every
//! handler is idempotent and actions are debounced: one action per
//! `(category, entity)` per debounce window. The reactor never
//! propagates errors — it logs and lets the next snapshot retry.

pub mod reactor;

pub use reactor::Reactor;
