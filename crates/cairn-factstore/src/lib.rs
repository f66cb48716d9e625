//! cairn-factstore — the rules-engine driver service.
//!
//! The FactStore owns the one `Database` handle in the process and
//! mediates every assertion:
//!
//! - at startup it parses the shipped rule files (fatal on error),
//!   bulk-loads all durable records, projects them to facts, and runs
//!   the first evaluation;
//! - a **time tick** (default 5 s) refreshes the singleton `now/1`
//!   fact, re-evaluates, and publishes a derived snapshot;
//! - a **record-change handler** keeps the base facts in lockstep with
//!   coordinator mutations by diffing the entity's previous fact slice
//!   against its fresh projection;
//! - a **reconciliation** pass (default 30 s) re-reads the whole store
//!   and drives the base facts to equal the full projection, healing
//!   anything a lost change event left behind, and hot-reloads user
//!   rules whose parsed form changed.
//!
//! Queries are answered from the shared handle under a read lock;
//! writers (the three loops above) serialize on the write lock.

pub mod error;
pub mod rules;
pub mod service;

pub use error::{FactStoreError, FactStoreResult};
pub use service::FactStore;
