//! cairn-core — shared configuration and policy types.
//!
//! Every other Cairn crate depends on this one for the daemon
//! configuration (`CairnConfig`, loaded from `cairn.toml`) and the
//! placement `Strategy` policy enum. Keeping these here avoids a
//! dependency from the leaf crates onto the daemon.

pub mod config;

pub use config::{CairnConfig, ConfigError, Strategy};
