//! cairn-agent — the worker-node side of the heartbeat protocol.
//!
//! An agent announces itself to the coordinator on first contact
//! (auto-registering its hostname with detected capacity and
//! capabilities), attaches its executor to the dispatch registry, and
//! then heartbeats every few seconds with current resource usage.
//!
//! In single-process mode the "RPC" is an in-process call on the
//! coordinator; a remote transport would wrap the same calls.

pub mod agent;
pub mod detect;

pub use agent::{Agent, AgentConfig};
pub use detect::{detect_capabilities, detect_hostname, detect_resources};
