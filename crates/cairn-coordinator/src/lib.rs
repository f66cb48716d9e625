//! cairn-coordinator — the execution layer beneath the external API.
//!
//! The coordinator is the single write path to the record store. Every
//! successful mutation publishes a `RecordChange` on the bus before
//! returning, which is how the fact base converges; the reactor's
//! corrective writes come back through here for the same reason.
//!
//! The deploy pipeline is the heart: validate the platform can run the
//! workload kind, create it `pending`, force a rules evaluation, pick a
//! placement candidate by strategy, flip it to `starting`, and hand off
//! to the per-node dispatcher.

pub mod coordinator;
pub mod error;
pub mod platform;
pub mod types;

pub use coordinator::Coordinator;
pub use error::{CoordinatorError, CoordinatorResult};
pub use platform::{HostPlatform, PlatformCapabilities, StaticPlatform};
pub use types::*;
