//! cairn-dispatch — routing start/stop/exec to the owning executor.
//!
//! Each agent owns one executor for the workloads placed on its node.
//! The dispatcher resolves a workload's placement to the registered
//! executor and wraps the call in a per-kind deadline. In
//! single-process mode the executor is an in-process object; a remote
//! agent hides behind the same trait.
//!
//! Start dispatch is synchronous (waits for the executor's ack); stop
//! dispatch is fire-and-forget but still reports resolution failures
//! to the caller.

pub mod dispatcher;
pub mod executor;

pub use dispatcher::{DISPATCH_TIMEOUT_MICROVM, DISPATCH_TIMEOUT_PROCESS, Dispatcher};
pub use executor::{DispatchError, DispatchResult, ExecFuture, Executor, ExecutorRegistry};
