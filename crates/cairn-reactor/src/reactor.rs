//! The reactor loop and its debounce table.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use cairn_bus::{ChangeBus, DerivedSnapshot};
use cairn_coordinator::{Coordinator, CoordinatorError};

/// Which corrective action a debounce entry covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Category {
    StaleNode,
    ShouldFail,
    Orphaned,
    Restart,
    Overloaded,
}

/// Executes idempotent corrective actions from snapshots.
pub struct Reactor {
    coordinator: Coordinator,
    bus: ChangeBus,
    debounce_window: Duration,
    /// `(category, entity id)` → when we last acted on it.
    acted: HashMap<(Category, String), Instant>,
}

impl Reactor {
    pub fn new(coordinator: Coordinator, bus: ChangeBus) -> Self {
        Self {
            coordinator,
            bus,
            debounce_window: Duration::from_secs(30),
            acted: HashMap::new(),
        }
    }

    /// Override the debounce window (configuration, tests).
    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    /// Consume snapshots until shutdown.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut rx = self.bus.subscribe_snapshots();
        info!(
            debounce_s = self.debounce_window.as_secs(),
            "reactor started"
        );
        loop {
            tokio::select! {
                result = rx.recv() => match result {
                    Ok(snapshot) => self.apply(&snapshot).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Snapshots are state; the next one supersedes.
                        debug!(missed, "reactor lagged behind snapshots");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.changed() => {
                    info!("reactor shutting down");
                    break;
                }
            }
        }
    }

    /// Act on one snapshot. Public so tests and the deploy path can
    /// drive the reactor without the subscription loop.
    pub async fn apply(&mut self, snapshot: &DerivedSnapshot) {
        for node_id in &snapshot.stale_nodes {
            if self.debounced(Category::StaleNode, node_id) {
                continue;
            }
            self.handle_stale_node(node_id).await;
        }
        for workload_id in &snapshot.should_fail {
            if self.debounced(Category::ShouldFail, workload_id) {
                continue;
            }
            self.handle_should_fail(workload_id).await;
        }
        for workload_id in &snapshot.orphaned {
            if self.debounced(Category::Orphaned, workload_id) {
                continue;
            }
            self.handle_orphaned(workload_id).await;
        }
        for workload_id in &snapshot.can_restart {
            if self.debounced(Category::Restart, workload_id) {
                continue;
            }
            self.handle_restart(workload_id).await;
        }
        for node_id in &snapshot.overloaded {
            if self.debounced(Category::Overloaded, node_id) {
                continue;
            }
            // Observability only; no record mutation.
            warn!(%node_id, "node overloaded");
        }

        self.acted
            .retain(|_, at| at.elapsed() < self.debounce_window * 2);
    }

    /// True when this `(category, id)` was acted on inside the window.
    /// Records the action time otherwise.
    fn debounced(&mut self, category: Category, id: &str) -> bool {
        let key = (category, id.to_string());
        if let Some(at) = self.acted.get(&key)
            && at.elapsed() < self.debounce_window
        {
            return true;
        }
        self.acted.insert(key, Instant::now());
        false
    }

    async fn handle_stale_node(&self, node_id: &str) {
        match self.coordinator.mark_node_unavailable(node_id) {
            Ok(true) => info!(%node_id, "stale node marked unavailable"),
            Ok(false) => debug!(%node_id, "stale node already unavailable"),
            Err(CoordinatorError::NotFound(_)) => {
                debug!(%node_id, "stale node disappeared before the reactor acted");
            }
            Err(e) => warn!(%node_id, error = %e, "failed to mark stale node"),
        }
    }

    async fn handle_should_fail(&self, workload_id: &str) {
        match self
            .coordinator
            .fail_workload(workload_id, "Node unhealthy")
            .await
        {
            Ok(_) => info!(%workload_id, "workload failed: node unhealthy"),
            Err(CoordinatorError::NotFound(_)) => {
                debug!(%workload_id, "workload disappeared before the reactor acted");
            }
            Err(e) => warn!(%workload_id, error = %e, "failed to fail workload"),
        }
    }

    async fn handle_orphaned(&self, workload_id: &str) {
        match self.coordinator.orphan_workload(workload_id).await {
            Ok(_) => info!(%workload_id, "orphaned workload failed and unplaced"),
            Err(CoordinatorError::NotFound(_)) => {
                debug!(%workload_id, "workload disappeared before the reactor acted");
            }
            Err(e) => warn!(%workload_id, error = %e, "failed to orphan workload"),
        }
    }

    async fn handle_restart(&self, workload_id: &str) {
        match self.coordinator.restart_workload(workload_id).await {
            Ok(workload) => {
                info!(
                    %workload_id,
                    node = workload.node_id.as_deref().unwrap_or("-"),
                    "workload restarted"
                );
            }
            Err(CoordinatorError::NoCandidates(_)) => {
                debug!(%workload_id, "no candidates to restart onto; will retry");
            }
            Err(CoordinatorError::NotFound(_)) => {
                debug!(%workload_id, "workload disappeared before the reactor acted");
            }
            Err(e) => warn!(%workload_id, error = %e, "failed to restart workload"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_bus::ChangeBus;
    use cairn_coordinator::{Coordinator, Heartbeat, NodeSpec, WorkloadSpec};
    use cairn_core::{CairnConfig, Strategy};
    use cairn_dispatch::{Dispatcher, ExecutorRegistry};
    use cairn_factstore::FactStore;
    use cairn_store::{NodeStatus, RecordStore, WorkloadStatus};

    async fn coordinator() -> (Coordinator, ChangeBus) {
        let store = RecordStore::open_in_memory().unwrap();
        let bus = ChangeBus::new();
        let facts = FactStore::bootstrap(store.clone(), bus.clone(), CairnConfig::default())
            .await
            .unwrap();
        let dispatcher = Dispatcher::new(ExecutorRegistry::new());
        (
            Coordinator::new(store, bus.clone(), facts, dispatcher, Strategy::Spread),
            bus,
        )
    }

    fn snapshot_with_stale(node_id: &str) -> DerivedSnapshot {
        DerivedSnapshot {
            stale_nodes: vec![node_id.to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn stale_node_is_marked_unavailable() {
        let (coordinator, bus) = coordinator().await;
        let node = coordinator
            .create_node(NodeSpec::new("host-a", 8, 16384))
            .unwrap();

        let mut reactor = Reactor::new(coordinator.clone(), bus);
        reactor.apply(&snapshot_with_stale(&node.id)).await;

        assert_eq!(
            coordinator.get_node(&node.id).unwrap().status,
            NodeStatus::Unavailable
        );
    }

    #[tokio::test]
    async fn debounce_allows_one_action_per_window() {
        let (coordinator, bus) = coordinator().await;
        let node = coordinator
            .create_node(NodeSpec::new("host-a", 8, 16384))
            .unwrap();

        let mut reactor =
            Reactor::new(coordinator.clone(), bus).with_debounce_window(Duration::from_secs(60));

        reactor.apply(&snapshot_with_stale(&node.id)).await;
        // Flip it back; a debounced second snapshot must not re-flip.
        coordinator
            .heartbeat_node(
                &node.id,
                Heartbeat {
                    cpu_used: 0,
                    memory_used_mb: 0,
                    status: NodeStatus::Available,
                },
            )
            .unwrap();
        reactor.apply(&snapshot_with_stale(&node.id)).await;

        assert_eq!(
            coordinator.get_node(&node.id).unwrap().status,
            NodeStatus::Available
        );
    }

    #[tokio::test]
    async fn debounce_expires_after_the_window() {
        let (coordinator, bus) = coordinator().await;
        let node = coordinator
            .create_node(NodeSpec::new("host-a", 8, 16384))
            .unwrap();

        let mut reactor = Reactor::new(coordinator.clone(), bus)
            .with_debounce_window(Duration::from_millis(10));

        reactor.apply(&snapshot_with_stale(&node.id)).await;
        coordinator
            .heartbeat_node(
                &node.id,
                Heartbeat {
                    cpu_used: 0,
                    memory_used_mb: 0,
                    status: NodeStatus::Available,
                },
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        reactor.apply(&snapshot_with_stale(&node.id)).await;

        assert_eq!(
            coordinator.get_node(&node.id).unwrap().status,
            NodeStatus::Unavailable
        );
    }

    #[tokio::test]
    async fn should_fail_fails_the_workload() {
        let (coordinator, bus) = coordinator().await;
        let workload = coordinator
            .create_workload(WorkloadSpec::process("/bin/sleep", 1, 128))
            .unwrap();

        let mut reactor = Reactor::new(coordinator.clone(), bus);
        let snapshot = DerivedSnapshot {
            should_fail: vec![workload.id.clone()],
            ..Default::default()
        };
        reactor.apply(&snapshot).await;

        let failed = coordinator.get_workload(&workload.id).unwrap();
        assert_eq!(failed.status, WorkloadStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("Node unhealthy"));
    }

    #[tokio::test]
    async fn orphaned_clears_placement() {
        let (coordinator, bus) = coordinator().await;
        let workload = coordinator
            .create_workload(WorkloadSpec::process("/bin/sleep", 1, 128))
            .unwrap();

        let mut reactor = Reactor::new(coordinator.clone(), bus);
        let snapshot = DerivedSnapshot {
            orphaned: vec![workload.id.clone()],
            ..Default::default()
        };
        reactor.apply(&snapshot).await;

        let orphaned = coordinator.get_workload(&workload.id).unwrap();
        assert_eq!(orphaned.status, WorkloadStatus::Failed);
        assert!(orphaned.node_id.is_none());
        assert_eq!(orphaned.error.as_deref(), Some("Node no longer exists"));
    }

    #[tokio::test]
    async fn restart_without_candidates_is_quiet() {
        let (coordinator, bus) = coordinator().await;
        let workload = coordinator
            .create_workload(WorkloadSpec::process("/bin/sleep", 1, 128))
            .unwrap();

        let mut reactor = Reactor::new(coordinator.clone(), bus);
        let snapshot = DerivedSnapshot {
            can_restart: vec![workload.id.clone()],
            ..Default::default()
        };
        // Must not error or mutate anything.
        reactor.apply(&snapshot).await;
        assert_eq!(
            coordinator.get_workload(&workload.id).unwrap().status,
            WorkloadStatus::Pending
        );
    }

    #[tokio::test]
    async fn overload_is_log_only() {
        let (coordinator, bus) = coordinator().await;
        let node = coordinator
            .create_node(NodeSpec::new("host-a", 8, 16384))
            .unwrap();

        let mut reactor = Reactor::new(coordinator.clone(), bus);
        let snapshot = DerivedSnapshot {
            overloaded: vec![node.id.clone()],
            ..Default::default()
        };
        reactor.apply(&snapshot).await;

        // No record mutation.
        assert_eq!(
            coordinator.get_node(&node.id).unwrap().status,
            NodeStatus::Available
        );
    }

    #[tokio::test]
    async fn unknown_entities_do_not_error() {
        let (coordinator, bus) = coordinator().await;
        let mut reactor = Reactor::new(coordinator, bus);
        let snapshot = DerivedSnapshot {
            stale_nodes: vec!["ghost-node".to_string()],
            should_fail: vec!["ghost-workload".to_string()],
            orphaned: vec!["ghost-workload-2".to_string()],
            can_restart: vec!["ghost-workload-3".to_string()],
            overloaded: vec!["ghost-node-2".to_string()],
        };
        reactor.apply(&snapshot).await;
    }

    #[tokio::test]
    async fn same_snapshot_twice_mutates_once() {
        let (coordinator, bus) = coordinator().await;
        let workload = coordinator
            .create_workload(WorkloadSpec::process("/bin/sleep", 1, 128))
            .unwrap();

        let mut reactor = Reactor::new(coordinator.clone(), bus);
        let snapshot = DerivedSnapshot {
            should_fail: vec![workload.id.clone()],
            ..Default::default()
        };
        reactor.apply(&snapshot).await;
        let events_after_first = coordinator.list_events(&workload.id).unwrap().len();
        reactor.apply(&snapshot).await;

        assert_eq!(
            coordinator.list_events(&workload.id).unwrap().len(),
            events_after_first
        );
    }
}
