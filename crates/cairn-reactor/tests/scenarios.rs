//! End-to-end scenarios across the store, fact base, coordinator, and
//! reactor, wired the way the daemon wires them (minus the timer
//! loops — tests drive ticks and reconciliation directly).

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use cairn_bus::{ChangeBus, ChangeOp, ChangedRecord, RecordChange};
use cairn_coordinator::{
    Coordinator, Heartbeat, NodeSpec, StaticPlatform, WorkloadSpec, WorkloadUpdate,
};
use cairn_core::{CairnConfig, Strategy};
use cairn_dispatch::{Dispatcher, ExecFuture, Executor, ExecutorRegistry};
use cairn_factstore::FactStore;
use cairn_reactor::Reactor;
use cairn_store::{NodeStatus, RecordStore, WorkloadStatus};

struct CountingExecutor {
    starts: AtomicUsize,
}

impl Executor for CountingExecutor {
    fn start_workload(&self, _workload: cairn_store::WorkloadRecord) -> ExecFuture<Result<(), String>> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }

    fn stop_workload(&self, _workload_id: String) -> ExecFuture<Result<(), String>> {
        Box::pin(async { Ok(()) })
    }

    fn exec_in_workload(
        &self,
        _workload_id: String,
        _command: String,
        _timeout: Duration,
    ) -> ExecFuture<Result<String, String>> {
        Box::pin(async { Ok(String::new()) })
    }
}

struct Cluster {
    store: RecordStore,
    coordinator: Coordinator,
    facts: FactStore,
    reactor: Reactor,
    executor: Arc<CountingExecutor>,
}

async fn cluster() -> Cluster {
    let store = RecordStore::open_in_memory().unwrap();
    let bus = ChangeBus::new();
    let facts = FactStore::bootstrap(store.clone(), bus.clone(), CairnConfig::default())
        .await
        .unwrap();
    let dispatcher = Dispatcher::new(ExecutorRegistry::new());
    let coordinator = Coordinator::new(
        store.clone(),
        bus.clone(),
        facts.clone(),
        dispatcher,
        Strategy::Spread,
    )
    .with_platform(Arc::new(StaticPlatform {
        process: true,
        microvm: true,
    }));
    let reactor = Reactor::new(coordinator.clone(), bus).with_debounce_window(Duration::from_millis(1));
    let executor = Arc::new(CountingExecutor {
        starts: AtomicUsize::new(0),
    });
    Cluster {
        store,
        coordinator,
        facts,
        reactor,
        executor,
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Register a fresh node, attach an executor, and sync the fact base.
async fn register_node(c: &Cluster, hostname: &str, cpu: i64, mem: i64) -> cairn_store::NodeRecord {
    let node = c
        .coordinator
        .create_node(NodeSpec::new(hostname, cpu, mem))
        .unwrap();
    let node = c
        .coordinator
        .heartbeat_node(
            &node.id,
            Heartbeat {
                cpu_used: 0,
                memory_used_mb: 0,
                status: NodeStatus::Available,
            },
        )
        .unwrap();
    c.coordinator
        .dispatcher()
        .registry()
        .attach_executor(&node.id, Arc::clone(&c.executor) as Arc<dyn Executor>)
        .await;
    c.facts.reconcile().await;
    node
}

/// Deploy and walk the workload to `running` the way an agent would.
async fn deploy_running(c: &Cluster, spec: WorkloadSpec) -> cairn_store::WorkloadRecord {
    let workload = c.coordinator.deploy_workload(spec).await.unwrap();
    assert_eq!(workload.status, WorkloadStatus::Starting);
    c.facts.reconcile().await;
    c.coordinator
        .update_workload(
            &workload.id,
            WorkloadUpdate {
                status: Some(WorkloadStatus::Running),
                started_at: Some(epoch_secs()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
}

// ── S1: happy placement ────────────────────────────────────────────

#[tokio::test]
async fn s1_happy_placement() {
    let c = cluster().await;
    let node = register_node(&c, "n1-host", 8, 16384).await;

    let workload = c
        .coordinator
        .deploy_workload(WorkloadSpec::process("/bin/sleep 60", 2, 2048))
        .await
        .unwrap();

    assert_eq!(workload.status, WorkloadStatus::Starting);
    assert_eq!(workload.node_id.as_deref(), Some(node.id.as_str()));
    assert_eq!(c.executor.starts.load(Ordering::SeqCst), 1);

    let events = c.coordinator.list_events(&workload.id).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "starting");
}

// ── S2: no candidates ──────────────────────────────────────────────

#[tokio::test]
async fn s2_no_candidates_leaves_pending() {
    let c = cluster().await;
    // Only node has 1 free CPU; workload requests 4.
    let node = c
        .coordinator
        .create_node(NodeSpec::new("n1-host", 8, 16384))
        .unwrap();
    c.coordinator
        .heartbeat_node(
            &node.id,
            Heartbeat {
                cpu_used: 7,
                memory_used_mb: 0,
                status: NodeStatus::Available,
            },
        )
        .unwrap();
    c.facts.reconcile().await;

    let workload = c
        .coordinator
        .deploy_workload(WorkloadSpec::process("/bin/work", 4, 2048))
        .await
        .unwrap();

    // The API returns the pending workload, not an error.
    assert_eq!(workload.status, WorkloadStatus::Pending);
    assert!(workload.node_id.is_none());
    assert!(
        !c.coordinator
            .list_events(&workload.id)
            .unwrap()
            .iter()
            .any(|e| e.event_type == "starting")
    );
}

// ── S3: constraint violation ───────────────────────────────────────

#[tokio::test]
async fn s3_constraint_violation_leaves_pending() {
    let c = cluster().await;
    register_node(&c, "n1-host", 8, 16384).await; // no gpu capability

    let mut spec = WorkloadSpec::process("/bin/train", 2, 2048);
    spec.constraints
        .insert("gpu".to_string(), "nvidia".to_string());
    let workload = c.coordinator.deploy_workload(spec).await.unwrap();

    assert_eq!(workload.status, WorkloadStatus::Pending);
    assert!(c.facts.placement_candidates(&workload.id).await.is_empty());
}

// ── S4: staleness → node unavailable → workload failure ────────────

#[tokio::test]
async fn s4_stale_node_fails_its_workloads() {
    let mut c = cluster().await;
    let node = register_node(&c, "n1-host", 8, 16384).await;
    let workload = deploy_running(&c, WorkloadSpec::process("/bin/serve", 2, 2048)).await;

    // The heartbeat ages past the threshold without renewal.
    let mut aged = c.store.get_node(&node.id).unwrap().unwrap();
    aged.last_heartbeat_at = Some(epoch_secs() - 60);
    c.store.put_node(&aged).unwrap();
    c.facts.reconcile().await;

    // Next time tick: node_stale (and, in the same breath, should_fail)
    // derive; snapshots are level-triggered so both actions land.
    let snapshot = c.facts.evaluate_now().await;
    assert_eq!(snapshot.stale_nodes, vec![node.id.clone()]);
    assert_eq!(snapshot.should_fail, vec![workload.id.clone()]);
    c.reactor.apply(&snapshot).await;

    assert_eq!(
        c.coordinator.get_node(&node.id).unwrap().status,
        NodeStatus::Unavailable
    );
    let failed = c.coordinator.get_workload(&workload.id).unwrap();
    assert_eq!(failed.status, WorkloadStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("Node unhealthy"));
    assert!(failed.stopped_at.is_some());

    // Converged: the next evaluation has nothing left to do.
    c.facts.reconcile().await;
    let snapshot = c.facts.evaluate_now().await;
    assert!(snapshot.should_fail.is_empty());
    // An unavailable node is no longer "stale" (the staleness rule
    // only watches available nodes).
    assert!(snapshot.stale_nodes.is_empty());
}

// ── S5: orphan detection ───────────────────────────────────────────

#[tokio::test]
async fn s5_deleted_node_orphans_workloads() {
    let mut c = cluster().await;
    let node = register_node(&c, "n1-host", 8, 16384).await;
    let workload = deploy_running(&c, WorkloadSpec::process("/bin/serve", 2, 2048)).await;
    c.facts.reconcile().await;

    // Delete the node while the workload is running on it. The change
    // handler retracts the node's facts; the placement fact persists
    // until the workload record itself changes.
    let deleted = c.coordinator.delete_node(&node.id).unwrap();
    c.facts
        .apply_change(&RecordChange {
            op: ChangeOp::Delete,
            record: ChangedRecord::Node(deleted),
        })
        .await;

    let snapshot = c.facts.evaluate_now().await;
    assert_eq!(snapshot.orphaned, vec![workload.id.clone()]);
    // Disjoint from the should-fail path: the node is gone, not unhealthy.
    assert!(snapshot.should_fail.is_empty());

    c.reactor.apply(&snapshot).await;
    let orphaned = c.coordinator.get_workload(&workload.id).unwrap();
    assert_eq!(orphaned.status, WorkloadStatus::Failed);
    assert!(orphaned.node_id.is_none());
    assert_eq!(orphaned.error.as_deref(), Some("Node no longer exists"));

    // Once the workload update lands in the fact base, the orphan
    // derivation disappears.
    c.facts.reconcile().await;
    let snapshot = c.facts.evaluate_now().await;
    assert!(snapshot.orphaned.is_empty());
}

// ── S6: overload logging ───────────────────────────────────────────

#[tokio::test]
async fn s6_overload_is_observability_only() {
    let mut c = cluster().await;
    let node = c
        .coordinator
        .create_node(NodeSpec::new("n2-host", 100, 16384))
        .unwrap();
    c.coordinator
        .heartbeat_node(
            &node.id,
            Heartbeat {
                cpu_used: 95,
                memory_used_mb: 0,
                status: NodeStatus::Available,
            },
        )
        .unwrap();
    c.facts.reconcile().await;

    let snapshot = c.facts.evaluate_now().await;
    assert_eq!(snapshot.overloaded, vec![node.id.clone()]);

    let before = c.coordinator.get_node(&node.id).unwrap();
    c.reactor.apply(&snapshot).await;
    let after = c.coordinator.get_node(&node.id).unwrap();
    assert_eq!(before, after);
}

// ── Convergence: the bus-driven path matches reconciliation ────────

#[tokio::test]
async fn change_events_and_reconciliation_agree() {
    let c = cluster().await;
    let node = register_node(&c, "n1-host", 8, 16384).await;

    // Apply a heartbeat through the change handler...
    let updated = c
        .coordinator
        .heartbeat_node(
            &node.id,
            Heartbeat {
                cpu_used: 5,
                memory_used_mb: 2048,
                status: NodeStatus::Available,
            },
        )
        .unwrap();
    c.facts
        .apply_change(&RecordChange {
            op: ChangeOp::Update,
            record: ChangedRecord::Node(updated),
        })
        .await;
    let via_events = c.facts.base_fact_count().await;

    // ...then reconcile; nothing should move.
    c.facts.reconcile().await;
    assert_eq!(c.facts.base_fact_count().await, via_events);
}

// ── Full pipeline with the real subscription loops ─────────────────

#[tokio::test]
async fn background_loops_converge_without_manual_syncing() {
    let c = cluster().await;
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // Run the change listener the way the daemon does.
    let facts = c.facts.clone();
    let listener = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move { facts.run_change_listener(shutdown_rx).await }
    });

    let node = c
        .coordinator
        .create_node(NodeSpec::new("n1-host", 8, 16384))
        .unwrap();
    c.coordinator
        .heartbeat_node(
            &node.id,
            Heartbeat {
                cpu_used: 0,
                memory_used_mb: 0,
                status: NodeStatus::Available,
            },
        )
        .unwrap();
    c.coordinator
        .dispatcher()
        .registry()
        .attach_executor(&node.id, Arc::clone(&c.executor) as Arc<dyn Executor>)
        .await;

    // Give the listener a moment to drain the create/update events.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let workload = c
        .coordinator
        .deploy_workload(WorkloadSpec::process("/bin/sleep 60", 2, 2048))
        .await
        .unwrap();
    assert_eq!(workload.status, WorkloadStatus::Starting);
    assert_eq!(workload.node_id.as_deref(), Some(node.id.as_str()));

    let _ = shutdown_tx.send(true);
    let _ = listener.await;
}
