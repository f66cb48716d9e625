//! The FactStore service.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{RwLock, broadcast, watch};
use tracing::{debug, info, warn};

use cairn_bus::{ChangeBus, ChangeOp, ChangedRecord, DerivedSnapshot, RecordChange};
use cairn_core::CairnConfig;
use cairn_datalog::{Database, Program, Rule, parse};
use cairn_facts::{
    EVENT_PREDICATES, Fact, NODE_PREDICATES, Pattern, Record, Term, Value, WORKLOAD_PREDICATES,
    diff, project, project_event, projected_predicates,
};
use cairn_placement::Candidate;
use cairn_store::{RecordStore, WorkloadStatus};

use crate::error::FactStoreResult;
use crate::rules;

/// Single-writer state behind the service lock.
struct Inner {
    db: Database,
    /// Parsed user rules currently loaded, compared on reload.
    user_rules: Vec<Rule>,
}

/// The rules-driver service. Cheap to clone; all clones share the
/// fact base.
#[derive(Clone)]
pub struct FactStore {
    inner: Arc<RwLock<Inner>>,
    shipped: Arc<Program>,
    store: RecordStore,
    bus: ChangeBus,
    config: CairnConfig,
}

impl FactStore {
    /// Parse the shipped rules, bulk-load the store, and run the first
    /// evaluation.
    ///
    /// A broken shipped rule file is fatal. A store outage is not: the
    /// service starts empty and reconciliation retries.
    pub async fn bootstrap(
        store: RecordStore,
        bus: ChangeBus,
        config: CairnConfig,
    ) -> FactStoreResult<Self> {
        let shipped = rules::shipped_program(&config)?;

        let mut db = Database::new();
        db.assert_all(shipped.facts.iter().cloned());
        set_now(&mut db, epoch_secs() as i64);

        let service = Self {
            inner: Arc::new(RwLock::new(Inner {
                db,
                user_rules: Vec::new(),
            })),
            shipped: Arc::new(shipped),
            store,
            bus,
            config,
        };

        {
            let mut inner = service.inner.write().await;
            service.load_user_rules(&mut inner);

            match service.load_all_records() {
                Ok(records) => {
                    let mut count = 0usize;
                    for record in &records {
                        for fact in project(record) {
                            inner.db.assert_fact(fact);
                            count += 1;
                        }
                    }
                    info!(records = records.len(), facts = count, "bulk load complete");
                }
                Err(e) => {
                    warn!(error = %e, "bulk load failed; starting empty, reconciliation will retry");
                }
            }

            inner.db.evaluate();
        }

        Ok(service)
    }

    // ── Timers and handlers ────────────────────────────────────────

    /// Refresh the wall-clock fact, re-evaluate, publish a snapshot.
    pub async fn tick(&self) {
        let snapshot = {
            let mut inner = self.inner.write().await;
            set_now(&mut inner.db, epoch_secs() as i64);
            inner.db.evaluate();
            build_snapshot(&inner.db)
        };
        self.bus.publish_snapshot(snapshot);
    }

    /// Force an evaluation against a fresh clock and return the
    /// snapshot. Used by the deploy path before querying candidates.
    pub async fn evaluate_now(&self) -> DerivedSnapshot {
        let snapshot = {
            let mut inner = self.inner.write().await;
            set_now(&mut inner.db, epoch_secs() as i64);
            inner.db.evaluate();
            build_snapshot(&inner.db)
        };
        self.bus.publish_snapshot(snapshot.clone());
        snapshot
    }

    /// Apply one record change: diff the entity's previous fact slice
    /// against its fresh projection, retract then assert, re-evaluate.
    pub async fn apply_change(&self, change: &RecordChange) {
        let snapshot = {
            let mut inner = self.inner.write().await;
            match &change.record {
                ChangedRecord::Rule(rule) => {
                    debug!(rule = %rule.name, "rule change; reloading user rules");
                    self.load_user_rules(&mut inner);
                }
                ChangedRecord::Node(node) => {
                    let current = entity_slice(&inner.db, NODE_PREDICATES, &node.id);
                    let desired = match change.op {
                        ChangeOp::Delete => Vec::new(),
                        _ => project(&Record::Node(node.clone())),
                    };
                    apply_diff(&mut inner.db, &current, &desired);
                }
                ChangedRecord::Workload(workload) => {
                    let mut current =
                        entity_slice(&inner.db, WORKLOAD_PREDICATES, &workload.id);
                    let desired = match change.op {
                        ChangeOp::Delete => {
                            // Cascade: the workload's event facts go too.
                            current.extend(entity_slice(
                                &inner.db,
                                EVENT_PREDICATES,
                                &workload.id,
                            ));
                            Vec::new()
                        }
                        _ => project(&Record::Workload(workload.clone())),
                    };
                    apply_diff(&mut inner.db, &current, &desired);
                }
                ChangedRecord::Event(event) => {
                    // Events are append-only; a create is a plain assert.
                    if change.op == ChangeOp::Create {
                        inner.db.assert_all(project_event(event));
                    }
                }
            }
            inner.db.evaluate();
            build_snapshot(&inner.db)
        };
        self.bus.publish_snapshot(snapshot);
    }

    /// Drive the base facts to equal the full projection of the store
    /// and hot-reload user rules whose parsed form changed.
    pub async fn reconcile(&self) {
        let records = match self.load_all_records() {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "reconciliation skipped: store unavailable");
                return;
            }
        };

        let snapshot = {
            let mut inner = self.inner.write().await;

            let desired: Vec<Fact> = records.iter().flat_map(project).collect();
            let mut current = Vec::new();
            for (pred, arity) in projected_predicates() {
                current.extend(inner.db.query_base(&Pattern::wildcard(pred, arity)));
            }

            let (to_assert, to_retract) = diff(&current, &desired);
            if !to_assert.is_empty() || !to_retract.is_empty() {
                info!(
                    asserted = to_assert.len(),
                    retracted = to_retract.len(),
                    "reconciliation corrected fact drift"
                );
            }
            for fact in &to_retract {
                inner.db.retract(fact);
            }
            inner.db.assert_all(to_assert);

            self.load_user_rules(&mut inner);

            inner.db.evaluate();
            build_snapshot(&inner.db)
        };
        self.bus.publish_snapshot(snapshot);
    }

    // ── Long-running loops ─────────────────────────────────────────

    /// Run the time-tick loop.
    pub async fn run_time_tick(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.config.time_tick_interval();
        info!(interval_s = interval.as_secs(), "fact store time tick started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => self.tick().await,
                _ = shutdown.changed() => {
                    info!("time tick shutting down");
                    break;
                }
            }
        }
    }

    /// Consume the record-changes topic.
    pub async fn run_change_listener(&self, mut shutdown: watch::Receiver<bool>) {
        let mut rx = self.bus.subscribe_records();
        info!("fact store change listener started");
        loop {
            tokio::select! {
                result = rx.recv() => match result {
                    Ok(change) => self.apply_change(&change).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "change listener lagged; reconciliation will heal");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.changed() => {
                    info!("change listener shutting down");
                    break;
                }
            }
        }
    }

    /// Run the reconciliation loop.
    pub async fn run_reconciler(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.config.reconcile_interval();
        info!(interval_s = interval.as_secs(), "fact store reconciler started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => self.reconcile().await,
                _ = shutdown.changed() => {
                    info!("reconciler shutting down");
                    break;
                }
            }
        }
    }

    // ── Queries ────────────────────────────────────────────────────

    /// Pattern-match against the full fact base (base + derived).
    pub async fn query(&self, pattern: &Pattern) -> Vec<Fact> {
        let inner = self.inner.read().await;
        inner.db.query(pattern)
    }

    /// Eligible nodes for a pending workload, with free resources.
    pub async fn placement_candidates(&self, workload_id: &str) -> Vec<Candidate> {
        let pattern = Pattern::new(
            "placement_candidate",
            vec![
                Term::Bound(Value::str(workload_id)),
                Term::Any,
                Term::Any,
                Term::Any,
            ],
        );
        let inner = self.inner.read().await;
        inner
            .db
            .query(&pattern)
            .iter()
            .filter_map(|fact| {
                Some(Candidate {
                    node_id: fact.args[1].as_text()?.to_string(),
                    cpu_free: fact.args[2].as_int()?,
                    mem_free_mb: fact.args[3].as_int()?,
                })
            })
            .collect()
    }

    /// Running workloads whose node is registered but unhealthy.
    pub async fn workloads_to_fail(&self) -> Vec<String> {
        self.unary_ids("should_fail").await
    }

    /// Failed workloads the rules consider restartable.
    pub async fn workloads_to_restart(&self) -> Vec<String> {
        self.unary_ids("can_restart").await
    }

    /// Available nodes whose heartbeat went stale.
    pub async fn stale_nodes(&self) -> Vec<String> {
        self.unary_ids("node_stale").await
    }

    /// Running workloads placed on a node that no longer exists.
    pub async fn orphaned_workloads(&self) -> Vec<String> {
        self.unary_ids("workload_orphaned").await
    }

    /// Nodes above the usage threshold on either resource.
    pub async fn overloaded_nodes(&self) -> Vec<String> {
        self.unary_ids("node_overloaded").await
    }

    /// Is the transition allowed from the workload's current status?
    pub async fn can_transition(&self, workload_id: &str, next: WorkloadStatus) -> bool {
        let pattern = Pattern::new(
            "can_transition",
            vec![
                Term::Bound(Value::str(workload_id)),
                Term::Bound(Value::sym(next.as_str())),
            ],
        );
        let inner = self.inner.read().await;
        !inner.db.query(&pattern).is_empty()
    }

    /// Count of asserted base facts (diagnostics).
    pub async fn base_fact_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.db.base_len()
    }

    async fn unary_ids(&self, pred: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .db
            .query(&Pattern::wildcard(pred, 1))
            .iter()
            .filter_map(|fact| Some(fact.args[0].as_text()?.to_string()))
            .collect()
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn load_all_records(&self) -> cairn_store::StoreResult<Vec<Record>> {
        let mut records = Vec::new();
        for node in self.store.list_nodes()? {
            records.push(Record::Node(node));
        }
        for workload in self.store.list_workloads()? {
            records.push(Record::Workload(workload));
        }
        for event in self.store.list_events()? {
            records.push(Record::Event(event));
        }
        Ok(records)
    }

    /// Read enabled user rules, parse them, and load the combined rule
    /// set if the parsed form differs from what is live. Unparseable
    /// user rules are skipped with a warning; the shipped set always
    /// loads.
    fn load_user_rules(&self, inner: &mut Inner) {
        let rule_records = match self.store.list_enabled_rules() {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "could not read user rules; keeping current set");
                return;
            }
        };

        let mut parsed = Vec::new();
        for record in &rule_records {
            match parse(&record.rule_text) {
                Ok(program) => {
                    if !program.facts.is_empty() {
                        warn!(
                            rule = %record.name,
                            facts = program.facts.len(),
                            "ground facts in user rules are ignored"
                        );
                    }
                    parsed.extend(program.rules);
                }
                Err(e) => {
                    warn!(rule = %record.name, error = %e, "skipping unparseable user rule");
                }
            }
        }

        if parsed == inner.user_rules && !inner.db.rules().is_empty() {
            return;
        }

        let mut combined = self.shipped.rules.clone();
        combined.extend(parsed.iter().cloned());
        match inner.db.load_rules(combined) {
            Ok(()) => {
                info!(user_rules = parsed.len(), "rule set loaded");
                inner.user_rules = parsed;
            }
            Err(e) => {
                warn!(error = %e, "combined rule set rejected; loading shipped rules only");
                if let Err(e) = inner.db.load_rules(self.shipped.rules.clone()) {
                    // The shipped set was validated at bootstrap.
                    warn!(error = %e, "shipped rule set failed to load");
                }
                inner.user_rules = Vec::new();
            }
        }
    }
}

/// Replace the singleton wall-clock fact.
fn set_now(db: &mut Database, ts: i64) {
    for old in db.query_base(&Pattern::wildcard("now", 1)) {
        db.retract(&old);
    }
    db.assert_fact(Fact::new("now", vec![Value::int(ts)]));
}

/// All base facts of the given predicates keyed by the entity id.
fn entity_slice(db: &Database, preds: &[(&str, usize)], id: &str) -> Vec<Fact> {
    let mut out = Vec::new();
    for &(pred, arity) in preds {
        out.extend(db.query_base(&Pattern::keyed(pred, Value::str(id), arity)));
    }
    out
}

/// Retract-then-assert the difference between two fact slices.
fn apply_diff(db: &mut Database, current: &[Fact], desired: &[Fact]) {
    let (to_assert, to_retract) = diff(current, desired);
    for fact in &to_retract {
        db.retract(fact);
    }
    db.assert_all(to_assert);
}

/// Collect the reactor-relevant derivations.
fn build_snapshot(db: &Database) -> DerivedSnapshot {
    let unary = |pred: &str| -> Vec<String> {
        db.query(&Pattern::wildcard(pred, 1))
            .iter()
            .filter_map(|fact| Some(fact.args[0].as_text()?.to_string()))
            .collect()
    };
    DerivedSnapshot {
        stale_nodes: unary("node_stale"),
        should_fail: unary("should_fail"),
        orphaned: unary("workload_orphaned"),
        can_restart: unary("can_restart"),
        overloaded: unary("node_overloaded"),
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
