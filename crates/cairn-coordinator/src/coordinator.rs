//! The coordinator façade.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};
use uuid::Uuid;

use cairn_bus::{ChangeBus, ChangeOp, ChangedRecord, RecordChange};
use cairn_core::Strategy;
use cairn_dispatch::Dispatcher;
use cairn_factstore::FactStore;
use cairn_placement::choose;
use cairn_store::{
    NodeRecord, NodeStatus, RecordStore, RuleRecord, WorkloadEventRecord, WorkloadRecord,
    WorkloadStatus,
};

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::platform::{HostPlatform, PlatformCapabilities};
use crate::types::*;

/// The single write path over the record store.
#[derive(Clone)]
pub struct Coordinator {
    store: RecordStore,
    bus: ChangeBus,
    facts: FactStore,
    dispatcher: Dispatcher,
    strategy: Strategy,
    platform: Arc<dyn PlatformCapabilities>,
}

impl Coordinator {
    pub fn new(
        store: RecordStore,
        bus: ChangeBus,
        facts: FactStore,
        dispatcher: Dispatcher,
        strategy: Strategy,
    ) -> Self {
        Self {
            store,
            bus,
            facts,
            dispatcher,
            strategy,
            platform: Arc::new(HostPlatform),
        }
    }

    /// Swap the platform capability check (tests, exotic hosts).
    pub fn with_platform(mut self, platform: Arc<dyn PlatformCapabilities>) -> Self {
        self.platform = platform;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn facts(&self) -> &FactStore {
        &self.facts
    }

    // ── Nodes ──────────────────────────────────────────────────────

    pub fn list_nodes(&self) -> CoordinatorResult<Vec<NodeRecord>> {
        Ok(self.store.list_nodes()?)
    }

    pub fn get_node(&self, node_id: &str) -> CoordinatorResult<NodeRecord> {
        self.store
            .get_node(node_id)?
            .ok_or_else(|| CoordinatorError::NotFound(format!("node {node_id}")))
    }

    pub fn create_node(&self, spec: NodeSpec) -> CoordinatorResult<NodeRecord> {
        let now = epoch_secs();
        let node = NodeRecord {
            id: Uuid::new_v4().to_string(),
            hostname: spec.hostname,
            status: spec.status,
            cpu_total: spec.cpu_total,
            memory_total_mb: spec.memory_total_mb,
            cpu_used: spec.cpu_used,
            memory_used_mb: spec.memory_used_mb,
            hypervisor: spec.hypervisor,
            capabilities: spec.capabilities,
            last_heartbeat_at: spec.last_heartbeat_at,
            created_at: now,
            updated_at: now,
        };
        self.store.put_node(&node)?;
        info!(node_id = %node.id, hostname = %node.hostname, "node created");
        self.bus
            .publish_record(ChangeOp::Create, ChangedRecord::Node(node.clone()));
        Ok(node)
    }

    pub fn update_node(&self, node_id: &str, update: NodeUpdate) -> CoordinatorResult<NodeRecord> {
        let mut node = self.get_node(node_id)?;
        if let Some(status) = update.status {
            node.status = status;
        }
        if let Some(cpu_total) = update.cpu_total {
            node.cpu_total = cpu_total;
        }
        if let Some(memory_total_mb) = update.memory_total_mb {
            node.memory_total_mb = memory_total_mb;
        }
        if let Some(cpu_used) = update.cpu_used {
            node.cpu_used = cpu_used;
        }
        if let Some(memory_used_mb) = update.memory_used_mb {
            node.memory_used_mb = memory_used_mb;
        }
        if let Some(hypervisor) = update.hypervisor {
            node.hypervisor = hypervisor;
        }
        if let Some(capabilities) = update.capabilities {
            node.capabilities = capabilities;
        }
        node.updated_at = epoch_secs();
        self.store.put_node(&node)?;
        self.bus
            .publish_record(ChangeOp::Update, ChangedRecord::Node(node.clone()));
        Ok(node)
    }

    /// Delete a node by explicit admin action.
    ///
    /// The store nullifies placements pointing at it, but no workload
    /// change is emitted for that: the lingering placement facts are
    /// what lets the orphan rule find workloads that were running
    /// there, and the reactor's orphan handler emits the workload
    /// updates when it fails them.
    pub fn delete_node(&self, node_id: &str) -> CoordinatorResult<NodeRecord> {
        let (node, unplaced) = self
            .store
            .delete_node(node_id)?
            .ok_or_else(|| CoordinatorError::NotFound(format!("node {node_id}")))?;
        info!(%node_id, hostname = %node.hostname, unplaced = unplaced.len(), "node deleted");
        self.bus
            .publish_record(ChangeOp::Delete, ChangedRecord::Node(node.clone()));
        Ok(node)
    }

    /// Apply a heartbeat: usage, status, and the timestamp.
    pub fn heartbeat_node(
        &self,
        node_id: &str,
        heartbeat: Heartbeat,
    ) -> CoordinatorResult<NodeRecord> {
        let mut node = self.get_node(node_id)?;
        node.cpu_used = heartbeat.cpu_used;
        node.memory_used_mb = heartbeat.memory_used_mb;
        node.status = heartbeat.status;
        node.last_heartbeat_at = Some(epoch_secs());
        node.updated_at = epoch_secs();
        self.store.put_node(&node)?;
        debug!(%node_id, cpu_used = node.cpu_used, "heartbeat");
        self.bus
            .publish_record(ChangeOp::Update, ChangedRecord::Node(node.clone()));
        Ok(node)
    }

    /// First contact from an agent. An unknown hostname auto-registers
    /// a node; a known one updates the existing record —
    /// re-registrations of the same hostname are the same logical node.
    pub fn announce_node(&self, announce: Announce) -> CoordinatorResult<NodeRecord> {
        let now = epoch_secs();
        match self.store.find_node_by_hostname(&announce.hostname)? {
            Some(mut node) => {
                node.cpu_total = announce.cpu_total;
                node.memory_total_mb = announce.memory_total_mb;
                node.hypervisor = announce.hypervisor;
                node.capabilities = announce.capabilities;
                node.status = NodeStatus::Available;
                node.last_heartbeat_at = Some(now);
                node.updated_at = now;
                self.store.put_node(&node)?;
                info!(node_id = %node.id, hostname = %node.hostname, "node re-registered");
                self.bus
                    .publish_record(ChangeOp::Update, ChangedRecord::Node(node.clone()));
                Ok(node)
            }
            None => {
                let node = NodeRecord {
                    id: Uuid::new_v4().to_string(),
                    hostname: announce.hostname,
                    status: NodeStatus::Available,
                    cpu_total: announce.cpu_total,
                    memory_total_mb: announce.memory_total_mb,
                    cpu_used: 0,
                    memory_used_mb: 0,
                    hypervisor: announce.hypervisor,
                    capabilities: announce.capabilities,
                    last_heartbeat_at: Some(now),
                    created_at: now,
                    updated_at: now,
                };
                self.store.put_node(&node)?;
                info!(node_id = %node.id, hostname = %node.hostname, "node auto-registered");
                self.bus
                    .publish_record(ChangeOp::Create, ChangedRecord::Node(node.clone()));
                Ok(node)
            }
        }
    }

    // ── Workloads ──────────────────────────────────────────────────

    pub fn list_workloads(&self) -> CoordinatorResult<Vec<WorkloadRecord>> {
        Ok(self.store.list_workloads()?)
    }

    pub fn get_workload(&self, workload_id: &str) -> CoordinatorResult<WorkloadRecord> {
        self.store
            .get_workload(workload_id)?
            .ok_or_else(|| CoordinatorError::NotFound(format!("workload {workload_id}")))
    }

    /// Create a workload in `pending` without placing it.
    pub fn create_workload(&self, spec: WorkloadSpec) -> CoordinatorResult<WorkloadRecord> {
        let now = epoch_secs();
        let workload = WorkloadRecord {
            id: Uuid::new_v4().to_string(),
            kind: spec.kind,
            status: WorkloadStatus::Pending,
            command: spec.command,
            args: spec.args,
            env: spec.env,
            cpu_required: spec.cpu_required,
            memory_required_mb: spec.memory_required_mb,
            constraints: spec.constraints,
            node_id: None,
            error: None,
            started_at: None,
            stopped_at: None,
            ip: None,
            created_at: now,
            updated_at: now,
        };
        self.store.put_workload(&workload)?;
        info!(workload_id = %workload.id, kind = workload.kind.as_str(), "workload created");
        self.bus
            .publish_record(ChangeOp::Create, ChangedRecord::Workload(workload.clone()));
        Ok(workload)
    }

    /// Apply an agent-reported update. Status changes are gated by the
    /// lifecycle rules; everything else is observational.
    pub async fn update_workload(
        &self,
        workload_id: &str,
        update: WorkloadUpdate,
    ) -> CoordinatorResult<WorkloadRecord> {
        let mut workload = self.get_workload(workload_id)?;

        if let Some(next) = update.status
            && next != workload.status
        {
            if !self.facts.can_transition(workload_id, next).await {
                return Err(CoordinatorError::InvalidState {
                    workload: workload_id.to_string(),
                    from: workload.status,
                    to: next,
                });
            }
            workload.status = next;
        }
        if let Some(started_at) = update.started_at {
            workload.started_at = Some(started_at);
        }
        if let Some(stopped_at) = update.stopped_at {
            workload.stopped_at = Some(stopped_at);
        }
        if let Some(error) = update.error {
            workload.error = Some(error);
        }
        if let Some(ip) = update.ip {
            workload.ip = Some(ip);
        }
        workload.updated_at = epoch_secs();
        self.store.put_workload(&workload)?;
        self.bus
            .publish_record(ChangeOp::Update, ChangedRecord::Workload(workload.clone()));
        Ok(workload)
    }

    pub fn delete_workload(&self, workload_id: &str) -> CoordinatorResult<WorkloadRecord> {
        let (workload, events) = self
            .store
            .delete_workload(workload_id)?
            .ok_or_else(|| CoordinatorError::NotFound(format!("workload {workload_id}")))?;
        info!(%workload_id, events_removed = events, "workload deleted");
        self.bus
            .publish_record(ChangeOp::Delete, ChangedRecord::Workload(workload.clone()));
        Ok(workload)
    }

    /// The deploy pipeline.
    ///
    /// Creates the workload `pending`, forces an evaluation, and — when
    /// a candidate exists — flips it to `starting` on the chosen node
    /// and dispatches the launch. With no candidates the workload stays
    /// `pending` for the user (or a later evaluation) to retry.
    pub async fn deploy_workload(&self, mut spec: WorkloadSpec) -> CoordinatorResult<WorkloadRecord> {
        if !self.platform.supports(spec.kind) {
            return Err(CoordinatorError::UnsupportedKind(spec.kind));
        }
        if spec.kind == cairn_store::WorkloadKind::Microvm {
            spec.constraints
                .insert("microvm".to_string(), "true".to_string());
        }

        let workload = self.create_workload(spec)?;

        // The change listener will see the create too, but the
        // placement query must not race it: sync the fact base here.
        self.facts
            .apply_change(&RecordChange {
                op: ChangeOp::Create,
                record: ChangedRecord::Workload(workload.clone()),
            })
            .await;
        self.facts.evaluate_now().await;

        let candidates = self.facts.placement_candidates(&workload.id).await;
        let Some(chosen) = choose(&candidates, self.strategy) else {
            info!(workload_id = %workload.id, "no placement candidates; workload stays pending");
            return Ok(workload);
        };
        let node_id = chosen.node_id.clone();

        let mut placed = workload;
        placed.status = WorkloadStatus::Starting;
        placed.node_id = Some(node_id.clone());
        placed.updated_at = epoch_secs();
        self.store.put_workload(&placed)?;
        self.bus
            .publish_record(ChangeOp::Update, ChangedRecord::Workload(placed.clone()));
        self.append_event(&placed.id, "starting", HashMap::from([(
            "node_id".to_string(),
            node_id.clone(),
        )]))?;
        info!(workload_id = %placed.id, node = %node_id, "workload placed");

        if let Err(e) = self.dispatcher.start(&placed).await {
            // The workload stays starting; a stale-node derivation will
            // fail it if the agent never comes back.
            warn!(workload_id = %placed.id, node = %node_id, error = %e, "start dispatch failed");
        }

        Ok(placed)
    }

    /// Stop a running or starting workload. Anything else is an
    /// invalid state; terminal workloads stay terminal.
    pub async fn stop_workload(&self, workload_id: &str) -> CoordinatorResult<WorkloadRecord> {
        let mut workload = self.get_workload(workload_id)?;
        if !matches!(
            workload.status,
            WorkloadStatus::Running | WorkloadStatus::Starting
        ) {
            return Err(CoordinatorError::InvalidState {
                workload: workload_id.to_string(),
                from: workload.status,
                to: WorkloadStatus::Stopping,
            });
        }

        workload.status = WorkloadStatus::Stopping;
        workload.updated_at = epoch_secs();
        self.store.put_workload(&workload)?;
        self.bus
            .publish_record(ChangeOp::Update, ChangedRecord::Workload(workload.clone()));
        self.append_event(workload_id, "stopping", HashMap::new())?;

        if let Err(e) = self.dispatcher.stop(&workload).await {
            warn!(%workload_id, error = %e, "stop dispatch failed");
        }
        info!(%workload_id, "workload stopping");
        Ok(workload)
    }

    // ── Reactor-facing corrective writes ───────────────────────────

    /// Mark a node unavailable (stale heartbeat). Returns false if it
    /// already was — the reactor calls this idempotently.
    pub fn mark_node_unavailable(&self, node_id: &str) -> CoordinatorResult<bool> {
        let mut node = self.get_node(node_id)?;
        if node.status == NodeStatus::Unavailable {
            return Ok(false);
        }
        node.status = NodeStatus::Unavailable;
        node.updated_at = epoch_secs();
        self.store.put_node(&node)?;
        warn!(%node_id, hostname = %node.hostname, "node marked unavailable");
        self.bus
            .publish_record(ChangeOp::Update, ChangedRecord::Node(node));
        Ok(true)
    }

    /// Fail a workload whose node went unhealthy: best-effort stop to
    /// the owning agent, then the terminal record write.
    pub async fn fail_workload(
        &self,
        workload_id: &str,
        error: &str,
    ) -> CoordinatorResult<WorkloadRecord> {
        let mut workload = self.get_workload(workload_id)?;
        if workload.status == WorkloadStatus::Failed {
            return Ok(workload);
        }

        if let Err(e) = self.dispatcher.stop(&workload).await {
            debug!(%workload_id, error = %e, "best-effort stop failed");
        }

        workload.status = WorkloadStatus::Failed;
        workload.error = Some(error.to_string());
        workload.stopped_at = Some(epoch_secs());
        workload.updated_at = epoch_secs();
        self.store.put_workload(&workload)?;
        warn!(%workload_id, error, "workload failed");
        self.bus
            .publish_record(ChangeOp::Update, ChangedRecord::Workload(workload.clone()));
        self.append_event(
            workload_id,
            "failed",
            HashMap::from([("error".to_string(), error.to_string())]),
        )?;
        Ok(workload)
    }

    /// Fail a workload whose node no longer exists and clear the
    /// dangling placement.
    pub async fn orphan_workload(&self, workload_id: &str) -> CoordinatorResult<WorkloadRecord> {
        let mut workload = self.get_workload(workload_id)?;
        if workload.status == WorkloadStatus::Failed && workload.node_id.is_none() {
            return Ok(workload);
        }

        workload.status = WorkloadStatus::Failed;
        workload.node_id = None;
        workload.error = Some("Node no longer exists".to_string());
        workload.stopped_at = Some(epoch_secs());
        workload.updated_at = epoch_secs();
        self.store.put_workload(&workload)?;
        warn!(%workload_id, "workload orphaned");
        self.bus
            .publish_record(ChangeOp::Update, ChangedRecord::Workload(workload.clone()));
        self.append_event(
            workload_id,
            "failed",
            HashMap::from([("error".to_string(), "Node no longer exists".to_string())]),
        )?;
        Ok(workload)
    }

    /// Re-place a restartable workload and dispatch a fresh start.
    pub async fn restart_workload(&self, workload_id: &str) -> CoordinatorResult<WorkloadRecord> {
        let mut workload = self.get_workload(workload_id)?;

        let candidates = self.facts.placement_candidates(workload_id).await;
        let Some(chosen) = choose(&candidates, self.strategy) else {
            return Err(CoordinatorError::NoCandidates(workload_id.to_string()));
        };
        let node_id = chosen.node_id.clone();

        workload.status = WorkloadStatus::Starting;
        workload.node_id = Some(node_id.clone());
        workload.error = None;
        workload.stopped_at = None;
        workload.updated_at = epoch_secs();
        self.store.put_workload(&workload)?;
        info!(%workload_id, node = %node_id, "workload restarting");
        self.bus
            .publish_record(ChangeOp::Update, ChangedRecord::Workload(workload.clone()));
        self.append_event(
            workload_id,
            "restarting",
            HashMap::from([("node_id".to_string(), node_id.clone())]),
        )?;

        if let Err(e) = self.dispatcher.start(&workload).await {
            warn!(%workload_id, node = %node_id, error = %e, "restart dispatch failed");
        }
        Ok(workload)
    }

    // ── Events ─────────────────────────────────────────────────────

    /// Append an audit event and publish its change.
    pub fn append_event(
        &self,
        workload_id: &str,
        event_type: &str,
        metadata: HashMap<String, String>,
    ) -> CoordinatorResult<WorkloadEventRecord> {
        let event = WorkloadEventRecord {
            id: Uuid::new_v4().to_string(),
            workload_id: workload_id.to_string(),
            event_type: event_type.to_string(),
            metadata,
            inserted_at: epoch_secs(),
        };
        self.store.append_event(&event)?;
        self.bus
            .publish_record(ChangeOp::Create, ChangedRecord::Event(event.clone()));
        Ok(event)
    }

    pub fn list_events(&self, workload_id: &str) -> CoordinatorResult<Vec<WorkloadEventRecord>> {
        Ok(self.store.list_events_for_workload(workload_id)?)
    }

    // ── Cluster status ─────────────────────────────────────────────

    /// Aggregate counts and sums, straight from record queries.
    pub fn cluster_status(&self) -> CoordinatorResult<ClusterStatus> {
        let nodes = self.store.list_nodes()?;
        let workloads = self.store.list_workloads()?;

        let mut status = ClusterStatus {
            nodes_total: nodes.len(),
            workloads_total: workloads.len(),
            ..Default::default()
        };
        for node in &nodes {
            match node.status {
                NodeStatus::Available => status.nodes_available += 1,
                NodeStatus::Unavailable => status.nodes_unavailable += 1,
                NodeStatus::Draining => status.nodes_draining += 1,
            }
            status.cpu_total += node.cpu_total;
            status.cpu_used += node.cpu_used;
            status.memory_total_mb += node.memory_total_mb;
            status.memory_used_mb += node.memory_used_mb;
        }
        for workload in &workloads {
            match workload.status {
                WorkloadStatus::Pending => status.workloads_pending += 1,
                WorkloadStatus::Starting => status.workloads_starting += 1,
                WorkloadStatus::Running => status.workloads_running += 1,
                WorkloadStatus::Stopping => status.workloads_stopping += 1,
                WorkloadStatus::Stopped => status.workloads_stopped += 1,
                WorkloadStatus::Failed => status.workloads_failed += 1,
            }
        }
        Ok(status)
    }

    // ── Scheduling rules ───────────────────────────────────────────

    pub fn list_rules(&self) -> CoordinatorResult<Vec<RuleRecord>> {
        Ok(self.store.list_rules()?)
    }

    pub fn get_rule(&self, rule_id: &str) -> CoordinatorResult<RuleRecord> {
        self.store
            .get_rule(rule_id)?
            .ok_or_else(|| CoordinatorError::NotFound(format!("rule {rule_id}")))
    }

    /// Create a user rule. The text must parse and pass the safety
    /// check before anything is stored.
    pub fn create_rule(&self, spec: RuleSpec) -> CoordinatorResult<RuleRecord> {
        cairn_datalog::parse(&spec.rule_text)?;

        let now = epoch_secs();
        let rule = RuleRecord {
            id: Uuid::new_v4().to_string(),
            name: spec.name,
            description: spec.description,
            rule_text: spec.rule_text,
            enabled: spec.enabled,
            priority: spec.priority,
            created_at: now,
            updated_at: now,
        };
        self.store.put_rule(&rule)?;
        info!(rule = %rule.name, priority = rule.priority, "scheduling rule created");
        self.bus
            .publish_record(ChangeOp::Create, ChangedRecord::Rule(rule.clone()));
        Ok(rule)
    }

    pub fn update_rule(&self, rule_id: &str, update: RuleUpdate) -> CoordinatorResult<RuleRecord> {
        let mut rule = self.get_rule(rule_id)?;
        if let Some(rule_text) = update.rule_text {
            cairn_datalog::parse(&rule_text)?;
            rule.rule_text = rule_text;
        }
        if let Some(description) = update.description {
            rule.description = description;
        }
        if let Some(enabled) = update.enabled {
            rule.enabled = enabled;
        }
        if let Some(priority) = update.priority {
            rule.priority = priority;
        }
        rule.updated_at = epoch_secs();
        self.store.put_rule(&rule)?;
        self.bus
            .publish_record(ChangeOp::Update, ChangedRecord::Rule(rule.clone()));
        Ok(rule)
    }

    pub fn delete_rule(&self, rule_id: &str) -> CoordinatorResult<RuleRecord> {
        let rule = self
            .store
            .delete_rule(rule_id)?
            .ok_or_else(|| CoordinatorError::NotFound(format!("rule {rule_id}")))?;
        self.bus
            .publish_record(ChangeOp::Delete, ChangedRecord::Rule(rule.clone()));
        Ok(rule)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
