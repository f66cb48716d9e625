//! RecordStore — redb-backed persistence for Cairn records.
//!
//! Provides typed CRUD over nodes, workloads, workload events, and
//! scheduling rules, plus the relational behaviors the coordinator
//! depends on (unique hostnames, placement nullify-on-delete, event
//! cascade-delete). Supports on-disk and in-memory backends (the
//! latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Thread-safe record store backed by redb.
#[derive(Clone)]
pub struct RecordStore {
    db: Arc<Database>,
}

impl RecordStore {
    /// Open (or create) a persistent record store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "record store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory record store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory record store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
        txn.open_table(WORKLOAD_EVENTS).map_err(map_err!(Table))?;
        txn.open_table(SCHEDULING_RULES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Insert or update a node record.
    ///
    /// Rejects usage above capacity and hostnames already registered
    /// to a different node id (the unique-hostname index).
    pub fn put_node(&self, node: &NodeRecord) -> StoreResult<()> {
        validate_node(node)?;

        if let Some(existing) = self.find_node_by_hostname(&node.hostname)?
            && existing.id != node.id
        {
            return Err(StoreError::HostnameTaken(node.hostname.clone()));
        }

        let value = serde_json::to_vec(node).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            table
                .insert(node.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(node_id = %node.id, hostname = %node.hostname, "node stored");
        Ok(())
    }

    /// Get a node by id.
    pub fn get_node(&self, node_id: &str) -> StoreResult<Option<NodeRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        match table.get(node_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let node: NodeRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    /// List all nodes.
    pub fn list_nodes(&self) -> StoreResult<Vec<NodeRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let node: NodeRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(node);
        }
        Ok(results)
    }

    /// Find a node by its hostname.
    pub fn find_node_by_hostname(&self, hostname: &str) -> StoreResult<Option<NodeRecord>> {
        Ok(self
            .list_nodes()?
            .into_iter()
            .find(|n| n.hostname == hostname))
    }

    /// Delete a node by id.
    ///
    /// Placement references are nullified (the workload survives with
    /// `node_id = None`). Returns the deleted node and the workloads
    /// whose placement was cleared, so the caller can emit change
    /// events for both.
    pub fn delete_node(
        &self,
        node_id: &str,
    ) -> StoreResult<Option<(NodeRecord, Vec<WorkloadRecord>)>> {
        let Some(node) = self.get_node(node_id)? else {
            return Ok(None);
        };

        let mut unplaced = Vec::new();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut nodes = txn.open_table(NODES).map_err(map_err!(Table))?;
            nodes.remove(node_id).map_err(map_err!(Write))?;

            let mut workloads = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
            let placed: Vec<WorkloadRecord> = {
                let mut found = Vec::new();
                for entry in workloads.iter().map_err(map_err!(Read))? {
                    let (_, value) = entry.map_err(map_err!(Read))?;
                    let workload: WorkloadRecord = serde_json::from_slice(value.value())
                        .map_err(map_err!(Deserialize))?;
                    if workload.node_id.as_deref() == Some(node_id) {
                        found.push(workload);
                    }
                }
                found
            };
            for mut workload in placed {
                workload.node_id = None;
                let value = serde_json::to_vec(&workload).map_err(map_err!(Serialize))?;
                workloads
                    .insert(workload.id.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
                unplaced.push(workload);
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%node_id, unplaced = unplaced.len(), "node deleted");
        Ok(Some((node, unplaced)))
    }

    // ── Workloads ──────────────────────────────────────────────────

    /// Insert or update a workload record.
    pub fn put_workload(&self, workload: &WorkloadRecord) -> StoreResult<()> {
        validate_workload(workload)?;

        let value = serde_json::to_vec(workload).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
            table
                .insert(workload.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get a workload by id.
    pub fn get_workload(&self, workload_id: &str) -> StoreResult<Option<WorkloadRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
        match table.get(workload_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let workload: WorkloadRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(workload))
            }
            None => Ok(None),
        }
    }

    /// List all workloads.
    pub fn list_workloads(&self) -> StoreResult<Vec<WorkloadRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let workload: WorkloadRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(workload);
        }
        Ok(results)
    }

    /// List workloads with the given status.
    pub fn list_workloads_by_status(
        &self,
        status: WorkloadStatus,
    ) -> StoreResult<Vec<WorkloadRecord>> {
        Ok(self
            .list_workloads()?
            .into_iter()
            .filter(|w| w.status == status)
            .collect())
    }

    /// List workloads placed on the given node.
    pub fn list_workloads_on_node(&self, node_id: &str) -> StoreResult<Vec<WorkloadRecord>> {
        Ok(self
            .list_workloads()?
            .into_iter()
            .filter(|w| w.node_id.as_deref() == Some(node_id))
            .collect())
    }

    /// Delete a workload by id, cascading to its events.
    ///
    /// Returns the deleted record and how many events went with it.
    pub fn delete_workload(
        &self,
        workload_id: &str,
    ) -> StoreResult<Option<(WorkloadRecord, u32)>> {
        let Some(workload) = self.get_workload(workload_id)? else {
            return Ok(None);
        };

        let prefix = format!("{workload_id}:");
        let event_keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(WORKLOAD_EVENTS).map_err(map_err!(Table))?;
            table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, _) = entry.ok()?;
                    let k = key.value().to_string();
                    k.starts_with(&prefix).then_some(k)
                })
                .collect()
        };

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut workloads = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
            workloads.remove(workload_id).map_err(map_err!(Write))?;

            let mut events = txn.open_table(WORKLOAD_EVENTS).map_err(map_err!(Table))?;
            for key in &event_keys {
                events.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%workload_id, events_removed = event_keys.len(), "workload deleted");
        Ok(Some((workload, event_keys.len() as u32)))
    }

    // ── Workload events ────────────────────────────────────────────

    /// Append an event to a workload's audit trail. Events are
    /// insert-only; an existing key is never overwritten.
    pub fn append_event(&self, event: &WorkloadEventRecord) -> StoreResult<()> {
        let key = event.table_key();
        let value = serde_json::to_vec(event).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(WORKLOAD_EVENTS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// List all events for a workload (prefix scan on the composite key).
    pub fn list_events_for_workload(
        &self,
        workload_id: &str,
    ) -> StoreResult<Vec<WorkloadEventRecord>> {
        let prefix = format!("{workload_id}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKLOAD_EVENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let event: WorkloadEventRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(event);
            }
        }
        results.sort_by_key(|e| e.inserted_at);
        Ok(results)
    }

    /// List every event in the store.
    pub fn list_events(&self) -> StoreResult<Vec<WorkloadEventRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKLOAD_EVENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let event: WorkloadEventRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(event);
        }
        Ok(results)
    }

    // ── Scheduling rules ───────────────────────────────────────────

    /// Insert or update a scheduling rule.
    ///
    /// Rejects a name already registered to a different rule id.
    pub fn put_rule(&self, rule: &RuleRecord) -> StoreResult<()> {
        if let Some(existing) = self.find_rule_by_name(&rule.name)?
            && existing.id != rule.id
        {
            return Err(StoreError::RuleNameTaken(rule.name.clone()));
        }

        let value = serde_json::to_vec(rule).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SCHEDULING_RULES).map_err(map_err!(Table))?;
            table
                .insert(rule.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(rule = %rule.name, enabled = rule.enabled, "scheduling rule stored");
        Ok(())
    }

    /// Get a scheduling rule by id.
    pub fn get_rule(&self, rule_id: &str) -> StoreResult<Option<RuleRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SCHEDULING_RULES).map_err(map_err!(Table))?;
        match table.get(rule_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let rule: RuleRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(rule))
            }
            None => Ok(None),
        }
    }

    /// List all scheduling rules.
    pub fn list_rules(&self) -> StoreResult<Vec<RuleRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SCHEDULING_RULES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let rule: RuleRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(rule);
        }
        Ok(results)
    }

    /// List enabled rules in load order (ascending priority, then name
    /// for a stable order between equal priorities).
    pub fn list_enabled_rules(&self) -> StoreResult<Vec<RuleRecord>> {
        let mut rules: Vec<RuleRecord> = self
            .list_rules()?
            .into_iter()
            .filter(|r| r.enabled)
            .collect();
        rules.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        Ok(rules)
    }

    /// Find a scheduling rule by its unique name.
    pub fn find_rule_by_name(&self, name: &str) -> StoreResult<Option<RuleRecord>> {
        Ok(self.list_rules()?.into_iter().find(|r| r.name == name))
    }

    /// Delete a scheduling rule by id. Returns the deleted record.
    pub fn delete_rule(&self, rule_id: &str) -> StoreResult<Option<RuleRecord>> {
        let Some(rule) = self.get_rule(rule_id)? else {
            return Ok(None);
        };
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SCHEDULING_RULES).map_err(map_err!(Table))?;
            table.remove(rule_id).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(Some(rule))
    }
}

/// Usage must stay within capacity on both axes.
fn validate_node(node: &NodeRecord) -> StoreResult<()> {
    if node.cpu_total < 0 || node.memory_total_mb < 0 {
        return Err(StoreError::InvalidResources(format!(
            "node {} has negative capacity",
            node.id
        )));
    }
    if node.cpu_used < 0 || node.cpu_used > node.cpu_total {
        return Err(StoreError::InvalidResources(format!(
            "node {} cpu_used {} outside 0..={}",
            node.id, node.cpu_used, node.cpu_total
        )));
    }
    if node.memory_used_mb < 0 || node.memory_used_mb > node.memory_total_mb {
        return Err(StoreError::InvalidResources(format!(
            "node {} memory_used_mb {} outside 0..={}",
            node.id, node.memory_used_mb, node.memory_total_mb
        )));
    }
    Ok(())
}

/// Workloads must request a positive amount of both resources.
fn validate_workload(workload: &WorkloadRecord) -> StoreResult<()> {
    if workload.cpu_required <= 0 || workload.memory_required_mb <= 0 {
        return Err(StoreError::InvalidResources(format!(
            "workload {} must require positive cpu and memory",
            workload.id
        )));
    }
    Ok(())
}
