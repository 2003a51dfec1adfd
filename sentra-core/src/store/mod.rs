//! Entity store - transactional SQLite persistence for the entity graph
//!
//! Single-connection, single-writer. All multi-row writes go through an
//! explicit transaction; readers never observe a partially applied batch.
//! Checkpoint/restore copy the whole database file and therefore take the
//! same `&mut self` exclusivity as writes.

pub mod entity;
pub mod record;
pub mod schema;

pub use entity::{Entity, EntityData, EntityType, RelationshipType, Severity};
pub use record::{ExecutionRecord, ExecutionStatus, ParseStatus};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::{Error, Result};

/// Entity counts by type plus total executions
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub entities: HashMap<EntityType, u32>,
    pub total_executions: u32,
}

/// SQLite-backed entity and execution-history store
pub struct EntityStore {
    path: PathBuf,
    conn: Option<Connection>,
}

impl EntityStore {
    /// Open (or create) the store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Self::connect(&path)?;
        Ok(Self {
            path,
            conn: Some(conn),
        })
    }

    fn connect(path: &Path) -> Result<Connection> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok(conn)
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| Error::Store("connection is closed".to_string()))
    }

    fn conn_mut(&mut self) -> Result<&mut Connection> {
        self.conn
            .as_mut()
            .ok_or_else(|| Error::Store("connection is closed".to_string()))
    }

    /// Path to the underlying database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Upsert a single entity (last write wins on data, confidence, and
    /// updated_at)
    pub fn upsert(&mut self, entity: &Entity) -> Result<()> {
        let conn = self.conn()?;
        Self::upsert_into(conn, entity)?;
        Ok(())
    }

    fn upsert_into(conn: &Connection, entity: &Entity) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO entities
             (id, entity_type, created_at, updated_at, confidence, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entity.id,
                entity.entity_type().as_str(),
                entity.created_at.to_rfc3339(),
                entity.updated_at.to_rfc3339(),
                entity.confidence,
                serde_json::to_string(&entity.data)?,
            ],
        )?;
        Ok(())
    }

    /// Atomic batch upsert: all entities commit together or none do
    pub fn upsert_batch(&mut self, entities: &[Entity]) -> Result<usize> {
        let conn = self.conn_mut()?;
        let tx = conn.transaction()?;
        for entity in entities {
            Self::upsert_into(&tx, entity)?;
        }
        tx.commit()?;
        debug!(count = entities.len(), "batch upsert committed");
        Ok(entities.len())
    }

    /// Insert a relationship edge; duplicate edges are ignored
    ///
    /// Both endpoints must already exist (enforced by foreign keys).
    pub fn link(
        &mut self,
        parent_id: &str,
        child_id: &str,
        relationship: RelationshipType,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO relationships
             (parent_id, child_id, relationship_type, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                parent_id,
                child_id,
                relationship.as_str(),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Fetch one entity by id
    pub fn get(&self, id: &str) -> Result<Option<Entity>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, created_at, updated_at, confidence, data FROM entities WHERE id = ?1",
        )?;
        let mut rows = stmt.query([id])?;

        match rows.next()? {
            Some(row) => Ok(Some(Self::entity_from_row(
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            )?)),
            None => Ok(None),
        }
    }

    /// All entities of a given type
    pub fn entities_by_type(&self, entity_type: EntityType) -> Result<Vec<Entity>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, created_at, updated_at, confidence, data
             FROM entities WHERE entity_type = ?1 ORDER BY id",
        )?;
        let raw: Vec<(String, String, String, f64, String)> = stmt
            .query_map([entity_type.as_str()], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

        raw.into_iter()
            .map(|(id, created, updated, confidence, data)| {
                Self::entity_from_row(id, created, updated, confidence, data)
            })
            .collect()
    }

    /// Child entities of a parent, filtered by relationship type
    pub fn children(
        &self,
        parent_id: &str,
        relationship: RelationshipType,
    ) -> Result<Vec<Entity>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT e.id, e.created_at, e.updated_at, e.confidence, e.data
             FROM entities e
             JOIN relationships r ON r.child_id = e.id
             WHERE r.parent_id = ?1 AND r.relationship_type = ?2
             ORDER BY e.id",
        )?;
        let raw: Vec<(String, String, String, f64, String)> = stmt
            .query_map(params![parent_id, relationship.as_str()], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

        raw.into_iter()
            .map(|(id, created, updated, confidence, data)| {
                Self::entity_from_row(id, created, updated, confidence, data)
            })
            .collect()
    }

    fn entity_from_row(
        id: String,
        created_at: String,
        updated_at: String,
        confidence: f64,
        data: String,
    ) -> Result<Entity> {
        Ok(Entity {
            id,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
            confidence,
            data: serde_json::from_str(&data)?,
        })
    }

    /// Record one execution history row (append-only)
    pub fn record_execution(&mut self, record: &ExecutionRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO executions
             (execution_id, tool_id, stage_id, status, parse_status, raw_output,
              started_at, completed_at, entities_created, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.execution_id,
                record.tool_id,
                record.stage_id,
                record.status.as_str(),
                record.parse_status.as_str(),
                record.raw_output,
                record.started_at.to_rfc3339(),
                record.completed_at.to_rfc3339(),
                record.entities_created,
                record.error_message,
            ],
        )?;
        Ok(())
    }

    /// Most recent execution for a tool id
    pub fn last_execution(&self, tool_id: &str) -> Result<Option<ExecutionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT execution_id, tool_id, stage_id, status, parse_status, raw_output,
                    started_at, completed_at, entities_created, error_message
             FROM executions WHERE tool_id = ?1
             ORDER BY completed_at DESC LIMIT 1",
        )?;
        let mut rows = stmt.query([tool_id])?;

        match rows.next()? {
            Some(row) => Ok(Some(Self::record_from_columns(
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
            )?)),
            None => Ok(None),
        }
    }

    /// All executions, newest first, optionally filtered by tool id
    pub fn executions(&self, tool_id: Option<&str>) -> Result<Vec<ExecutionRecord>> {
        let conn = self.conn()?;
        let sql_all = "SELECT execution_id, tool_id, stage_id, status, parse_status, raw_output,
                    started_at, completed_at, entities_created, error_message
             FROM executions ORDER BY started_at DESC";
        let sql_filtered = "SELECT execution_id, tool_id, stage_id, status, parse_status, raw_output,
                    started_at, completed_at, entities_created, error_message
             FROM executions WHERE tool_id = ?1 ORDER BY started_at DESC";

        type Row = (
            String,
            String,
            Option<i64>,
            String,
            String,
            Option<String>,
            String,
            String,
            u32,
            Option<String>,
        );
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<Row> {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
            ))
        };

        let raw: Vec<Row> = match tool_id {
            Some(tool) => {
                let mut stmt = conn.prepare(sql_filtered)?;
                let rows = stmt.query_map([tool], map_row)?;
                rows.collect::<std::result::Result<_, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(sql_all)?;
                let rows = stmt.query_map([], map_row)?;
                rows.collect::<std::result::Result<_, _>>()?
            }
        };

        raw.into_iter()
            .map(|(a, b, c, d, e, f, g, h, i, j)| {
                Self::record_from_columns(a, b, c, d, e, f, g, h, i, j)
            })
            .collect()
    }

    /// Whether a tool has at least one fully successful parse on record
    pub fn has_succeeded(&self, tool_id: &str) -> Result<bool> {
        Ok(self
            .last_execution(tool_id)?
            .map(|r| r.status == ExecutionStatus::Success && r.parse_status == ParseStatus::Parsed)
            .unwrap_or(false))
    }

    #[allow(clippy::too_many_arguments)]
    fn record_from_columns(
        execution_id: String,
        tool_id: String,
        stage_id: Option<i64>,
        status: String,
        parse_status: String,
        raw_output: Option<String>,
        started_at: String,
        completed_at: String,
        entities_created: u32,
        error_message: Option<String>,
    ) -> Result<ExecutionRecord> {
        Ok(ExecutionRecord {
            execution_id,
            tool_id,
            stage_id,
            status: status
                .parse()
                .map_err(|e: String| Error::Store(e))?,
            parse_status: parse_status
                .parse()
                .map_err(|e: String| Error::Store(e))?,
            raw_output: raw_output.unwrap_or_default(),
            started_at: parse_timestamp(&started_at)?,
            completed_at: parse_timestamp(&completed_at)?,
            entities_created,
            error_message,
        })
    }

    /// Delete entities whose updated_at is older than the TTL
    ///
    /// History rows are never touched by this path. Cascade removes any
    /// relationships referencing a pruned entity.
    pub fn prune_stale(&mut self, ttl: Duration) -> Result<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(ttl)
                .map_err(|e| Error::Store(format!("invalid TTL: {}", e)))?;
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM entities WHERE updated_at < ?1",
            [cutoff.to_rfc3339()],
        )?;
        if deleted > 0 {
            info!(deleted, "pruned stale entities");
        }
        Ok(deleted)
    }

    /// Snapshot the full database to a checkpoint file
    ///
    /// Closes the live handle so the file is fully flushed, copies it, and
    /// reopens. Not callable concurrently with writes: `&mut self` already
    /// serializes it behind the store's write exclusivity.
    pub fn checkpoint(&mut self, checkpoint_path: impl AsRef<Path>) -> Result<()> {
        self.close_handle()?;
        std::fs::copy(&self.path, checkpoint_path.as_ref())?;
        self.conn = Some(Self::connect(&self.path)?);
        info!(path = %checkpoint_path.as_ref().display(), "checkpoint written");
        Ok(())
    }

    /// Replace the live database with a checkpoint file
    pub fn restore(&mut self, checkpoint_path: impl AsRef<Path>) -> Result<()> {
        self.close_handle()?;
        std::fs::copy(checkpoint_path.as_ref(), &self.path)?;
        self.conn = Some(Self::connect(&self.path)?);
        info!(path = %checkpoint_path.as_ref().display(), "state restored from checkpoint");
        Ok(())
    }

    fn close_handle(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .map_err(|(_, e)| Error::Database(e))?;
        }
        Ok(())
    }

    /// Entity counts by type and total executions
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn()?;
        let mut stats = StoreStats::default();

        let mut stmt =
            conn.prepare("SELECT entity_type, COUNT(*) FROM entities GROUP BY entity_type")?;
        let rows: Vec<(String, u32)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;
        for (type_str, count) in rows {
            if let Ok(entity_type) = type_str.parse::<EntityType>() {
                stats.entities.insert(entity_type, count);
            }
        }

        stats.total_executions =
            conn.query_row("SELECT COUNT(*) FROM executions", [], |row| row.get(0))?;

        Ok(stats)
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Store(format!("invalid timestamp '{}': {}", s, e)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(temp: &TempDir) -> EntityStore {
        EntityStore::open(temp.path().join("state.db")).expect("should open store")
    }

    fn sample_record(tool_id: &str, status: ExecutionStatus) -> ExecutionRecord {
        ExecutionRecord {
            execution_id: ExecutionRecord::new_execution_id(),
            tool_id: tool_id.to_string(),
            stage_id: None,
            status,
            parse_status: ParseStatus::Parsed,
            raw_output: "output".to_string(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            entities_created: 1,
            error_message: None,
        }
    }

    #[test]
    fn test_upsert_and_get() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);

        let host = Entity::host("192.168.1.10").with_hostname("web.local");
        store.upsert(&host).unwrap();

        let loaded = store.get(&host.id).unwrap().expect("entity should exist");
        assert_eq!(loaded.id, host.id);
        assert_eq!(loaded.entity_type(), EntityType::Host);
        assert_eq!(loaded.data, host.data);
    }

    #[test]
    fn test_upsert_same_id_replaces() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);

        let first = Entity::host("192.168.1.10");
        store.upsert(&first).unwrap();

        let second = Entity::host("192.168.1.10").with_hostname("renamed.local");
        store.upsert(&second).unwrap();

        let hosts = store.entities_by_type(EntityType::Host).unwrap();
        assert_eq!(hosts.len(), 1, "same semantic key must not duplicate");
        assert_eq!(hosts[0].data, second.data);
    }

    #[test]
    fn test_batch_upsert_commits_together() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);

        let host = Entity::host("10.0.0.1");
        let port = Entity::port("10.0.0.1", 80, "tcp");
        let count = store.upsert_batch(&[host, port]).unwrap();

        assert_eq!(count, 2);
        assert_eq!(store.entities_by_type(EntityType::Host).unwrap().len(), 1);
        assert_eq!(store.entities_by_type(EntityType::Port).unwrap().len(), 1);
    }

    #[test]
    fn test_batch_upsert_rolls_back_on_fault() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);

        let good = Entity::host("10.0.0.1");
        let mut bad = Entity::host("10.0.0.2");
        // Violates the confidence CHECK constraint mid-batch
        bad.confidence = 2.0;

        let result = store.upsert_batch(&[good, bad]);
        assert!(result.is_err());
        assert!(
            store.entities_by_type(EntityType::Host).unwrap().is_empty(),
            "a failed batch must leave no entities visible"
        );
    }

    #[test]
    fn test_relationships_and_children() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);

        let host = Entity::host("10.0.0.1");
        let port80 = Entity::port("10.0.0.1", 80, "tcp");
        let port443 = Entity::port("10.0.0.1", 443, "tcp");
        store
            .upsert_batch(&[host.clone(), port80.clone(), port443.clone()])
            .unwrap();

        store
            .link(&host.id, &port80.id, RelationshipType::HasPort)
            .unwrap();
        store
            .link(&host.id, &port443.id, RelationshipType::HasPort)
            .unwrap();
        // Duplicate edge is ignored
        store
            .link(&host.id, &port80.id, RelationshipType::HasPort)
            .unwrap();

        let children = store.children(&host.id, RelationshipType::HasPort).unwrap();
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn test_link_requires_existing_endpoints() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);

        let result = store.link("host_missing", "port_missing", RelationshipType::HasPort);
        assert!(result.is_err(), "foreign keys must reject dangling edges");
    }

    #[test]
    fn test_cascade_delete_removes_edges() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);

        let host = Entity::host("10.0.0.1");
        let port = Entity::port("10.0.0.1", 22, "tcp");
        store.upsert_batch(&[host.clone(), port.clone()]).unwrap();
        store
            .link(&host.id, &port.id, RelationshipType::HasPort)
            .unwrap();

        // Deleting the host takes its edges with it
        store
            .conn()
            .unwrap()
            .execute("DELETE FROM entities WHERE id = ?1", [&host.id])
            .unwrap();
        let edges: u32 = store
            .conn()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM relationships", [], |r| r.get(0))
            .unwrap();
        assert_eq!(edges, 0);
    }

    #[test]
    fn test_execution_history_round_trip() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);

        let record = sample_record("port_scan", ExecutionStatus::Success);
        store.record_execution(&record).unwrap();

        let last = store
            .last_execution("port_scan")
            .unwrap()
            .expect("record should exist");
        assert_eq!(last.execution_id, record.execution_id);
        assert_eq!(last.status, ExecutionStatus::Success);
        assert_eq!(last.parse_status, ParseStatus::Parsed);
        assert_eq!(last.entities_created, 1);

        assert!(store.last_execution("dns_lookup").unwrap().is_none());
    }

    #[test]
    fn test_has_succeeded_reflects_latest_row() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);

        assert!(!store.has_succeeded("vuln_scan").unwrap());

        store
            .record_execution(&sample_record("vuln_scan", ExecutionStatus::Success))
            .unwrap();
        assert!(store.has_succeeded("vuln_scan").unwrap());
    }

    #[test]
    fn test_executions_filtering() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);

        store
            .record_execution(&sample_record("port_scan", ExecutionStatus::Success))
            .unwrap();
        store
            .record_execution(&sample_record("port_scan", ExecutionStatus::Failed))
            .unwrap();
        store
            .record_execution(&sample_record("dns_lookup", ExecutionStatus::Success))
            .unwrap();

        assert_eq!(store.executions(None).unwrap().len(), 3);
        assert_eq!(store.executions(Some("port_scan")).unwrap().len(), 2);
        assert!(store.executions(Some("whois_lookup")).unwrap().is_empty());
    }

    #[test]
    fn test_prune_removes_only_stale_entities() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);

        let mut stale = Entity::host("10.0.0.1");
        stale.updated_at = Utc::now() - chrono::Duration::hours(2);
        let fresh = Entity::host("10.0.0.2");
        store.upsert_batch(&[stale, fresh]).unwrap();

        store
            .record_execution(&sample_record("port_scan", ExecutionStatus::Success))
            .unwrap();

        let deleted = store.prune_stale(Duration::from_secs(3600)).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.entities_by_type(EntityType::Host).unwrap().len(), 1);
        // History survives pruning
        assert_eq!(store.executions(None).unwrap().len(), 1);
    }

    #[test]
    fn test_checkpoint_and_restore() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);
        let snapshot = temp.path().join("snapshot.db");

        store.upsert(&Entity::host("10.0.0.1")).unwrap();
        store.checkpoint(&snapshot).unwrap();

        // Mutate after the checkpoint
        store.upsert(&Entity::host("10.0.0.2")).unwrap();
        assert_eq!(store.entities_by_type(EntityType::Host).unwrap().len(), 2);

        // Restore rolls the state back
        store.restore(&snapshot).unwrap();
        let hosts = store.entities_by_type(EntityType::Host).unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].id, "host_10_0_0_1");
    }

    #[test]
    fn test_store_usable_after_checkpoint() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);
        let snapshot = temp.path().join("snapshot.db");

        store.upsert(&Entity::host("10.0.0.1")).unwrap();
        store.checkpoint(&snapshot).unwrap();

        // The handle reopened; writes still work
        store.upsert(&Entity::host("10.0.0.3")).unwrap();
        assert_eq!(store.entities_by_type(EntityType::Host).unwrap().len(), 2);
    }

    #[test]
    fn test_stats() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);

        store
            .upsert_batch(&[
                Entity::host("10.0.0.1"),
                Entity::host("10.0.0.2"),
                Entity::port("10.0.0.1", 80, "tcp"),
            ])
            .unwrap();
        store
            .record_execution(&sample_record("port_scan", ExecutionStatus::Success))
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.entities.get(&EntityType::Host), Some(&2));
        assert_eq!(stats.entities.get(&EntityType::Port), Some(&1));
        assert_eq!(stats.total_executions, 1);
    }
}
