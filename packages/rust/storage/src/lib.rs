//! Snapshot storage for workload adjacency lists.
//!
//! [`TopologyStore`] is the narrow interface the pipelines depend on:
//! append a snapshot, read back the most recent one. Two implementations:
//! - [`Storage`]: Turso Embedded / libSQL file database (the default)
//! - [`MemoryStore`]: process-local, for tests and dry runs
//!
//! Snapshots are append-only. Concurrent writers never update a row in
//! place, so the only race is which snapshot counts as "most recent", and
//! that is settled by `created_at` at read time.

mod memory;
mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database, params};
use meshctx_shared::{AdjacencyList, MeshCtxError, Result, Snapshot, SnapshotId};
use tracing::{debug, info, instrument};

pub use memory::MemoryStore;

/// Persists adjacency-list snapshots.
///
/// Implementations must be `Send + Sync` so one handle can be shared by all
/// concurrent requests.
#[async_trait]
pub trait TopologyStore: Send + Sync {
    /// Short backend name, reported by health checks.
    fn name(&self) -> &'static str;

    /// Append a snapshot of `adjacency_list` and return its identifier.
    async fn save_snapshot(&self, adjacency_list: &AdjacencyList) -> Result<SnapshotId>;

    /// The most recent snapshot, or `None` if nothing was saved yet.
    async fn latest_snapshot(&self) -> Result<Option<Snapshot>>;

    /// Number of stored snapshots.
    async fn snapshot_count(&self) -> Result<u64>;

    /// The adjacency list of the most recent snapshot.
    async fn latest_adjacency_list(&self) -> Result<Option<AdjacencyList>> {
        Ok(self.latest_snapshot().await?.map(|s| s.adjacency_list))
    }
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MeshCtxError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| MeshCtxError::Store(format!("failed to open {}: {e}", path.display())))?;

        let conn = db
            .connect()
            .map_err(|e| MeshCtxError::Store(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        info!(path = %path.display(), "opened topology store");
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        MeshCtxError::Store(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Insert an already captured snapshot.
    async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let adjacency_json = serde_json::to_string(&snapshot.adjacency_list)
            .map_err(|e| MeshCtxError::Store(format!("failed to encode adjacency list: {e}")))?;

        self.conn
            .execute(
                "INSERT INTO topology_snapshots (id, adjacency_json, created_at, source_count, total_edges)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    snapshot.id.to_string(),
                    adjacency_json,
                    format_timestamp(snapshot.created_at),
                    snapshot.source_count as i64,
                    snapshot.total_edges as i64,
                ],
            )
            .await
            .map_err(|e| MeshCtxError::Store(format!("failed to insert snapshot: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl TopologyStore for Storage {
    fn name(&self) -> &'static str {
        "libsql"
    }

    #[instrument(skip_all, fields(sources = adjacency_list.source_count()))]
    async fn save_snapshot(&self, adjacency_list: &AdjacencyList) -> Result<SnapshotId> {
        let snapshot = Snapshot::capture(adjacency_list.clone(), Utc::now());
        self.insert_snapshot(&snapshot).await?;

        info!(
            id = %snapshot.id,
            total_edges = snapshot.total_edges,
            "saved adjacency list snapshot"
        );
        Ok(snapshot.id)
    }

    async fn latest_snapshot(&self) -> Result<Option<Snapshot>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, adjacency_json, created_at, source_count, total_edges
                 FROM topology_snapshots
                 ORDER BY created_at DESC, id DESC
                 LIMIT 1",
                params![],
            )
            .await
            .map_err(|e| MeshCtxError::Store(format!("failed to query snapshots: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let snapshot = row_to_snapshot(&row)?;
                debug!(id = %snapshot.id, "loaded latest snapshot");
                Ok(Some(snapshot))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(MeshCtxError::Store(e.to_string())),
        }
    }

    async fn snapshot_count(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM topology_snapshots", params![])
            .await
            .map_err(|e| MeshCtxError::Store(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map(|n| n as u64)
                .map_err(|e| MeshCtxError::Store(e.to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(MeshCtxError::Store(e.to_string())),
        }
    }
}

/// Fixed-width UTC timestamps so lexical order equals time order.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Convert a database row to a [`Snapshot`].
fn row_to_snapshot(row: &libsql::Row) -> Result<Snapshot> {
    let id: String = row
        .get(0)
        .map_err(|e| MeshCtxError::Store(e.to_string()))?;
    let adjacency_json: String = row
        .get(1)
        .map_err(|e| MeshCtxError::Store(e.to_string()))?;
    let created_at: String = row
        .get(2)
        .map_err(|e| MeshCtxError::Store(e.to_string()))?;

    Ok(Snapshot {
        id: id
            .parse()
            .map_err(|e| MeshCtxError::Store(format!("invalid snapshot id '{id}': {e}")))?,
        adjacency_list: serde_json::from_str(&adjacency_json)
            .map_err(|e| MeshCtxError::Store(format!("invalid adjacency_json: {e}")))?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| MeshCtxError::Store(format!("invalid date: {e}")))?,
        source_count: row
            .get::<i64>(3)
            .map_err(|e| MeshCtxError::Store(e.to_string()))? as usize,
        total_edges: row
            .get::<i64>(4)
            .map_err(|e| MeshCtxError::Store(e.to_string()))? as usize,
    })
}
