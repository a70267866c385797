//! SQL migration definitions for the topology database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: topology_snapshots",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Append-only adjacency list snapshots
CREATE TABLE IF NOT EXISTS topology_snapshots (
    id             TEXT PRIMARY KEY,
    adjacency_json TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    source_count   INTEGER NOT NULL,
    total_edges    INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_snapshots_created_at ON topology_snapshots(created_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
