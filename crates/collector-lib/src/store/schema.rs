//! Schema management and migrations

use crate::error::{StoreError, StoreResult};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 1;

/// Apply all pending migrations
pub fn apply_migrations(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version = current_version(conn)?;
    debug!(current_version, target_version = SCHEMA_VERSION, "Checking migrations");

    if current_version < 1 {
        info!(from = current_version, to = SCHEMA_VERSION, "Applying schema migrations");
        conn.execute_batch(SCHEMA_V1)
            .map_err(|e| StoreError::Schema(format!("Failed to apply v1 schema: {}", e)))?;
        conn.execute("INSERT INTO schema_migrations (version) VALUES (?1)", [1])?;
    }

    Ok(())
}

fn current_version(conn: &Connection) -> StoreResult<i32> {
    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))
        .optional()?
        .flatten();

    Ok(version.unwrap_or(0))
}

/// Timestamps are Unix seconds (UTC).
const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS units (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    namespace TEXT NOT NULL,
    name TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE(namespace, name)
);

CREATE TABLE IF NOT EXISTS sub_units (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    unit_id INTEGER NOT NULL REFERENCES units(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    image TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE(unit_id, name)
);

CREATE TABLE IF NOT EXISTS usage_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sub_unit_id INTEGER NOT NULL REFERENCES sub_units(id) ON DELETE CASCADE,
    timestamp INTEGER NOT NULL,
    cpu_usage REAL NOT NULL,
    memory_usage INTEGER NOT NULL,
    UNIQUE(sub_unit_id, timestamp)
);

CREATE TABLE IF NOT EXISTS resource_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sub_unit_id INTEGER NOT NULL REFERENCES sub_units(id) ON DELETE CASCADE,
    cpu_request REAL NOT NULL DEFAULT 0,
    cpu_limit REAL NOT NULL DEFAULT 0,
    mem_request INTEGER NOT NULL DEFAULT 0,
    mem_limit INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS analyses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sub_unit_id INTEGER NOT NULL REFERENCES sub_units(id) ON DELETE CASCADE,
    analyzed_at INTEGER NOT NULL,
    window_start INTEGER NOT NULL,
    window_end INTEGER NOT NULL,
    avg_cpu REAL NOT NULL,
    max_cpu REAL NOT NULL,
    p95_cpu REAL NOT NULL,
    p99_cpu REAL NOT NULL,
    avg_memory INTEGER NOT NULL,
    max_memory INTEGER NOT NULL,
    p95_memory INTEGER NOT NULL,
    p99_memory INTEGER NOT NULL,
    current_cpu_request REAL NOT NULL,
    current_mem_request INTEGER NOT NULL,
    recommended_cpu REAL NOT NULL,
    recommended_memory INTEGER NOT NULL,
    cpu_waste_percent REAL NOT NULL,
    memory_waste_percent REAL NOT NULL,
    monthly_savings REAL NOT NULL,
    status TEXT NOT NULL,
    confidence TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS recommendations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    analysis_id INTEGER NOT NULL REFERENCES analyses(id) ON DELETE CASCADE,
    namespace TEXT NOT NULL,
    unit_name TEXT NOT NULL,
    sub_unit_name TEXT NOT NULL,
    current_cpu REAL NOT NULL,
    current_memory INTEGER NOT NULL,
    recommended_cpu REAL NOT NULL,
    recommended_memory INTEGER NOT NULL,
    monthly_savings REAL NOT NULL,
    confidence TEXT NOT NULL,
    status TEXT NOT NULL,
    reason TEXT NOT NULL,
    applied INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_units_namespace ON units(namespace);
CREATE INDEX IF NOT EXISTS idx_snapshots_timestamp ON usage_snapshots(timestamp);
CREATE INDEX IF NOT EXISTS idx_requests_sub_unit ON resource_requests(sub_unit_id, updated_at);
CREATE INDEX IF NOT EXISTS idx_analyses_sub_unit ON analyses(sub_unit_id, id);
CREATE INDEX IF NOT EXISTS idx_analyses_status ON analyses(status);
CREATE INDEX IF NOT EXISTS idx_recommendations_applied ON recommendations(applied);
"#;
