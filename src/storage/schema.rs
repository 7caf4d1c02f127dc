//! Ledger schema and migrations.
//!
//! This module defines the `SQLite` schema for the host catalog, the
//! transition ledger and the price history, and applies versioned
//! migrations on open.

use std::time::Duration;

use anyhow::anyhow;
use rusqlite::Connection;

use crate::error::{Result, SurfError};

const LEDGER_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("../../migrations/001_catalog.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("../../migrations/002_transitions.sql"),
    },
    Migration {
        version: 3,
        sql: include_str!("../../migrations/003_price_history.sql"),
    },
    Migration {
        version: 4,
        sql: include_str!("../../migrations/004_transition_recovery.sql"),
    },
];

/// How long a connection waits on a lock held by another process.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Apply connection-level settings every ledger connection needs.
///
/// # Errors
/// Returns an error if a PRAGMA cannot be applied.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|e| SurfError::Database(format!("set busy timeout: {e}")))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|e| SurfError::Database(format!("enable foreign keys: {e}")))?;
    Ok(())
}

/// Run schema migrations for the ledger database.
///
/// Returns the latest schema version applied.
///
/// # Errors
/// Returns an error if creating the migrations table, reading the schema version,
/// or applying any migration fails.
pub fn run_migrations(conn: &mut Connection) -> Result<i32> {
    ensure_schema_migrations_table(conn)?;

    let mut current_version = get_schema_version(conn)?;

    for migration in LEDGER_MIGRATIONS {
        if migration.version > current_version {
            apply_migration(conn, migration)?;
            current_version = migration.version;
        }
    }

    Ok(current_version)
}

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: i32,
    sql: &'static str,
}

fn ensure_schema_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
            version INTEGER PRIMARY KEY,\
            applied_at TEXT DEFAULT (datetime('now'))\
        );",
    )
    .map_err(|e| SurfError::Other(anyhow!("create schema_migrations: {e}")))?;

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .map_err(|e| SurfError::Other(anyhow!("read schema version: {e}")))?;

    Ok(version.unwrap_or(0))
}

fn apply_migration(conn: &mut Connection, migration: &Migration) -> Result<()> {
    let tx = conn
        .transaction()
        .map_err(|e| SurfError::Other(anyhow!("begin migration: {e}")))?;

    tx.execute_batch(migration.sql).map_err(|e| {
        SurfError::Other(anyhow!("apply migration {}: {e}", migration.version))
    })?;

    tx.execute(
        "INSERT INTO schema_migrations (version) VALUES (?1)",
        [migration.version],
    )
    .map_err(|e| SurfError::Other(anyhow!("record migration {}: {e}", migration.version)))?;

    tx.commit()
        .map_err(|e| SurfError::Other(anyhow!("commit migration {}: {e}", migration.version)))?;

    Ok(())
}
