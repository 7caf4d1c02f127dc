//! Ledger storage layer.
//!
//! Persists the host catalog, credentials, the transition ledger, price
//! samples and forecasts. The ledger *is* the migration state: nothing about
//! an in-flight transition is kept in memory between calls.
//!
//! ## Single-flight
//!
//! New transitions are written with one conditional statement that only
//! inserts when no open transition exists, backed by a unique partial index
//! over open rows. Concurrent callers (other processes included) can never
//! both succeed. Finalisation and cleanup are conditional updates, so each
//! happens at most once per transition.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};

use crate::core::models::{
    Credential, Forecast, HostId, HostIdentity, HostSpec, NewTransition, PriceSample, Transition,
    TransitionId,
};
use crate::error::{Result, SurfError};
use crate::storage::config::HostEntry;
use crate::storage::schema::{configure_connection, run_migrations};

const HOST_COLUMNS: &str = "id, name, long_name, is_provider, ticker_symbol, identity_marker";

const TRANSITION_COLUMNS: &str = "id, initiator, source_id, target_id, start_time, end_time, \
     succeeded, cleanup_done, process_id";

/// Ledger database access layer.
pub struct LedgerStore {
    conn: Connection,
}

impl LedgerStore {
    /// Create or open a ledger database at the given path.
    ///
    /// # Errors
    /// Returns an error if the parent directory cannot be created, the database
    /// cannot be opened, or schema migrations fail.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(path)
            .map_err(|e| SurfError::Database(format!("open ledger {}: {e}", path.display())))?;

        configure_connection(&conn)?;
        run_migrations(&mut conn)?;

        Ok(Self { conn })
    }

    /// Open an in-memory ledger (for testing).
    ///
    /// # Errors
    /// Returns an error if the in-memory database cannot be opened or migrations fail.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()
            .map_err(|e| SurfError::Database(format!("open in-memory db: {e}")))?;

        configure_connection(&conn)?;
        run_migrations(&mut conn)?;

        Ok(Self { conn })
    }

    // =========================================================================
    // Host catalog
    // =========================================================================

    /// Insert or update a catalog entry, keyed by name.
    ///
    /// # Errors
    /// Returns an error if the upsert or the read-back fails.
    pub fn upsert_host(&self, spec: &HostSpec) -> Result<HostIdentity> {
        self.conn.execute(
            "INSERT INTO hosts (name, long_name, is_provider, ticker_symbol, identity_marker) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(name) DO UPDATE SET \
                long_name = excluded.long_name, \
                is_provider = excluded.is_provider, \
                ticker_symbol = excluded.ticker_symbol, \
                identity_marker = excluded.identity_marker",
            params![
                spec.name,
                spec.long_name,
                spec.is_provider,
                spec.ticker_symbol,
                spec.identity_marker,
            ],
        )?;

        self.host_by_name(&spec.name)?.ok_or_else(|| {
            SurfError::Other(anyhow::anyhow!("host {} vanished after upsert", spec.name))
        })
    }

    /// Synchronise the catalog and credential slots with configuration.
    ///
    /// Entries are upserted by name and never deleted. Credentials configured
    /// with an empty value only declare the slot and keep any stored value.
    ///
    /// # Errors
    /// Returns an error if any write fails; the whole sync is rolled back.
    pub fn sync_catalog(&self, entries: &[HostEntry]) -> Result<Vec<HostIdentity>> {
        let tx = self.conn.unchecked_transaction()?;
        let mut synced = Vec::with_capacity(entries.len());
        for entry in entries {
            let host = self.upsert_host(&entry.to_spec())?;
            for (name, value) in &entry.credentials {
                if value.is_empty() {
                    self.ensure_credential(host.id, name)?;
                } else {
                    self.set_credential(host.id, name, value)?;
                }
            }
            synced.push(host);
        }
        tx.commit()?;
        tracing::debug!(hosts = synced.len(), "Synchronised host catalog");
        Ok(synced)
    }

    /// All catalog entries in insertion order.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn hosts(&self) -> Result<Vec<HostIdentity>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT {HOST_COLUMNS} FROM hosts ORDER BY id"))?;
        let rows = stmt.query_map([], map_host)?;
        collect_rows(rows)
    }

    /// Catalog entries that the service can run on, in insertion order.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn providers(&self) -> Result<Vec<HostIdentity>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {HOST_COLUMNS} FROM hosts WHERE is_provider = 1 ORDER BY id"
        ))?;
        let rows = stmt.query_map([], map_host)?;
        collect_rows(rows)
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub fn host_by_name(&self, name: &str) -> Result<Option<HostIdentity>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT {HOST_COLUMNS} FROM hosts WHERE name = ?1"))?;
        Ok(stmt.query_row([name], map_host).optional()?)
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub fn host_by_id(&self, id: HostId) -> Result<Option<HostIdentity>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT {HOST_COLUMNS} FROM hosts WHERE id = ?1"))?;
        Ok(stmt.query_row([id], map_host).optional()?)
    }

    /// Resolve an optional reference, treating a dangling id as absent.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn resolve_host(&self, id: Option<HostId>) -> Result<Option<HostIdentity>> {
        match id {
            Some(id) => self.host_by_id(id),
            None => Ok(None),
        }
    }

    /// Delete a catalog entry. Its credentials go with it; transitions and
    /// forecasts keep their rows with the reference cleared.
    ///
    /// # Errors
    /// Returns an error if the DELETE fails.
    pub fn delete_host(&self, id: HostId) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM hosts WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    // =========================================================================
    // Credentials
    // =========================================================================

    /// Insert or replace the value of a host's credential.
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub fn set_credential(&self, host_id: HostId, name: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO credentials (host_id, name, value) VALUES (?1, ?2, ?3) \
             ON CONFLICT(host_id, name) DO UPDATE SET value = excluded.value",
            params![host_id, name, value],
        )?;
        Ok(())
    }

    /// Declare a credential slot without overwriting an existing value.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn ensure_credential(&self, host_id: HostId, name: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO credentials (host_id, name, value) VALUES (?1, ?2, '')",
            params![host_id, name],
        )?;
        Ok(())
    }

    /// Credential by (provider, name).
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn credential(&self, host_id: HostId, name: &str) -> Result<Option<Credential>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, host_id, name, value FROM credentials WHERE host_id = ?1 AND name = ?2",
        )?;
        Ok(stmt
            .query_row(params![host_id, name], map_credential)
            .optional()?)
    }

    /// All credentials of one host, ordered by name.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn credentials_for(&self, host_id: HostId) -> Result<Vec<Credential>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, host_id, name, value FROM credentials WHERE host_id = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map([host_id], map_credential)?;
        collect_rows(rows)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Insert a transition iff no transition is open.
    ///
    /// Returns `None` when another open transition already exists.
    ///
    /// # Errors
    /// Returns an error if the insert fails for any other reason.
    pub fn insert_transition_if_idle(&self, new: &NewTransition) -> Result<Option<Transition>> {
        let inserted = self.conn.execute(
            "INSERT INTO transitions (initiator, source_id, target_id, start_time) \
             SELECT ?1, ?2, ?3, ?4 \
             WHERE NOT EXISTS (SELECT 1 FROM transitions WHERE end_time IS NULL)",
            params![
                new.initiator,
                new.source_id,
                new.target_id,
                encode_time(new.start_time),
            ],
        );

        match inserted {
            Ok(0) => Ok(None),
            Ok(_) => {
                let id = self.conn.last_insert_rowid();
                self.transition(id)
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub fn transition(&self, id: TransitionId) -> Result<Option<Transition>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {TRANSITION_COLUMNS} FROM transitions WHERE id = ?1"
        ))?;
        Ok(stmt.query_row([id], map_transition).optional()?)
    }

    /// Latest transition by start time.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn latest_transition(&self) -> Result<Option<Transition>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {TRANSITION_COLUMNS} FROM transitions ORDER BY start_time DESC, id DESC LIMIT 1"
        ))?;
        Ok(stmt.query_row([], map_transition).optional()?)
    }

    /// Most recent transitions, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn recent_transitions(&self, limit: usize) -> Result<Vec<Transition>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {TRANSITION_COLUMNS} FROM transitions \
             ORDER BY start_time DESC, id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map([limit_param(limit)], map_transition)?;
        collect_rows(rows)
    }

    /// Number of transitions without an end time.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn count_open_transitions(&self) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM transitions WHERE end_time IS NULL",
            [],
            |row| row.get(0),
        )?)
    }

    /// Record the process group of the migration process driving a transition.
    ///
    /// # Errors
    /// Returns an error if the UPDATE fails.
    pub fn set_transition_process(&self, id: TransitionId, process_id: u32) -> Result<()> {
        self.conn.execute(
            "UPDATE transitions SET process_id = ?2 WHERE id = ?1",
            params![id, i64::from(process_id)],
        )?;
        Ok(())
    }

    /// Close an open transition as succeeded. Returns false if it was
    /// already closed (or no longer exists).
    ///
    /// # Errors
    /// Returns an error if the UPDATE fails.
    pub fn finalize_transition(&self, id: TransitionId, end_time: DateTime<Utc>) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE transitions SET end_time = ?2, succeeded = 1 \
             WHERE id = ?1 AND end_time IS NULL",
            params![id, encode_time(end_time)],
        )?;
        Ok(updated == 1)
    }

    /// Claim the cleanup of a finished transition. Only the first caller
    /// gets `true`.
    ///
    /// # Errors
    /// Returns an error if the UPDATE fails.
    pub fn claim_cleanup(&self, id: TransitionId) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE transitions SET cleanup_done = 1 \
             WHERE id = ?1 AND cleanup_done = 0 AND end_time IS NOT NULL",
            [id],
        )?;
        Ok(updated == 1)
    }

    /// Claim recovery of an open transition for one watchdog run.
    ///
    /// Succeeds when the transition is still open and unclaimed, or its
    /// previous claim is older than `lapsed_before`.
    ///
    /// # Errors
    /// Returns an error if the UPDATE fails.
    pub fn claim_recovery(
        &self,
        id: TransitionId,
        now: DateTime<Utc>,
        lapsed_before: DateTime<Utc>,
    ) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE transitions SET recovery_claimed_at = ?2 \
             WHERE id = ?1 AND end_time IS NULL \
             AND (recovery_claimed_at IS NULL OR recovery_claimed_at < ?3)",
            params![id, encode_time(now), encode_time(lapsed_before)],
        )?;
        Ok(updated == 1)
    }

    /// Delete a transition only while it is still open.
    ///
    /// # Errors
    /// Returns an error if the DELETE fails.
    pub fn delete_open_transition(&self, id: TransitionId) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM transitions WHERE id = ?1 AND end_time IS NULL",
            [id],
        )?;
        Ok(deleted == 1)
    }

    // =========================================================================
    // Price samples and forecasts
    // =========================================================================

    /// Append one price sample.
    ///
    /// # Errors
    /// Returns an error if any insert fails; the sample is written atomically.
    pub fn record_price_sample(
        &self,
        time: DateTime<Utc>,
        changes: &BTreeMap<String, f64>,
    ) -> Result<PriceSample> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO price_samples (sampled_at) VALUES (?1)",
            [encode_time(time)],
        )?;
        let id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO price_sample_values (sample_id, provider, change_pct) \
                 VALUES (?1, ?2, ?3)",
            )?;
            for (provider, change) in changes {
                stmt.execute(params![id, provider, change])?;
            }
        }
        tx.commit()?;

        Ok(PriceSample {
            id,
            time,
            changes: changes.clone(),
        })
    }

    /// The `limit` most recent price samples, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn recent_price_samples(&self, limit: usize) -> Result<Vec<PriceSample>> {
        let headers: Vec<(i64, DateTime<Utc>)> = {
            let mut stmt = self.conn.prepare_cached(
                "SELECT id, sampled_at FROM price_samples \
                 ORDER BY sampled_at DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map([limit_param(limit)], |row| {
                Ok((row.get(0)?, parse_time(row, 1)?))
            })?;
            collect_rows(rows)?
        };

        let mut values = self
            .conn
            .prepare_cached("SELECT provider, change_pct FROM price_sample_values WHERE sample_id = ?1")?;

        let mut samples = Vec::with_capacity(headers.len());
        for (id, time) in headers {
            let rows = values.query_map([id], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let changes: BTreeMap<String, f64> = collect_rows(rows)?.into_iter().collect();
            samples.push(PriceSample { id, time, changes });
        }

        Ok(samples)
    }

    /// Record the outcome of a decision cycle.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn record_forecast(&self, time: DateTime<Utc>, provider_id: HostId) -> Result<Forecast> {
        self.conn.execute(
            "INSERT INTO forecasts (forecast_at, provider_id) VALUES (?1, ?2)",
            params![encode_time(time), provider_id],
        )?;
        Ok(Forecast {
            id: self.conn.last_insert_rowid(),
            time,
            provider_id: Some(provider_id),
        })
    }

    /// Most recent forecasts, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn recent_forecasts(&self, limit: usize) -> Result<Vec<Forecast>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, forecast_at, provider_id FROM forecasts \
             ORDER BY forecast_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit_param(limit)], |row| {
            Ok(Forecast {
                id: row.get(0)?,
                time: parse_time(row, 1)?,
                provider_id: row.get(2)?,
            })
        })?;
        collect_rows(rows)
    }

    /// Count rows in a specified table.
    ///
    /// # Errors
    /// Returns an error if the table name is invalid or the COUNT query fails.
    pub fn count_rows(&self, table: &str) -> Result<i64> {
        // Validate table name to prevent SQL injection
        let valid_tables = [
            "hosts",
            "credentials",
            "transitions",
            "price_samples",
            "price_sample_values",
            "forecasts",
            "schema_migrations",
        ];
        if !valid_tables.contains(&table) {
            return Err(SurfError::Config(format!("Invalid table name: {table}")));
        }

        let query = format!("SELECT COUNT(*) FROM {table}");
        Ok(self.conn.query_row(&query, [], |row| row.get(0))?)
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn encode_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_optional_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

#[allow(clippy::cast_possible_wrap)] // listing limits are small
const fn limit_param(limit: usize) -> i64 {
    limit as i64
}

fn collect_rows<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn map_host(row: &Row<'_>) -> rusqlite::Result<HostIdentity> {
    Ok(HostIdentity {
        id: row.get(0)?,
        name: row.get(1)?,
        long_name: row.get(2)?,
        is_provider: row.get(3)?,
        ticker_symbol: row.get(4)?,
        identity_marker: row.get(5)?,
    })
}

fn map_credential(row: &Row<'_>) -> rusqlite::Result<Credential> {
    Ok(Credential {
        id: row.get(0)?,
        host_id: row.get(1)?,
        name: row.get(2)?,
        value: row.get(3)?,
    })
}

fn map_transition(row: &Row<'_>) -> rusqlite::Result<Transition> {
    let process_id: Option<i64> = row.get(8)?;
    Ok(Transition {
        id: row.get(0)?,
        initiator: row.get(1)?,
        source_id: row.get(2)?,
        target_id: row.get(3)?,
        start_time: parse_time(row, 4)?,
        end_time: parse_optional_time(row, 5)?,
        succeeded: row.get(6)?,
        cleanup_done: row.get(7)?,
        process_id: process_id.and_then(|pid| u32::try_from(pid).ok()),
    })
}
