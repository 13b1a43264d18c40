//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Validator, aggregator and KPI engine call store methods that return
//! typed rows; they never execute SQL directly.

use crate::{
    error::{KpiError, KpiResult},
    types::SnapshotId,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

mod campaign;
mod event;
mod integrity;
mod subscription;

pub use campaign::{BudgetRow, MomentsRow, MonthlyCostRow};
pub use event::EventTypeCountRow;
pub use integrity::{ColumnCount, DanglingRef, DuplicateKey, SENTINEL_COLUMNS};
pub use subscription::{AttributionRow, GroupCountRow, YearCountRow};

/// Normalized grouping key for a free-text categorical column:
/// trimmed, with missing or empty values collapsed into `unknown`.
pub(crate) fn group_key(column: &str) -> String {
    format!("COALESCE(NULLIF(TRIM({column}), ''), '{UNKNOWN_GROUP}')")
}

/// `NULL` for a missing or whitespace-only text cell, else the cell.
pub(crate) fn present(column: &str) -> String {
    format!("NULLIF(TRIM({column}), '')")
}

/// Group label for rows whose categorical value is missing.
pub const UNKNOWN_GROUP: &str = "unknown";

/// A committed snapshot load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotRecord {
    pub id: SnapshotId,
    pub label: String,
    pub campaign_rows: i64,
    pub event_rows: i64,
    pub subscription_rows: i64,
    pub loaded_at: String,
}

/// A persisted report document.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReport {
    pub snapshot_id: SnapshotId,
    pub as_of: String,
    pub report_json: String,
}

pub struct KpiStore {
    conn: Connection,
}

impl KpiStore {
    pub fn open(path: &str) -> KpiResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> KpiResult<Self> {
        let conn = Connection::open(":memory:")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> KpiResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_snapshot_tables.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_kpi_report.sql"))?;
        Ok(())
    }

    /// Run `f` inside one transaction. An `Err` from `f` rolls everything back.
    pub fn in_transaction<T>(&self, f: impl FnOnce(&Self) -> KpiResult<T>) -> KpiResult<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }

    // ── Snapshot ───────────────────────────────────────────────

    /// Mark the current table contents as a committed snapshot.
    pub fn record_snapshot(&self, label: &str) -> KpiResult<SnapshotRecord> {
        let campaign_rows = self.campaign_count()?;
        let event_rows = self.event_count()?;
        let subscription_rows = self.subscription_count()?;
        self.conn.execute(
            "INSERT INTO snapshot (label, campaign_rows, event_rows, subscription_rows, loaded_at)
             VALUES (?1, ?2, ?3, ?4, datetime('now'))",
            params![label, campaign_rows, event_rows, subscription_rows],
        )?;
        let id = self.conn.last_insert_rowid();
        self.snapshot(id)?.ok_or(KpiError::SnapshotNotLoaded)
    }

    pub fn snapshot(&self, id: SnapshotId) -> KpiResult<Option<SnapshotRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, label, campaign_rows, event_rows, subscription_rows, loaded_at
                 FROM snapshot WHERE id = ?1",
                params![id],
                snapshot_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn latest_snapshot(&self) -> KpiResult<Option<SnapshotRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, label, campaign_rows, event_rows, subscription_rows, loaded_at
                 FROM snapshot ORDER BY id DESC LIMIT 1",
                [],
                snapshot_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// The latest snapshot, provided the tables still hold exactly what it
    /// committed. Rows added or removed since then mean a partial dataset.
    pub fn current_snapshot(&self) -> KpiResult<SnapshotRecord> {
        let snapshot = self.latest_snapshot()?.ok_or(KpiError::SnapshotNotLoaded)?;
        let matches = snapshot.campaign_rows == self.campaign_count()?
            && snapshot.event_rows == self.event_count()?
            && snapshot.subscription_rows == self.subscription_count()?;
        if !matches {
            log::warn!("snapshot {} no longer matches table contents", snapshot.id);
            return Err(KpiError::SnapshotNotLoaded);
        }
        Ok(snapshot)
    }

    /// Drop all rows of the three entity tables (snapshot history is kept).
    pub fn clear_tables(&self) -> KpiResult<()> {
        self.conn.execute_batch(
            "DELETE FROM event;
             DELETE FROM subscription;
             DELETE FROM campaign;",
        )?;
        Ok(())
    }

    // ── Reports ────────────────────────────────────────────────

    pub fn save_report(
        &self,
        snapshot_id: SnapshotId,
        as_of: &str,
        report_json: &str,
    ) -> KpiResult<()> {
        self.conn.execute(
            "INSERT INTO kpi_report (snapshot_id, as_of, report_json) VALUES (?1, ?2, ?3)",
            params![snapshot_id, as_of, report_json],
        )?;
        Ok(())
    }

    pub fn latest_report(&self) -> KpiResult<Option<StoredReport>> {
        let report = self
            .conn
            .query_row(
                "SELECT snapshot_id, as_of, report_json FROM kpi_report
                 ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok(StoredReport {
                        snapshot_id: row.get(0)?,
                        as_of: row.get(1)?,
                        report_json: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(report)
    }

    pub fn report_count(&self) -> KpiResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM kpi_report", [], |row| row.get(0))
            .map_err(Into::into)
    }
}

fn snapshot_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SnapshotRecord> {
    Ok(SnapshotRecord {
        id: row.get(0)?,
        label: row.get(1)?,
        campaign_rows: row.get(2)?,
        event_rows: row.get(3)?,
        subscription_rows: row.get(4)?,
        loaded_at: row.get(5)?,
    })
}
