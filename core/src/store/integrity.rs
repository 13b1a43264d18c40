//! Integrity queries backing the validator.
//!
//! Table and column names come from the static lists below, never from
//! input, so they are formatted straight into the SQL text.

use super::{present, KpiStore};
use crate::{clock::AsOf, error::KpiResult};
use rusqlite::params;
use serde::{Deserialize, Serialize};

/// Date and foreign-key columns where an empty string means "absent".
/// These are the only cells `normalize_empty_sentinels` may rewrite.
pub const SENTINEL_COLUMNS: &[(&str, &str)] = &[
    ("campaign", "start_date"),
    ("campaign", "end_date"),
    ("event", "campaign_id"),
    ("event", "subscription_id"),
    ("event", "event_date"),
    ("subscription", "start_date"),
    ("subscription", "end_date"),
];

const DATE_COLUMNS: &[(&str, &str)] = &[
    ("campaign", "start_date"),
    ("campaign", "end_date"),
    ("event", "event_date"),
    ("subscription", "start_date"),
    ("subscription", "end_date"),
];

#[derive(Clone, Copy)]
enum Kind {
    Text,
    Number,
}

/// Required columns per entity. Everything else is optional.
const REQUIRED: &[(&str, &[(&str, Kind)])] = &[
    (
        "campaign",
        &[
            ("campaign_id", Kind::Text),
            ("campaign_name", Kind::Text),
            ("start_date", Kind::Text),
            ("end_date", Kind::Text),
            ("budget", Kind::Number),
            ("target_audience", Kind::Text),
            ("channel", Kind::Text),
        ],
    ),
    (
        "event",
        &[
            ("event_id", Kind::Text),
            ("campaign_id", Kind::Text),
            ("event_type", Kind::Text),
            ("event_date", Kind::Text),
            ("channel", Kind::Text),
        ],
    ),
    (
        "subscription",
        &[
            ("subscription_id", Kind::Text),
            ("start_date", Kind::Text),
            ("n_meals", Kind::Number),
            ("n_people", Kind::Number),
            ("n_orders", Kind::Number),
            ("food_choice", Kind::Text),
        ],
    ),
];

const PRIMARY_KEYS: &[(&str, &str)] = &[
    ("campaign", "campaign_id"),
    ("event", "event_id"),
    ("subscription", "subscription_id"),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnCount {
    pub table: String,
    pub column: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DuplicateKey {
    pub table: String,
    pub key: String,
    pub count: i64,
}

/// An event whose reference does not resolve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DanglingRef {
    pub event_id: String,
    pub reference: String,
}

impl KpiStore {
    // ── Integrity checks ───────────────────────────────────────

    /// Rows per entity with at least one required field missing.
    /// Empty or whitespace-only text counts as missing.
    pub fn rows_missing_required(&self) -> KpiResult<Vec<(String, i64)>> {
        let mut out = Vec::with_capacity(REQUIRED.len());
        for (table, columns) in REQUIRED {
            let predicate = columns
                .iter()
                .map(|(column, kind)| match kind {
                    Kind::Text => format!("{} IS NULL", present(column)),
                    Kind::Number => format!("{column} IS NULL"),
                })
                .collect::<Vec<_>>()
                .join(" OR ");
            let sql = format!("SELECT COUNT(*) FROM {table} WHERE {predicate}");
            let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
            out.push((table.to_string(), count));
        }
        Ok(out)
    }

    pub fn campaigns_ending_before_start(&self) -> KpiResult<Vec<String>> {
        self.query_ids(
            "SELECT COALESCE(campaign_id, '') FROM campaign
             WHERE julianday(end_date) < julianday(start_date)
             ORDER BY campaign_id ASC",
            params![],
        )
    }

    pub fn campaigns_starting_after(&self, as_of: AsOf) -> KpiResult<Vec<String>> {
        self.query_ids(
            "SELECT COALESCE(campaign_id, '') FROM campaign
             WHERE julianday(start_date) > julianday(?1)
             ORDER BY campaign_id ASC",
            params![as_of.iso()],
        )
    }

    fn query_ids<P: rusqlite::Params>(&self, sql: &str, p: P) -> KpiResult<Vec<String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let ids = stmt
            .query_map(p, |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Keys appearing more than once, for every entity.
    pub fn duplicate_keys(&self) -> KpiResult<Vec<DuplicateKey>> {
        let mut out = Vec::new();
        for (table, column) in PRIMARY_KEYS {
            let sql = format!(
                "SELECT {column}, COUNT(*) FROM {table}
                 WHERE {key} IS NOT NULL
                 GROUP BY {column}
                 HAVING COUNT(*) > 1
                 ORDER BY {column} ASC",
                key = present(column),
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(DuplicateKey {
                        table: table.to_string(),
                        key: row.get(0)?,
                        count: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            out.extend(rows);
        }
        Ok(out)
    }

    /// Events whose campaign id names no campaign.
    pub fn events_with_unknown_campaign(&self) -> KpiResult<Vec<DanglingRef>> {
        self.dangling("campaign_id", "campaign", "campaign_id")
    }

    /// Events whose subscription id names no subscription.
    pub fn events_with_unknown_subscription(&self) -> KpiResult<Vec<DanglingRef>> {
        self.dangling("subscription_id", "subscription", "subscription_id")
    }

    fn dangling(&self, fk: &str, target: &str, target_key: &str) -> KpiResult<Vec<DanglingRef>> {
        let sql = format!(
            "SELECT COALESCE(e.event_id, ''), e.{fk} FROM event e
             WHERE {present_fk} IS NOT NULL
               AND NOT EXISTS (SELECT 1 FROM {target} t WHERE t.{target_key} = e.{fk})
             ORDER BY e.event_id ASC",
            present_fk = present(&format!("e.{fk}")),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DanglingRef {
                    event_id: row.get(0)?,
                    reference: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Empty-string cells in the sentinel columns.
    pub fn empty_string_artifacts(&self) -> KpiResult<Vec<ColumnCount>> {
        self.count_per_column(SENTINEL_COLUMNS, |column| {
            format!("{column} IS NOT NULL AND TRIM({column}) = ''")
        })
    }

    /// NULL cells in the sentinel columns.
    pub fn null_cells(&self) -> KpiResult<Vec<ColumnCount>> {
        self.count_per_column(SENTINEL_COLUMNS, |column| format!("{column} IS NULL"))
    }

    /// Non-empty date cells SQLite cannot read as a date.
    pub fn malformed_dates(&self) -> KpiResult<Vec<ColumnCount>> {
        self.count_per_column(DATE_COLUMNS, |column| {
            format!("{} IS NOT NULL AND julianday({column}) IS NULL", present(column))
        })
    }

    fn count_per_column(
        &self,
        columns: &[(&str, &str)],
        predicate: impl Fn(&str) -> String,
    ) -> KpiResult<Vec<ColumnCount>> {
        let mut out = Vec::with_capacity(columns.len());
        for (table, column) in columns {
            let sql = format!("SELECT COUNT(*) FROM {table} WHERE {}", predicate(column));
            let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
            out.push(ColumnCount {
                table: table.to_string(),
                column: column.to_string(),
                count,
            });
        }
        Ok(out)
    }

    // ── Normalization ──────────────────────────────────────────

    /// Rewrite empty-string sentinel cells to NULL. Returns cells changed per column.
    pub fn normalize_empty_sentinels(&self) -> KpiResult<Vec<ColumnCount>> {
        let mut out = Vec::with_capacity(SENTINEL_COLUMNS.len());
        for (table, column) in SENTINEL_COLUMNS {
            let sql = format!(
                "UPDATE {table} SET {column} = NULL
                 WHERE {column} IS NOT NULL AND TRIM({column}) = ''"
            );
            let count = self.conn.execute(&sql, [])? as i64;
            out.push(ColumnCount {
                table: table.to_string(),
                column: column.to_string(),
                count,
            });
        }
        Ok(out)
    }
}
