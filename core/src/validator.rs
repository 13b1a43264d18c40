//! Validator — referential and domain integrity of a loaded snapshot.
//!
//! Every check runs on every call; none short-circuits another.
//! The validator never mutates data, with one exception:
//! `normalize_sentinels` rewrites empty-string date and foreign-key
//! cells to NULL.
//!
//! Violations are diagnostics. Whether they block KPI computation is
//! decided by `ValidationPolicy` in the KPI engine, not here.

use crate::{
    clock::AsOf,
    error::KpiResult,
    store::{ColumnCount, DanglingRef, DuplicateKey, KpiStore},
};
use serde::{Deserialize, Serialize};

/// Rows of one entity with a required field missing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityCount {
    pub entity: String,
    pub rows: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub as_of: AsOf,
    // Violations
    pub missing_required: Vec<EntityCount>,
    pub campaigns_ending_before_start: Vec<String>,
    pub campaigns_starting_in_future: Vec<String>,
    pub duplicate_keys: Vec<DuplicateKey>,
    pub events_with_unknown_campaign: Vec<DanglingRef>,
    pub events_with_unknown_subscription: Vec<DanglingRef>,
    pub malformed_dates: Vec<ColumnCount>,
    // Diagnostics (not violations)
    pub empty_string_artifacts: Vec<ColumnCount>,
    pub null_cells: Vec<ColumnCount>,
}

impl ValidationReport {
    /// Total number of violating rows/keys across all checks.
    /// Empty-string artifacts and NULL counts are not violations.
    pub fn violation_count(&self) -> i64 {
        let missing: i64 = self.missing_required.iter().map(|m| m.rows).sum();
        let malformed: i64 = self.malformed_dates.iter().map(|c| c.count).sum();
        missing
            + malformed
            + self.campaigns_ending_before_start.len() as i64
            + self.campaigns_starting_in_future.len() as i64
            + self.duplicate_keys.len() as i64
            + self.events_with_unknown_campaign.len() as i64
            + self.events_with_unknown_subscription.len() as i64
    }

    pub fn is_clean(&self) -> bool {
        self.violation_count() == 0
    }

    pub fn total_empty_string_artifacts(&self) -> i64 {
        self.empty_string_artifacts.iter().map(|c| c.count).sum()
    }

    pub fn total_null_cells(&self) -> i64 {
        self.null_cells.iter().map(|c| c.count).sum()
    }

    /// Duplicate keys of one entity.
    pub fn duplicates_in(&self, table: &str) -> Vec<&DuplicateKey> {
        self.duplicate_keys.iter().filter(|d| d.table == table).collect()
    }

    pub fn missing_required_in(&self, entity: &str) -> i64 {
        self.missing_required
            .iter()
            .find(|m| m.entity == entity)
            .map(|m| m.rows)
            .unwrap_or(0)
    }
}

pub struct Validator<'a> {
    store: &'a KpiStore,
}

impl<'a> Validator<'a> {
    pub fn new(store: &'a KpiStore) -> Self {
        Self { store }
    }

    /// Run every integrity check against the current tables.
    pub fn validate(&self, as_of: AsOf) -> KpiResult<ValidationReport> {
        let missing_required = self
            .store
            .rows_missing_required()?
            .into_iter()
            .map(|(entity, rows)| EntityCount { entity, rows })
            .collect();

        let report = ValidationReport {
            as_of,
            missing_required,
            campaigns_ending_before_start: self.store.campaigns_ending_before_start()?,
            campaigns_starting_in_future: self.store.campaigns_starting_after(as_of)?,
            duplicate_keys: self.store.duplicate_keys()?,
            events_with_unknown_campaign: self.store.events_with_unknown_campaign()?,
            events_with_unknown_subscription: self.store.events_with_unknown_subscription()?,
            malformed_dates: self.store.malformed_dates()?,
            empty_string_artifacts: self.store.empty_string_artifacts()?,
            null_cells: self.store.null_cells()?,
        };

        log_violations(&report);
        Ok(report)
    }

    /// Rewrite empty-string date and foreign-key cells to NULL.
    /// Returns the number of cells rewritten per column; a second call
    /// rewrites nothing.
    pub fn normalize_sentinels(&self) -> KpiResult<Vec<ColumnCount>> {
        let changed = self.store.normalize_empty_sentinels()?;
        let total: i64 = changed.iter().map(|c| c.count).sum();
        log::info!("normalized {total} empty-string sentinel cell(s) to NULL");
        Ok(changed)
    }
}

fn log_violations(report: &ValidationReport) {
    for m in report.missing_required.iter().filter(|m| m.rows > 0) {
        log::warn!("{}: {} row(s) missing a required field", m.entity, m.rows);
    }
    for id in &report.campaigns_ending_before_start {
        log::warn!("campaign {id}: end_date before start_date");
    }
    for id in &report.campaigns_starting_in_future {
        log::warn!("campaign {id}: start_date after {}", report.as_of);
    }
    for d in &report.duplicate_keys {
        log::warn!("{}: key '{}' appears {} times", d.table, d.key, d.count);
    }
    for r in &report.events_with_unknown_campaign {
        log::warn!("event {}: unknown campaign '{}'", r.event_id, r.reference);
    }
    for r in &report.events_with_unknown_subscription {
        log::warn!("event {}: unknown subscription '{}'", r.event_id, r.reference);
    }
    for c in report.malformed_dates.iter().filter(|c| c.count > 0) {
        log::warn!("{}.{}: {} unparseable date(s)", c.table, c.column, c.count);
    }
    log::debug!(
        "validation: {} violation(s), {} empty-string artifact(s), {} NULL cell(s)",
        report.violation_count(),
        report.total_empty_string_artifacts(),
        report.total_null_cells()
    );
}
