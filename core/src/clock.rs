//! Report clock — the explicit "as-of" date every time-relative KPI uses.
//!
//! RULE: No KPI reads the wall clock.
//! Churn, lifespan and future-date checks resolve "now" through an
//! `AsOf` value passed in by the caller.

use crate::error::{KpiError, KpiResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DAYS_PER_WEEK: f64 = 7.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct AsOf(NaiveDate);

impl AsOf {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Parse an ISO 8601 calendar date (`YYYY-MM-DD`).
    pub fn parse(value: &str) -> KpiResult<Self> {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .map(Self)
            .map_err(|_| KpiError::InvalidAsOf { value: value.to_string() })
    }

    /// ISO form bound into SQL parameters.
    pub fn iso(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }
}

impl std::fmt::Display for AsOf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.iso())
    }
}
