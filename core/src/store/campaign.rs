use super::{group_key, KpiStore};
use crate::{error::KpiResult, model::Campaign, stats::PairSums};
use rusqlite::params;

/// First and second moments of one numeric column within a group.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentsRow {
    pub group: String,
    /// Rows in the group, with or without a value.
    pub rows: i64,
    /// Rows contributing a value.
    pub n: i64,
    pub mean: Option<f64>,
    pub mean_of_squares: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetRow {
    pub channel: String,
    pub within_budget: i64,
    pub over_budget: i64,
    /// Campaigns lacking either cost or budget.
    pub unknown: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyCostRow {
    /// `YYYY-MM` of the campaign start date.
    pub month: String,
    pub campaigns: i64,
    pub total_cost: f64,
}

/// Campaign duration in days, NULL when either date is missing or unparseable.
const DURATION_DAYS: &str = "(julianday(end_date) - julianday(start_date))";

impl KpiStore {
    // ── Campaign rows ──────────────────────────────────────────

    pub fn insert_campaign(&self, c: &Campaign) -> KpiResult<()> {
        self.conn.execute(
            "INSERT INTO campaign (
                campaign_id, campaign_name, campaign_description, start_date, end_date,
                budget, target_audience, channel, total_cost
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &c.campaign_id,
                &c.campaign_name,
                &c.campaign_description,
                &c.start_date,
                &c.end_date,
                c.budget,
                &c.target_audience,
                &c.channel,
                c.total_cost,
            ],
        )?;
        Ok(())
    }

    pub fn campaigns(&self) -> KpiResult<Vec<Campaign>> {
        let mut stmt = self.conn.prepare(
            "SELECT campaign_id, campaign_name, campaign_description, start_date, end_date,
                    budget, target_audience, channel, total_cost
             FROM campaign ORDER BY rowid ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Campaign {
                    campaign_id: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    campaign_name: row.get(1)?,
                    campaign_description: row.get(2)?,
                    start_date: row.get(3)?,
                    end_date: row.get(4)?,
                    budget: row.get(5)?,
                    target_audience: row.get(6)?,
                    channel: row.get(7)?,
                    total_cost: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn campaign_count(&self) -> KpiResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM campaign", [], |row| row.get(0))
            .map_err(Into::into)
    }

    /// Sum of all campaign budgets. Missing budgets contribute nothing.
    pub fn total_campaign_budget(&self) -> KpiResult<f64> {
        self.conn
            .query_row("SELECT TOTAL(budget) FROM campaign", [], |row| row.get(0))
            .map_err(Into::into)
    }

    // ── Per-channel aggregates ─────────────────────────────────

    pub fn campaign_cost_moments_by_channel(&self) -> KpiResult<Vec<MomentsRow>> {
        self.moments_by_channel("total_cost")
    }

    pub fn campaign_duration_moments_by_channel(&self) -> KpiResult<Vec<MomentsRow>> {
        self.moments_by_channel(DURATION_DAYS)
    }

    /// Events per campaign, including campaigns with no events (count 0).
    pub fn events_per_campaign_moments_by_channel(&self) -> KpiResult<Vec<MomentsRow>> {
        let sql = format!(
            "SELECT channel_key, COUNT(*), COUNT(n), AVG(n), AVG(n * n), MIN(n), MAX(n)
             FROM (
                 SELECT {key} AS channel_key,
                        (SELECT COUNT(*) FROM event e WHERE e.campaign_id = c.campaign_id) AS n
                 FROM campaign c
             )
             GROUP BY channel_key
             ORDER BY channel_key ASC",
            key = group_key("c.channel"),
        );
        self.query_moments(&sql)
    }

    fn moments_by_channel(&self, value_expr: &str) -> KpiResult<Vec<MomentsRow>> {
        let sql = format!(
            "SELECT channel_key, COUNT(*), COUNT(v), AVG(v), AVG(v * v), MIN(v), MAX(v)
             FROM (SELECT {key} AS channel_key, {value_expr} AS v FROM campaign)
             GROUP BY channel_key
             ORDER BY channel_key ASC",
            key = group_key("channel"),
        );
        self.query_moments(&sql)
    }

    fn query_moments(&self, sql: &str) -> KpiResult<Vec<MomentsRow>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(MomentsRow {
                    group: row.get(0)?,
                    rows: row.get(1)?,
                    n: row.get(2)?,
                    mean: row.get(3)?,
                    mean_of_squares: row.get(4)?,
                    min: row.get(5)?,
                    max: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Cost ≤ budget counts as within budget; cost > budget as over.
    pub fn budget_compliance_by_channel(&self) -> KpiResult<Vec<BudgetRow>> {
        let sql = format!(
            "SELECT {key} AS channel_key,
                    SUM(CASE WHEN total_cost IS NOT NULL AND budget IS NOT NULL
                              AND total_cost <= budget THEN 1 ELSE 0 END),
                    SUM(CASE WHEN total_cost IS NOT NULL AND budget IS NOT NULL
                              AND total_cost > budget THEN 1 ELSE 0 END),
                    SUM(CASE WHEN total_cost IS NULL OR budget IS NULL THEN 1 ELSE 0 END)
             FROM campaign
             GROUP BY channel_key
             ORDER BY channel_key ASC",
            key = group_key("channel"),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(BudgetRow {
                    channel: row.get(0)?,
                    within_budget: row.get(1)?,
                    over_budget: row.get(2)?,
                    unknown: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Total cost per calendar month of campaign start, chronological.
    /// Campaigns with an unparseable start date are left out.
    pub fn monthly_campaign_cost(&self) -> KpiResult<Vec<MonthlyCostRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT strftime('%Y-%m', start_date) AS month, COUNT(*), TOTAL(total_cost)
             FROM campaign
             WHERE strftime('%Y-%m', start_date) IS NOT NULL
             GROUP BY month
             ORDER BY month ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(MonthlyCostRow {
                    month: row.get(0)?,
                    campaigns: row.get(1)?,
                    total_cost: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Sums over campaigns having both a duration (x) and a cost (y).
    pub fn duration_cost_sums(&self) -> KpiResult<PairSums> {
        let sql = format!(
            "SELECT COUNT(*), TOTAL(x), TOTAL(y), TOTAL(x * y), TOTAL(x * x), TOTAL(y * y)
             FROM (SELECT {DURATION_DAYS} AS x, total_cost AS y FROM campaign)
             WHERE x IS NOT NULL AND y IS NOT NULL"
        );
        let sums = self.conn.query_row(&sql, [], |row| {
            Ok(PairSums {
                n: row.get(0)?,
                sum_x: row.get(1)?,
                sum_y: row.get(2)?,
                sum_xy: row.get(3)?,
                sum_xx: row.get(4)?,
                sum_yy: row.get(5)?,
            })
        })?;
        Ok(sums)
    }
}
