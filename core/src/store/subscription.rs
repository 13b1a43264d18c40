use super::{group_key, present, KpiStore};
use crate::{
    clock::{AsOf, DAYS_PER_WEEK},
    config::{AttributionPolicy, RevenueModel},
    error::KpiResult,
    model::Subscription,
};
use rusqlite::params;

/// Subscription totals for one categorical group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupCountRow {
    pub group: String,
    pub total: i64,
    pub churned: i64,
}

/// Subscription totals for one start year.
#[derive(Debug, Clone, PartialEq)]
pub struct YearCountRow {
    pub year: i32,
    pub total: i64,
    pub churned: i64,
}

/// Revenue attributed to one campaign row.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributionRow {
    pub campaign_id: String,
    pub campaign_name: Option<String>,
    pub channel: String,
    /// Joined (event, subscription) contributions summed.
    pub contributions: i64,
    pub distinct_subscriptions: i64,
    pub revenue: f64,
}

/// 1 when the subscription has an end date, else 0.
fn churned_flag() -> String {
    format!("CASE WHEN {} IS NOT NULL THEN 1 ELSE 0 END", present("end_date"))
}

/// Weeks between start and end date, with an absent end date read as `?as_of`.
/// `alias` qualifies the subscription columns.
fn lifespan_weeks(alias: &str, as_of_param: &str) -> String {
    format!(
        "((julianday(COALESCE({end}, {as_of_param})) - julianday({alias}.start_date)) / {DAYS_PER_WEEK:.1})",
        end = present(&format!("{alias}.end_date")),
    )
}

impl KpiStore {
    // ── Subscription rows ──────────────────────────────────────

    pub fn insert_subscription(&self, s: &Subscription) -> KpiResult<()> {
        self.conn.execute(
            "INSERT INTO subscription (
                subscription_id, start_date, end_date, n_meals, n_people, n_orders, food_choice
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &s.subscription_id,
                &s.start_date,
                &s.end_date,
                s.n_meals,
                s.n_people,
                s.n_orders,
                &s.food_choice,
            ],
        )?;
        Ok(())
    }

    pub fn subscriptions(&self) -> KpiResult<Vec<Subscription>> {
        let mut stmt = self.conn.prepare(
            "SELECT subscription_id, start_date, end_date, n_meals, n_people, n_orders, food_choice
             FROM subscription ORDER BY rowid ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Subscription {
                    subscription_id: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    start_date: row.get(1)?,
                    end_date: row.get(2)?,
                    n_meals: row.get(3)?,
                    n_people: row.get(4)?,
                    n_orders: row.get(5)?,
                    food_choice: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn subscription_count(&self) -> KpiResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM subscription", [], |row| row.get(0))
            .map_err(Into::into)
    }

    /// Distinct non-empty subscription ids.
    pub fn distinct_subscription_count(&self) -> KpiResult<i64> {
        let sql = format!(
            "SELECT COUNT(DISTINCT {id}) FROM subscription",
            id = present("subscription_id"),
        );
        self.conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(Into::into)
    }

    // ── Churn / retention inputs ───────────────────────────────

    pub fn subscription_counts_by_food_choice(&self) -> KpiResult<Vec<GroupCountRow>> {
        let sql = format!(
            "SELECT {key} AS food_key, COUNT(*), SUM({churned})
             FROM subscription
             GROUP BY food_key
             ORDER BY food_key ASC",
            key = group_key("food_choice"),
            churned = churned_flag(),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(GroupCountRow {
                    group: row.get(0)?,
                    total: row.get(1)?,
                    churned: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Totals per start year, ascending. Unparseable start dates are left out.
    pub fn subscription_counts_by_start_year(&self) -> KpiResult<Vec<YearCountRow>> {
        let sql = format!(
            "SELECT CAST(strftime('%Y', start_date) AS INTEGER) AS start_year,
                    COUNT(*), SUM({churned})
             FROM subscription
             WHERE strftime('%Y', start_date) IS NOT NULL
             GROUP BY start_year
             ORDER BY start_year ASC",
            churned = churned_flag(),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(YearCountRow {
                    year: row.get(0)?,
                    total: row.get(1)?,
                    churned: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Revenue inputs ─────────────────────────────────────────

    /// Mean per-subscription revenue and the number of rows it covers.
    /// Rows missing any count of the chosen model are left out.
    pub fn mean_subscription_revenue(
        &self,
        model: RevenueModel,
        price_per_meal: f64,
    ) -> KpiResult<(i64, Option<f64>)> {
        let sql = format!(
            "SELECT COUNT(r), AVG(r)
             FROM (SELECT {units} * ?1 AS r FROM subscription s)",
            units = model.unit_sql(),
        );
        self.conn
            .query_row(&sql, params![price_per_meal], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .map_err(Into::into)
    }

    /// Mean lifespan in weeks; active subscriptions live until `as_of`.
    pub fn mean_subscription_lifespan_weeks(&self, as_of: AsOf) -> KpiResult<(i64, Option<f64>)> {
        let sql = format!(
            "SELECT COUNT(w), AVG(w) FROM (SELECT {weeks} AS w FROM subscription s)",
            weeks = lifespan_weeks("s", "?1"),
        );
        self.conn
            .query_row(&sql, params![as_of.iso()], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .map_err(Into::into)
    }

    /// people × meals × price × lifespan-weeks, summed per campaign row.
    /// Campaigns with no attributed subscription report zero revenue.
    /// `PerEvent` keeps the raw join, duplicate rows on either side included.
    pub fn campaign_revenue_attribution(
        &self,
        policy: AttributionPolicy,
        price_per_meal: f64,
        as_of: AsOf,
    ) -> KpiResult<Vec<AttributionRow>> {
        // Distinct attribution also reads only the first row of a
        // duplicated subscription id, so a subscription counts once.
        let (links, subscriptions) = match policy {
            AttributionPolicy::DistinctSubscription => (
                "SELECT DISTINCT campaign_id, subscription_id FROM event",
                "SELECT * FROM subscription
                 WHERE rowid IN (SELECT MIN(rowid) FROM subscription GROUP BY subscription_id)",
            ),
            AttributionPolicy::PerEvent => (
                "SELECT campaign_id, subscription_id FROM event",
                "SELECT * FROM subscription",
            ),
        };
        let sql = format!(
            "SELECT c.campaign_id, c.campaign_name, {channel},
                    COUNT(x.sid), COUNT(DISTINCT x.sid), TOTAL(x.revenue)
             FROM campaign c
             LEFT JOIN (
                 SELECT l.campaign_id AS cid,
                        s.subscription_id AS sid,
                        s.n_people * s.n_meals * ?1 * {weeks} AS revenue
                 FROM ({links}) l
                 JOIN ({subscriptions}) s ON s.subscription_id = l.subscription_id
                 WHERE {link_sid} IS NOT NULL
             ) x ON x.cid = c.campaign_id
             GROUP BY c.rowid
             ORDER BY c.campaign_id ASC, c.rowid ASC",
            channel = group_key("c.channel"),
            weeks = lifespan_weeks("s", "?2"),
            link_sid = present("l.subscription_id"),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![price_per_meal, as_of.iso()], |row| {
                Ok(AttributionRow {
                    campaign_id: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    campaign_name: row.get(1)?,
                    channel: row.get(2)?,
                    contributions: row.get(3)?,
                    distinct_subscriptions: row.get(4)?,
                    revenue: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
