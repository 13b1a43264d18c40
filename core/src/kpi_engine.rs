//! KPI engine — business metrics derived from one snapshot.
//!
//! Every KPI is a read-only pass over the loaded tables, parameterised by
//! `KpiConfig` (price per meal, revenue model, attribution policy) and an
//! explicit as-of date. A zero denominator yields `None`, never a panic and
//! never a silent zero.
//!
//! CLV is the product of two means, ARPU × mean lifespan, not the mean of
//! per-subscriber revenue × lifespan.
//!
//! Lifespan treats every active subscription as alive until the as-of date,
//! so recent cohorts pull the mean upward.

use crate::{
    aggregator::{Aggregator, ChannelFunnel, ChannelSummary, DurationCostCorrelation, MonthlyCost},
    clock::AsOf,
    config::{KpiConfig, RevenueModel, ValidationPolicy},
    error::{KpiError, KpiResult},
    model::EventType,
    stats,
    store::{EventTypeCountRow, KpiStore, SnapshotRecord},
    validator::{ValidationReport, Validator},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChurnRate {
    pub food_choice: String,
    pub total: i64,
    pub churned: i64,
    pub churn_rate: Option<f64>,
}

impl ChurnRate {
    pub fn from_counts(food_choice: impl Into<String>, total: i64, churned: i64) -> Self {
        Self {
            food_choice: food_choice.into(),
            total,
            churned,
            churn_rate: stats::percentage(churned, total),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetentionRate {
    pub year: i32,
    pub total: i64,
    pub retained: i64,
    pub retention_rate: Option<f64>,
}

impl RetentionRate {
    pub fn from_counts(year: i32, total: i64, churned: i64) -> Self {
        let retained = total - churned;
        Self {
            year,
            total,
            retained,
            retention_rate: stats::percentage(retained, total),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacSummary {
    pub total_budget: f64,
    pub subscribers: i64,
    pub cac: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArpuSummary {
    pub revenue_model: RevenueModel,
    pub price_per_meal: f64,
    /// Subscriptions with every count the revenue model needs.
    pub subscribers: i64,
    pub arpu: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LifespanSummary {
    pub as_of: AsOf,
    /// Subscriptions with a readable start date.
    pub subscribers: i64,
    pub average_weeks: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClvSummary {
    pub arpu: Option<f64>,
    pub average_lifespan_weeks: Option<f64>,
    pub clv: Option<f64>,
    pub cac: Option<f64>,
    pub clv_to_cac: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversionRate {
    pub channel: String,
    /// Present only in the channel × audience breakdown.
    pub target_audience: Option<String>,
    pub clicks: i64,
    pub subscribes: i64,
    pub conversion_rate: Option<f64>,
}

impl ConversionRate {
    pub fn from_counts(
        channel: impl Into<String>,
        target_audience: Option<String>,
        clicks: i64,
        subscribes: i64,
    ) -> Self {
        Self {
            channel: channel.into(),
            target_audience,
            clicks,
            subscribes,
            conversion_rate: stats::percentage(subscribes, clicks),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GrowthRate {
    pub year: i32,
    pub subscribers: i64,
    /// `None` for the first observed year.
    pub prior_year_subscribers: Option<i64>,
    pub growth_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignRevenue {
    pub campaign_id: String,
    pub campaign_name: Option<String>,
    pub channel: String,
    pub contributions: i64,
    pub distinct_subscriptions: i64,
    pub revenue: f64,
}

/// Everything computed for one snapshot at one as-of date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KpiReport {
    pub snapshot: SnapshotRecord,
    pub as_of: AsOf,
    pub config: KpiConfig,
    pub validation: ValidationReport,
    // Aggregates
    pub channel_summaries: Vec<ChannelSummary>,
    pub duration_cost_correlation: DurationCostCorrelation,
    pub monthly_cost: Vec<MonthlyCost>,
    pub event_funnel: Vec<ChannelFunnel>,
    // KPIs
    pub churn_by_food_choice: Vec<ChurnRate>,
    pub retention_by_start_year: Vec<RetentionRate>,
    pub cac: CacSummary,
    pub arpu: ArpuSummary,
    pub lifespan: LifespanSummary,
    pub clv: ClvSummary,
    pub conversion_by_channel: Vec<ConversionRate>,
    pub conversion_by_channel_audience: Vec<ConversionRate>,
    pub growth_by_year: Vec<GrowthRate>,
    pub campaign_revenue: Vec<CampaignRevenue>,
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub struct KpiEngine<'a> {
    config: &'a KpiConfig,
    store: &'a KpiStore,
}

impl<'a> KpiEngine<'a> {
    /// Configuration errors are fatal here, before anything is computed.
    pub fn new(config: &'a KpiConfig, store: &'a KpiStore) -> KpiResult<Self> {
        config.validate()?;
        Ok(Self { config, store })
    }

    /// Churned ÷ total × 100 per food choice.
    pub fn churn_by_food_choice(&self) -> KpiResult<Vec<ChurnRate>> {
        self.store.current_snapshot()?;
        Ok(self
            .store
            .subscription_counts_by_food_choice()?
            .into_iter()
            .map(|r| ChurnRate::from_counts(r.group, r.total, r.churned))
            .collect())
    }

    /// (total − churned) ÷ total × 100 per start year, chronological.
    pub fn retention_by_start_year(&self) -> KpiResult<Vec<RetentionRate>> {
        self.store.current_snapshot()?;
        Ok(self
            .store
            .subscription_counts_by_start_year()?
            .into_iter()
            .map(|r| RetentionRate::from_counts(r.year, r.total, r.churned))
            .collect())
    }

    /// Total campaign budget ÷ distinct subscriptions.
    pub fn cac(&self) -> KpiResult<CacSummary> {
        self.store.current_snapshot()?;
        let total_budget = self.store.total_campaign_budget()?;
        let subscribers = self.store.distinct_subscription_count()?;
        Ok(CacSummary {
            total_budget,
            subscribers,
            cac: stats::ratio(total_budget, subscribers as f64),
        })
    }

    /// Mean per-subscription revenue under the configured revenue model.
    pub fn arpu(&self) -> KpiResult<ArpuSummary> {
        self.store.current_snapshot()?;
        let (subscribers, arpu) = self
            .store
            .mean_subscription_revenue(self.config.revenue_model, self.config.price_per_meal)?;
        Ok(ArpuSummary {
            revenue_model: self.config.revenue_model,
            price_per_meal: self.config.price_per_meal,
            subscribers,
            arpu,
        })
    }

    /// Mean weeks from start to end date, or to `as_of` while active.
    pub fn average_lifespan(&self, as_of: AsOf) -> KpiResult<LifespanSummary> {
        self.store.current_snapshot()?;
        let (subscribers, average_weeks) = self.store.mean_subscription_lifespan_weeks(as_of)?;
        Ok(LifespanSummary {
            as_of,
            subscribers,
            average_weeks,
        })
    }

    /// ARPU × average lifespan, and its ratio to CAC.
    pub fn clv(&self, as_of: AsOf) -> KpiResult<ClvSummary> {
        let arpu = self.arpu()?;
        let lifespan = self.average_lifespan(as_of)?;
        let cac = self.cac()?;
        Ok(combine_clv(&arpu, &lifespan, &cac))
    }

    /// Subscribes ÷ clicks × 100 per channel.
    pub fn conversion_by_channel(&self) -> KpiResult<Vec<ConversionRate>> {
        self.store.current_snapshot()?;
        Ok(conversion_rates(&self.store.event_type_counts()?, false))
    }

    /// Subscribes ÷ clicks × 100 per channel × target audience.
    pub fn conversion_by_channel_audience(&self) -> KpiResult<Vec<ConversionRate>> {
        self.store.current_snapshot()?;
        Ok(conversion_rates(&self.store.event_type_counts()?, true))
    }

    /// Year-over-year growth of new subscriptions, chronological.
    pub fn growth_by_year(&self) -> KpiResult<Vec<GrowthRate>> {
        self.store.current_snapshot()?;
        let counts: Vec<(i32, i64)> = self
            .store
            .subscription_counts_by_start_year()?
            .into_iter()
            .map(|r| (r.year, r.total))
            .collect();
        Ok(growth_rates(&counts))
    }

    /// Revenue attributed to each campaign through its events.
    pub fn campaign_revenue(&self, as_of: AsOf) -> KpiResult<Vec<CampaignRevenue>> {
        self.store.current_snapshot()?;
        Ok(self
            .store
            .campaign_revenue_attribution(
                self.config.attribution,
                self.config.price_per_meal,
                as_of,
            )?
            .into_iter()
            .map(|r| CampaignRevenue {
                campaign_id: r.campaign_id,
                campaign_name: r.campaign_name,
                channel: r.channel,
                contributions: r.contributions,
                distinct_subscriptions: r.distinct_subscriptions,
                revenue: r.revenue,
            })
            .collect())
    }

    /// Validate, then compute every aggregate and KPI.
    ///
    /// Under `ValidationPolicy::Gate` any violation refuses the whole report;
    /// under `Report` the violations ride along in `validation`.
    pub fn report(&self, as_of: AsOf) -> KpiResult<KpiReport> {
        let snapshot = self.store.current_snapshot()?;
        let validation = Validator::new(self.store).validate(as_of)?;
        let violations = validation.violation_count();
        if violations > 0 {
            match self.config.validation_policy {
                ValidationPolicy::Gate => {
                    log::warn!("integrity gate: {violations} violation(s), report refused");
                    return Err(KpiError::IntegrityGate { violations });
                }
                ValidationPolicy::Report => {
                    log::warn!("{violations} integrity violation(s); computing anyway");
                }
            }
        }

        let aggregator = Aggregator::new(self.config, self.store);
        let arpu = self.arpu()?;
        let lifespan = self.average_lifespan(as_of)?;
        let cac = self.cac()?;
        let clv = combine_clv(&arpu, &lifespan, &cac);

        let report = KpiReport {
            snapshot,
            as_of,
            config: self.config.clone(),
            validation,
            channel_summaries: aggregator.channel_summaries()?,
            duration_cost_correlation: aggregator.duration_cost_correlation()?,
            monthly_cost: aggregator.monthly_cost_trend()?,
            event_funnel: aggregator.event_funnel()?,
            churn_by_food_choice: self.churn_by_food_choice()?,
            retention_by_start_year: self.retention_by_start_year()?,
            cac,
            arpu,
            lifespan,
            clv,
            conversion_by_channel: self.conversion_by_channel()?,
            conversion_by_channel_audience: self.conversion_by_channel_audience()?,
            growth_by_year: self.growth_by_year()?,
            campaign_revenue: self.campaign_revenue(as_of)?,
        };

        log::info!(
            "report as of {as_of}: snapshot {} ({} campaigns, {} events, {} subscriptions)",
            report.snapshot.id,
            report.snapshot.campaign_rows,
            report.snapshot.event_rows,
            report.snapshot.subscription_rows
        );
        Ok(report)
    }

    /// Persist a report as JSON next to the snapshot it was computed from.
    pub fn save_report(&self, report: &KpiReport) -> KpiResult<()> {
        let json = serde_json::to_string(report)?;
        self.store
            .save_report(report.snapshot.id, &report.as_of.iso(), &json)?;
        log::debug!("report saved for snapshot {}", report.snapshot.id);
        Ok(())
    }
}

// ── Pure helpers ─────────────────────────────────────────────────────────────

fn combine_clv(arpu: &ArpuSummary, lifespan: &LifespanSummary, cac: &CacSummary) -> ClvSummary {
    let clv = match (arpu.arpu, lifespan.average_weeks) {
        (Some(a), Some(w)) => Some(a * w),
        _ => None,
    };
    let clv_to_cac = match (clv, cac.cac) {
        (Some(v), Some(c)) => stats::ratio(v, c),
        _ => None,
    };
    ClvSummary {
        arpu: arpu.arpu,
        average_lifespan_weeks: lifespan.average_weeks,
        clv,
        cac: cac.cac,
        clv_to_cac,
    }
}

fn conversion_rates(
    rows: &[EventTypeCountRow],
    by_audience: bool,
) -> Vec<ConversionRate> {
    let mut cells: BTreeMap<(String, Option<String>), (i64, i64)> = BTreeMap::new();
    for row in rows {
        let audience = by_audience.then(|| row.target_audience.clone());
        let cell = cells.entry((row.channel.clone(), audience)).or_default();
        match EventType::parse(&row.event_type) {
            EventType::Click => cell.0 += row.events,
            EventType::Subscribe => cell.1 += row.events,
            _ => {}
        }
    }
    cells
        .into_iter()
        .map(|((channel, audience), (clicks, subscribes))| {
            ConversionRate::from_counts(channel, audience, clicks, subscribes)
        })
        .collect()
}

/// Growth per year, ascending. A year missing from the data between two
/// observed years counts as zero subscribers.
pub fn growth_rates(counts: &[(i32, i64)]) -> Vec<GrowthRate> {
    let by_year: BTreeMap<i32, i64> = counts.iter().copied().collect();
    let first_year = by_year.keys().next().copied();
    by_year
        .iter()
        .map(|(&year, &subscribers)| {
            let prior_year_subscribers = if Some(year) == first_year {
                None
            } else {
                Some(by_year.get(&(year - 1)).copied().unwrap_or(0))
            };
            let growth_rate = prior_year_subscribers.and_then(|prior| {
                stats::ratio((subscribers - prior) as f64, prior as f64).map(|r| r * 100.0)
            });
            GrowthRate {
                year,
                subscribers,
                prior_year_subscribers,
                growth_rate,
            }
        })
        .collect()
}
