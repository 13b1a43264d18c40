//! Aggregator — grouped descriptive statistics over campaigns and events.
//!
//! Per channel: campaign count, cost / events-per-campaign / duration
//! summaries, and budget compliance. Globally: duration–cost correlation,
//! the monthly cost trend, and the event funnel.
//!
//! Standard deviations use the population formula `sqrt(E[X²] − E[X]²)`.

use crate::{
    config::KpiConfig,
    error::KpiResult,
    model::EventType,
    stats::{self, PairSums},
    store::{EventTypeCountRow, KpiStore, MomentsRow},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NumericSummary {
    /// Values contributing to the summary.
    pub count: i64,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub std_dev: Option<f64>,
}

impl NumericSummary {
    fn from_moments(row: &MomentsRow, epsilon: f64) -> Self {
        let std_dev = match (row.mean, row.mean_of_squares) {
            (Some(mean), Some(mean_sq)) => stats::population_std_dev(mean, mean_sq, epsilon),
            _ => None,
        };
        Self {
            count: row.n,
            mean: row.mean,
            min: row.min,
            max: row.max,
            std_dev,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelSummary {
    pub channel: String,
    pub campaign_count: i64,
    pub cost: NumericSummary,
    pub events_per_campaign: NumericSummary,
    pub duration_days: NumericSummary,
    pub within_budget: i64,
    pub over_budget: i64,
    /// Campaigns lacking a cost or a budget; excluded from the percentages.
    pub budget_unknown: i64,
    pub pct_within_budget: Option<f64>,
    pub pct_over_budget: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyCost {
    pub month: String,
    pub campaigns: i64,
    pub total_cost: f64,
    /// Trailing average of `total_cost` over the configured window.
    pub moving_average: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DurationCostCorrelation {
    pub campaigns: i64,
    pub pearson_r: Option<f64>,
}

/// Event counts per funnel stage for one channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChannelFunnel {
    pub channel: String,
    pub impressions: i64,
    pub clicks: i64,
    pub page_views: i64,
    pub signups: i64,
    pub subscribes: i64,
    pub conversions: i64,
    /// Events whose type is not one of the known stages.
    pub other: i64,
}

impl ChannelFunnel {
    fn add(&mut self, event_type: &str, events: i64) {
        match EventType::parse(event_type) {
            EventType::Impression => self.impressions += events,
            EventType::Click => self.clicks += events,
            EventType::PageView => self.page_views += events,
            EventType::Signup => self.signups += events,
            EventType::Subscribe => self.subscribes += events,
            EventType::Conversion => self.conversions += events,
            EventType::Other(_) => self.other += events,
        }
    }
}

pub struct Aggregator<'a> {
    config: &'a KpiConfig,
    store: &'a KpiStore,
}

impl<'a> Aggregator<'a> {
    pub fn new(config: &'a KpiConfig, store: &'a KpiStore) -> Self {
        Self { config, store }
    }

    /// One summary row per channel, alphabetical.
    pub fn channel_summaries(&self) -> KpiResult<Vec<ChannelSummary>> {
        self.store.current_snapshot()?;
        let epsilon = self.config.stddev_epsilon;
        let cost = index_moments(self.store.campaign_cost_moments_by_channel()?);
        let events = index_moments(self.store.events_per_campaign_moments_by_channel()?);
        let duration = index_moments(self.store.campaign_duration_moments_by_channel()?);
        let budget = self.store.budget_compliance_by_channel()?;

        let summaries = budget
            .into_iter()
            .map(|b| {
                let summary_of = |index: &BTreeMap<String, MomentsRow>| {
                    index
                        .get(&b.channel)
                        .map(|row| NumericSummary::from_moments(row, epsilon))
                        .unwrap_or_default()
                };
                let known = b.within_budget + b.over_budget;
                ChannelSummary {
                    campaign_count: cost.get(&b.channel).map(|r| r.rows).unwrap_or(0),
                    cost: summary_of(&cost),
                    events_per_campaign: summary_of(&events),
                    duration_days: summary_of(&duration),
                    within_budget: b.within_budget,
                    over_budget: b.over_budget,
                    budget_unknown: b.unknown,
                    pct_within_budget: stats::percentage(b.within_budget, known),
                    pct_over_budget: stats::percentage(b.over_budget, known),
                    channel: b.channel,
                }
            })
            .collect();
        Ok(summaries)
    }

    /// Population Pearson correlation of campaign duration (days) and cost.
    pub fn duration_cost_correlation(&self) -> KpiResult<DurationCostCorrelation> {
        self.store.current_snapshot()?;
        let sums: PairSums = self.store.duration_cost_sums()?;
        Ok(DurationCostCorrelation {
            campaigns: sums.n,
            pearson_r: stats::pearson(&sums),
        })
    }

    /// Total cost per calendar month of campaign start, with a trailing average.
    pub fn monthly_cost_trend(&self) -> KpiResult<Vec<MonthlyCost>> {
        self.store.current_snapshot()?;
        let rows = self.store.monthly_campaign_cost()?;
        let totals: Vec<f64> = rows.iter().map(|r| r.total_cost).collect();
        let averages =
            stats::trailing_moving_average(&totals, self.config.moving_average_window);
        Ok(rows
            .into_iter()
            .zip(averages)
            .map(|(row, moving_average)| MonthlyCost {
                month: row.month,
                campaigns: row.campaigns,
                total_cost: row.total_cost,
                moving_average,
            })
            .collect())
    }

    /// Funnel stage counts per channel, alphabetical.
    pub fn event_funnel(&self) -> KpiResult<Vec<ChannelFunnel>> {
        self.store.current_snapshot()?;
        Ok(funnel_by_channel(&self.store.event_type_counts()?))
    }
}

fn index_moments(rows: Vec<MomentsRow>) -> BTreeMap<String, MomentsRow> {
    rows.into_iter().map(|r| (r.group.clone(), r)).collect()
}

fn funnel_by_channel(rows: &[EventTypeCountRow]) -> Vec<ChannelFunnel> {
    let mut by_channel: BTreeMap<&str, ChannelFunnel> = BTreeMap::new();
    for row in rows {
        by_channel
            .entry(row.channel.as_str())
            .or_insert_with(|| ChannelFunnel {
                channel: row.channel.clone(),
                ..ChannelFunnel::default()
            })
            .add(&row.event_type, row.events);
    }
    by_channel.into_values().collect()
}
