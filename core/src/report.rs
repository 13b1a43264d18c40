//! Presentation of a `KpiReport`: plain-text tables and JSON.
//!
//! Undefined metrics render as `N/A`, never as `0`.

use crate::{error::KpiResult, kpi_engine::KpiReport};
use std::fmt::Write;

pub const NOT_APPLICABLE: &str = "N/A";

/// Attributed revenue: `1234.5` → `1.2k`, `999.5` → `999.50`.
/// The threshold applies to the value rounded to cents.
pub fn format_revenue(value: f64) -> String {
    let cents = (value * 100.0).round() / 100.0;
    if cents >= 1000.0 {
        format!("{:.1}k", value / 1000.0)
    } else {
        format!("{value:.2}")
    }
}

pub fn format_metric(value: Option<f64>) -> String {
    value.map_or_else(|| NOT_APPLICABLE.to_string(), |v| format!("{v:.2}"))
}

pub fn format_pct(value: Option<f64>) -> String {
    value.map_or_else(|| NOT_APPLICABLE.to_string(), |v| format!("{v:.2}%"))
}

pub fn to_json(report: &KpiReport) -> KpiResult<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Render the whole report as text sections.
pub fn render_text(report: &KpiReport) -> String {
    // Writing to a String cannot fail.
    let mut out = String::new();
    let _ = write_report(&mut out, report);
    out
}

fn write_report(out: &mut String, r: &KpiReport) -> std::fmt::Result {
    writeln!(out, "=== KPI REPORT ===")?;
    writeln!(out, "  as of:          {}", r.as_of)?;
    writeln!(out, "  snapshot:       #{} ({})", r.snapshot.id, r.snapshot.label)?;
    writeln!(out, "  campaigns:      {}", r.snapshot.campaign_rows)?;
    writeln!(out, "  events:         {}", r.snapshot.event_rows)?;
    writeln!(out, "  subscriptions:  {}", r.snapshot.subscription_rows)?;
    writeln!(out, "  price/meal:     {:.2}", r.config.price_per_meal)?;

    let v = &r.validation;
    writeln!(out)?;
    writeln!(out, "=== VALIDATION ===")?;
    writeln!(out, "  violations:     {}", v.violation_count())?;
    for m in &v.missing_required {
        writeln!(out, "  missing required ({}): {}", m.entity, m.rows)?;
    }
    writeln!(out, "  end < start:    {}", v.campaigns_ending_before_start.len())?;
    writeln!(out, "  future starts:  {}", v.campaigns_starting_in_future.len())?;
    for d in &v.duplicate_keys {
        writeln!(out, "  duplicate {} key '{}': {} rows", d.table, d.key, d.count)?;
    }
    writeln!(out, "  unknown campaign refs:     {}", v.events_with_unknown_campaign.len())?;
    writeln!(out, "  unknown subscription refs: {}", v.events_with_unknown_subscription.len())?;
    writeln!(out, "  empty-string artifacts:    {}", v.total_empty_string_artifacts())?;

    writeln!(out)?;
    writeln!(out, "=== CHANNELS ===")?;
    for c in &r.channel_summaries {
        writeln!(
            out,
            "  {} | campaigns: {} | cost avg {} sd {} | events/campaign avg {} | days avg {} | within budget {} | over {}",
            c.channel,
            c.campaign_count,
            format_metric(c.cost.mean),
            format_metric(c.cost.std_dev),
            format_metric(c.events_per_campaign.mean),
            format_metric(c.duration_days.mean),
            format_pct(c.pct_within_budget),
            format_pct(c.pct_over_budget),
        )?;
    }
    writeln!(
        out,
        "  duration/cost correlation: {} (n={})",
        format_metric(r.duration_cost_correlation.pearson_r),
        r.duration_cost_correlation.campaigns
    )?;

    writeln!(out)?;
    writeln!(out, "=== MONTHLY COST ===")?;
    for m in &r.monthly_cost {
        writeln!(
            out,
            "  {} | total {:.2} | moving avg {}",
            m.month,
            m.total_cost,
            format_metric(m.moving_average)
        )?;
    }

    writeln!(out)?;
    writeln!(out, "=== FUNNEL ===")?;
    for f in &r.event_funnel {
        writeln!(
            out,
            "  {} | impressions {} | clicks {} | page views {} | signups {} | subscribes {} | conversions {}",
            f.channel, f.impressions, f.clicks, f.page_views, f.signups, f.subscribes, f.conversions
        )?;
    }

    writeln!(out)?;
    writeln!(out, "=== SUBSCRIBER KPIs ===")?;
    for c in &r.churn_by_food_choice {
        writeln!(
            out,
            "  churn {} | {} of {} | {}",
            c.food_choice,
            c.churned,
            c.total,
            format_pct(c.churn_rate)
        )?;
    }
    for ret in &r.retention_by_start_year {
        writeln!(
            out,
            "  retention {} | {} of {} | {}",
            ret.year,
            ret.retained,
            ret.total,
            format_pct(ret.retention_rate)
        )?;
    }
    for g in &r.growth_by_year {
        writeln!(
            out,
            "  growth {} | {} subscribers | {}",
            g.year,
            g.subscribers,
            format_pct(g.growth_rate)
        )?;
    }
    writeln!(out, "  CAC:            {}", format_metric(r.cac.cac))?;
    writeln!(out, "  ARPU:           {}", format_metric(r.arpu.arpu))?;
    writeln!(out, "  lifespan weeks: {}", format_metric(r.lifespan.average_weeks))?;
    writeln!(out, "  CLV:            {}", format_metric(r.clv.clv))?;
    writeln!(out, "  CLV/CAC:        {}", format_metric(r.clv.clv_to_cac))?;

    writeln!(out)?;
    writeln!(out, "=== CONVERSION ===")?;
    for c in &r.conversion_by_channel {
        writeln!(
            out,
            "  {} | {} subscribes / {} clicks | {}",
            c.channel,
            c.subscribes,
            c.clicks,
            format_pct(c.conversion_rate)
        )?;
    }
    for c in &r.conversion_by_channel_audience {
        writeln!(
            out,
            "  {} × {} | {}",
            c.channel,
            c.target_audience.as_deref().unwrap_or(NOT_APPLICABLE),
            format_pct(c.conversion_rate)
        )?;
    }

    writeln!(out)?;
    writeln!(out, "=== ATTRIBUTED REVENUE ===")?;
    for c in &r.campaign_revenue {
        writeln!(
            out,
            "  {} {} | {} subscription(s) | {}",
            c.campaign_id,
            c.campaign_name.as_deref().unwrap_or(""),
            c.distinct_subscriptions,
            format_revenue(c.revenue)
        )?;
    }
    Ok(())
}
