use campaign_kpi_core::{
    aggregator::Aggregator,
    config::KpiConfig,
    error::KpiError,
    loader::SnapshotLoader,
    model::{Campaign, Event, Subscription},
    store::KpiStore,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn store() -> KpiStore {
    let store = KpiStore::in_memory().unwrap();
    store.migrate().unwrap();
    store
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

fn campaign(id: &str, channel: &str, start: &str, end: &str, budget: f64, cost: f64) -> Campaign {
    Campaign {
        campaign_id: id.into(),
        campaign_name: Some(format!("Campaign {id}")),
        campaign_description: Some(String::new()),
        start_date: Some(start.into()),
        end_date: Some(end.into()),
        budget: Some(budget),
        target_audience: Some("families".into()),
        channel: Some(channel.into()),
        total_cost: Some(cost),
    }
}

fn event(id: &str, campaign_id: &str, event_type: &str, channel: &str) -> Event {
    Event {
        event_id: id.into(),
        campaign_id: Some(campaign_id.into()),
        subscription_id: Some(String::new()),
        event_type: Some(event_type.into()),
        event_date: Some("2024-01-05".into()),
        channel: Some(channel.into()),
    }
}

fn load(store: &KpiStore, campaigns: &[Campaign], events: &[Event]) {
    let subs: [Subscription; 0] = [];
    SnapshotLoader::commit(store, "agg", campaigns, events, &subs).unwrap();
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// Three paid-search campaigns with costs 80, 100 and 120 against a 100 budget.
/// Mean cost is 100, population sd is sqrt(800/3), two are within budget and one is over.
#[test]
fn budget_compliance_and_cost_summary_per_channel() {
    let store = store();
    load(
        &store,
        &[
            campaign("C1", "paid_search", "2024-01-01", "2024-01-11", 100.0, 80.0),
            campaign("C2", "paid_search", "2024-02-01", "2024-02-11", 100.0, 100.0),
            campaign("C3", "paid_search", "2024-03-01", "2024-03-11", 100.0, 120.0),
        ],
        &[],
    );
    let config = KpiConfig::default();

    let summaries = Aggregator::new(&config, &store).channel_summaries().unwrap();

    assert_eq!(summaries.len(), 1);
    let s = &summaries[0];
    assert_eq!(s.channel, "paid_search");
    assert_eq!(s.campaign_count, 3);
    assert!(close(s.cost.mean.unwrap(), 100.0));
    assert_eq!(s.cost.min, Some(80.0));
    assert_eq!(s.cost.max, Some(120.0));
    assert!(close(s.cost.std_dev.unwrap(), (800.0_f64 / 3.0).sqrt()));
    assert_eq!(s.within_budget, 2);
    assert_eq!(s.over_budget, 1);
    assert!(close(s.pct_within_budget.unwrap(), 66.666_666_7));
    assert!(close(s.pct_over_budget.unwrap(), 33.333_333_3));
    assert!(close(s.duration_days.mean.unwrap(), 10.0));
}

/// Identical costs give a standard deviation of exactly zero, not rounding noise.
#[test]
fn identical_costs_have_zero_spread() {
    let store = store();
    load(
        &store,
        &[
            campaign("C1", "email", "2024-01-01", "2024-01-11", 1.0, 0.1),
            campaign("C2", "email", "2024-01-01", "2024-01-11", 1.0, 0.1),
            campaign("C3", "email", "2024-01-01", "2024-01-11", 1.0, 0.1),
        ],
        &[],
    );
    let config = KpiConfig::default();

    let summaries = Aggregator::new(&config, &store).channel_summaries().unwrap();

    assert_eq!(summaries[0].cost.std_dev, Some(0.0));
    assert_eq!(summaries[0].duration_days.std_dev, Some(0.0));
}

/// Costs of 1 000 000 and 1 000 020 differ by 20, so the population sd is 10.
/// Large magnitudes must not flatten a real spread to zero.
#[test]
fn large_nearly_equal_costs_keep_their_spread() {
    let store = store();
    load(
        &store,
        &[
            campaign("C1", "tv", "2024-01-01", "2024-01-11", 2_000_000.0, 1_000_000.0),
            campaign("C2", "tv", "2024-01-01", "2024-01-11", 2_000_000.0, 1_000_020.0),
        ],
        &[],
    );
    let config = KpiConfig::default();

    let s = &Aggregator::new(&config, &store).channel_summaries().unwrap()[0];

    let sd = s.cost.std_dev.unwrap();
    assert!((sd - 10.0).abs() < 1e-3, "cost std dev = {sd}");
}

/// A campaign without cost counts toward the channel but not the cost summary.
/// Its budget compliance is unknown.
#[test]
fn missing_cost_is_budget_unknown() {
    let store = store();
    let mut no_cost = campaign("C2", "radio", "2024-01-01", "2024-01-11", 100.0, 0.0);
    no_cost.total_cost = None;
    load(
        &store,
        &[
            campaign("C1", "radio", "2024-01-01", "2024-01-11", 100.0, 50.0),
            no_cost,
        ],
        &[],
    );
    let config = KpiConfig::default();

    let s = &Aggregator::new(&config, &store).channel_summaries().unwrap()[0];

    assert_eq!(s.campaign_count, 2);
    assert_eq!(s.cost.count, 1);
    assert_eq!(s.budget_unknown, 1);
    assert_eq!(s.pct_within_budget, Some(100.0));
}

/// Campaigns with no events contribute a zero to events per campaign.
#[test]
fn events_per_campaign_counts_campaigns_without_events() {
    let store = store();
    load(
        &store,
        &[
            campaign("C1", "facebook", "2024-01-01", "2024-01-11", 100.0, 90.0),
            campaign("C2", "facebook", "2024-01-01", "2024-01-11", 100.0, 90.0),
            campaign("C3", "facebook", "2024-01-01", "2024-01-11", 100.0, 90.0),
        ],
        &[
            event("E1", "C1", "impression", "facebook"),
            event("E2", "C1", "click", "facebook"),
            event("E3", "C3", "impression", "facebook"),
        ],
    );
    let config = KpiConfig::default();

    let s = &Aggregator::new(&config, &store).channel_summaries().unwrap()[0];

    assert_eq!(s.events_per_campaign.count, 3);
    assert!(close(s.events_per_campaign.mean.unwrap(), 1.0));
    assert_eq!(s.events_per_campaign.min, Some(0.0));
    assert_eq!(s.events_per_campaign.max, Some(2.0));
}

/// Blank and absent channels are grouped together under `unknown`.
#[test]
fn missing_channel_groups_as_unknown() {
    let store = store();
    let mut blank = campaign("C2", "", "2024-01-01", "2024-01-11", 100.0, 90.0);
    blank.channel = Some("  ".into());
    let mut absent = campaign("C3", "", "2024-01-01", "2024-01-11", 100.0, 90.0);
    absent.channel = None;
    load(
        &store,
        &[
            campaign("C1", "email", "2024-01-01", "2024-01-11", 100.0, 90.0),
            blank,
            absent,
        ],
        &[],
    );
    let config = KpiConfig::default();

    let summaries = Aggregator::new(&config, &store).channel_summaries().unwrap();
    let channels: Vec<&str> = summaries.iter().map(|s| s.channel.as_str()).collect();

    assert_eq!(channels, vec!["email", "unknown"]);
    assert_eq!(summaries[1].campaign_count, 2);
}

/// Cost rising linearly with duration gives a Pearson r of 1.
#[test]
fn duration_and_cost_correlate_perfectly() {
    let store = store();
    load(
        &store,
        &[
            campaign("C1", "email", "2024-01-01", "2024-01-11", 500.0, 100.0),
            campaign("C2", "email", "2024-01-01", "2024-01-21", 500.0, 200.0),
            campaign("C3", "email", "2024-01-01", "2024-01-31", 500.0, 300.0),
        ],
        &[],
    );
    let config = KpiConfig::default();

    let corr = Aggregator::new(&config, &store)
        .duration_cost_correlation()
        .unwrap();

    assert_eq!(corr.campaigns, 3);
    assert!(close(corr.pearson_r.unwrap(), 1.0));
}

/// With constant cost the correlation is undefined, not zero.
#[test]
fn correlation_without_cost_variance_is_absent() {
    let store = store();
    load(
        &store,
        &[
            campaign("C1", "email", "2024-01-01", "2024-01-11", 500.0, 100.0),
            campaign("C2", "email", "2024-01-01", "2024-01-21", 500.0, 100.0),
        ],
        &[],
    );
    let config = KpiConfig::default();

    let corr = Aggregator::new(&config, &store)
        .duration_cost_correlation()
        .unwrap();

    assert_eq!(corr.campaigns, 2);
    assert_eq!(corr.pearson_r, None);
}

/// Monthly totals carry a three-month moving average once three months exist.
#[test]
fn monthly_trend_carries_trailing_average() {
    let store = store();
    load(
        &store,
        &[
            campaign("C1", "email", "2024-01-05", "2024-01-20", 500.0, 100.0),
            campaign("C2", "email", "2024-02-05", "2024-02-20", 500.0, 200.0),
            campaign("C3", "email", "2024-03-05", "2024-03-20", 500.0, 100.0),
            campaign("C4", "radio", "2024-03-10", "2024-03-25", 500.0, 200.0),
        ],
        &[],
    );
    let config = KpiConfig::default();

    let trend = Aggregator::new(&config, &store).monthly_cost_trend().unwrap();

    let months: Vec<&str> = trend.iter().map(|m| m.month.as_str()).collect();
    assert_eq!(months, vec!["2024-01", "2024-02", "2024-03"]);
    assert_eq!(trend[2].campaigns, 2);
    assert!(close(trend[2].total_cost, 300.0));
    assert_eq!(trend[0].moving_average, None);
    assert_eq!(trend[1].moving_average, None);
    assert!(close(trend[2].moving_average.unwrap(), 200.0));
}

/// Event types match case-insensitively after trimming.
/// Unrecognised types land in `other`.
#[test]
fn funnel_matches_event_types_loosely() {
    let store = store();
    load(
        &store,
        &[campaign("C1", "facebook", "2024-01-01", "2024-01-11", 100.0, 90.0)],
        &[
            event("E1", "C1", "impression", "facebook"),
            event("E2", "C1", " Click ", "facebook"),
            event("E3", "C1", "CLICK", "facebook"),
            event("E4", "C1", "subscribe", "facebook"),
            event("E5", "C1", "hover", "facebook"),
            event("E6", "C1", "impression", ""),
        ],
    );
    let config = KpiConfig::default();

    let funnel = Aggregator::new(&config, &store).event_funnel().unwrap();

    assert_eq!(funnel.len(), 2);
    let fb = &funnel[0];
    assert_eq!(fb.channel, "facebook");
    assert_eq!(fb.impressions, 1);
    assert_eq!(fb.clicks, 2);
    assert_eq!(fb.subscribes, 1);
    assert_eq!(fb.other, 1);
    assert_eq!(funnel[1].channel, "unknown");
    assert_eq!(funnel[1].impressions, 1);
}

/// Aggregation refuses to run before any snapshot is committed.
#[test]
fn aggregates_require_a_snapshot() {
    let store = store();
    let config = KpiConfig::default();

    let err = Aggregator::new(&config, &store)
        .channel_summaries()
        .unwrap_err();

    assert!(matches!(err, KpiError::SnapshotNotLoaded));
}
