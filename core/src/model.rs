//! Data model — the three snapshot entities.
//!
//! Rows mirror the latest schema revision: events reference a
//! subscription (not a raw customer/lead id), and campaigns may or may
//! not carry `total_cost`.
//!
//! Text fields keep the exact cell content, so an empty CSV cell stays
//! `Some("")` until `Validator::normalize_sentinels` rewrites it.

use crate::types::{CampaignId, EventId, SubscriptionId};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Campaign {
    pub campaign_id: CampaignId,
    #[serde(default, deserialize_with = "verbatim")]
    pub campaign_name: Option<String>,
    #[serde(default, deserialize_with = "verbatim")]
    pub campaign_description: Option<String>,
    #[serde(default, deserialize_with = "verbatim")]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "verbatim")]
    pub end_date: Option<String>,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default, deserialize_with = "verbatim")]
    pub target_audience: Option<String>,
    #[serde(default, deserialize_with = "verbatim")]
    pub channel: Option<String>,
    #[serde(default)]
    pub total_cost: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub event_id: EventId,
    #[serde(default, deserialize_with = "verbatim")]
    pub campaign_id: Option<CampaignId>,
    #[serde(default, deserialize_with = "verbatim")]
    pub subscription_id: Option<SubscriptionId>,
    #[serde(default, deserialize_with = "verbatim")]
    pub event_type: Option<String>,
    #[serde(default, deserialize_with = "verbatim")]
    pub event_date: Option<String>,
    #[serde(default, deserialize_with = "verbatim")]
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub subscription_id: SubscriptionId,
    #[serde(default, deserialize_with = "verbatim")]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "verbatim")]
    pub end_date: Option<String>,
    #[serde(default)]
    pub n_meals: Option<i64>,
    #[serde(default)]
    pub n_people: Option<i64>,
    #[serde(default)]
    pub n_orders: Option<i64>,
    #[serde(default, deserialize_with = "verbatim")]
    pub food_choice: Option<String>,
}

/// Keep the cell as written, empty string included.
fn verbatim<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(Some)
}

/// Funnel stage of an event. Matching is case-insensitive and ignores
/// surrounding whitespace; unknown labels are kept, not rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Impression,
    Click,
    PageView,
    Signup,
    Subscribe,
    Conversion,
    Other(String),
}

impl EventType {
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase();
        match normalized.as_str() {
            "impression" => EventType::Impression,
            "click" => EventType::Click,
            "page_view" => EventType::PageView,
            "signup" => EventType::Signup,
            "subscribe" => EventType::Subscribe,
            "conversion" => EventType::Conversion,
            _ => EventType::Other(normalized),
        }
    }
}
