//! Shared primitive types used across the pipeline.

/// Stable identifier of a campaign row.
pub type CampaignId = String;

/// Stable identifier of an event row.
pub type EventId = String;

/// Stable identifier of a subscription row.
pub type SubscriptionId = String;

/// Primary key of a committed snapshot load.
pub type SnapshotId = i64;
