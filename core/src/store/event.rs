use super::{group_key, KpiStore, UNKNOWN_GROUP};
use crate::{error::KpiResult, model::Event};
use rusqlite::params;

/// Events of one normalized type within a channel × audience cell.
#[derive(Debug, Clone, PartialEq)]
pub struct EventTypeCountRow {
    pub channel: String,
    pub target_audience: String,
    /// Lowercased, whitespace-trimmed event type; empty when missing.
    pub event_type: String,
    pub events: i64,
}

/// Characters stripped around event types: space, tab, LF, CR.
const WHITESPACE: &str = "' ' || char(9) || char(10) || char(13)";

impl KpiStore {
    // ── Event rows ─────────────────────────────────────────────

    pub fn insert_event(&self, e: &Event) -> KpiResult<()> {
        self.conn.execute(
            "INSERT INTO event (
                event_id, campaign_id, subscription_id, event_type, event_date, channel
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &e.event_id,
                &e.campaign_id,
                &e.subscription_id,
                &e.event_type,
                &e.event_date,
                &e.channel,
            ],
        )?;
        Ok(())
    }

    pub fn events(&self) -> KpiResult<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, campaign_id, subscription_id, event_type, event_date, channel
             FROM event ORDER BY rowid ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Event {
                    event_id: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    campaign_id: row.get(1)?,
                    subscription_id: row.get(2)?,
                    event_type: row.get(3)?,
                    event_date: row.get(4)?,
                    channel: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn event_count(&self) -> KpiResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM event", [], |row| row.get(0))
            .map_err(Into::into)
    }

    /// Event counts keyed by the event's own channel, the owning campaign's
    /// target audience, and the normalized event type.
    ///
    /// The audience comes from the first campaign row carrying the id, so a
    /// duplicated campaign id never multiplies its events.
    pub fn event_type_counts(&self) -> KpiResult<Vec<EventTypeCountRow>> {
        let sql = format!(
            "SELECT channel_key, audience_key, type_key, COUNT(*)
             FROM (
                 SELECT {channel} AS channel_key,
                        COALESCE(
                            (SELECT {audience} FROM campaign c
                             WHERE c.campaign_id = e.campaign_id
                             ORDER BY c.rowid LIMIT 1),
                            '{UNKNOWN_GROUP}'
                        ) AS audience_key,
                        LOWER(TRIM(COALESCE(e.event_type, ''), {WHITESPACE})) AS type_key
                 FROM event e
             )
             GROUP BY channel_key, audience_key, type_key
             ORDER BY channel_key ASC, audience_key ASC, type_key ASC",
            channel = group_key("e.channel"),
            audience = group_key("c.target_audience"),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(EventTypeCountRow {
                    channel: row.get(0)?,
                    target_audience: row.get(1)?,
                    event_type: row.get(2)?,
                    events: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
