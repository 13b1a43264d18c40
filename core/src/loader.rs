//! Snapshot loader: reads the three CSV extracts into the store.
//!
//! A load is all-or-nothing. Rows are inserted inside one transaction and
//! the `snapshot` row is written last, so a parse failure in any file
//! leaves the previous snapshot untouched.

use crate::{
    error::KpiResult,
    model::{Campaign, Event, Subscription},
    store::{KpiStore, SnapshotRecord},
};
use csv::ReaderBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::{io::Read, path::Path};

pub const CAMPAIGNS_FILE: &str = "campaigns.csv";
pub const EVENTS_FILE: &str = "events.csv";
pub const SUBSCRIPTIONS_FILE: &str = "subscriptions.csv";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LoadSummary {
    pub snapshot: SnapshotRecord,
    pub campaigns: usize,
    pub events: usize,
    pub subscriptions: usize,
}

pub struct SnapshotLoader;

impl SnapshotLoader {
    /// Load `campaigns.csv`, `events.csv` and `subscriptions.csv` from `dir`.
    pub fn load_dir(store: &KpiStore, dir: impl AsRef<Path>, label: &str) -> KpiResult<LoadSummary> {
        let dir = dir.as_ref();
        log::info!("loading snapshot '{label}' from {}", dir.display());
        let campaigns: Vec<Campaign> = read_csv(csv_reader(&dir.join(CAMPAIGNS_FILE))?)?;
        let events: Vec<Event> = read_csv(csv_reader(&dir.join(EVENTS_FILE))?)?;
        let subscriptions: Vec<Subscription> =
            read_csv(csv_reader(&dir.join(SUBSCRIPTIONS_FILE))?)?;
        Self::commit(store, label, &campaigns, &events, &subscriptions)
    }

    /// Load from any three readers holding CSV text with headers.
    pub fn load_readers<C: Read, E: Read, S: Read>(
        store: &KpiStore,
        campaigns: C,
        events: E,
        subscriptions: S,
        label: &str,
    ) -> KpiResult<LoadSummary> {
        let campaigns: Vec<Campaign> = read_csv(reader_from(campaigns))?;
        let events: Vec<Event> = read_csv(reader_from(events))?;
        let subscriptions: Vec<Subscription> = read_csv(reader_from(subscriptions))?;
        Self::commit(store, label, &campaigns, &events, &subscriptions)
    }

    /// Replace the table contents with the given rows and record a snapshot.
    pub fn commit(
        store: &KpiStore,
        label: &str,
        campaigns: &[Campaign],
        events: &[Event],
        subscriptions: &[Subscription],
    ) -> KpiResult<LoadSummary> {
        let snapshot = store.in_transaction(|s| {
            s.clear_tables()?;
            for c in campaigns {
                s.insert_campaign(c)?;
            }
            for e in events {
                s.insert_event(e)?;
            }
            for sub in subscriptions {
                s.insert_subscription(sub)?;
            }
            s.record_snapshot(label)
        })?;

        log::info!(
            "snapshot {} committed: {} campaigns, {} events, {} subscriptions",
            snapshot.id,
            campaigns.len(),
            events.len(),
            subscriptions.len()
        );
        Ok(LoadSummary {
            snapshot,
            campaigns: campaigns.len(),
            events: events.len(),
            subscriptions: subscriptions.len(),
        })
    }
}

fn csv_reader(path: &Path) -> KpiResult<csv::Reader<std::fs::File>> {
    log::debug!("reading {}", path.display());
    Ok(ReaderBuilder::new().has_headers(true).from_path(path)?)
}

fn reader_from<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new().has_headers(true).from_reader(reader)
}

fn read_csv<T: DeserializeOwned, R: Read>(mut reader: csv::Reader<R>) -> KpiResult<Vec<T>> {
    let rows = reader
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()?;
    Ok(rows)
}
