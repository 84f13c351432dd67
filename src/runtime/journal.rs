//! The durable stream-and-hash substrate behind an order.
//!
//! Per order the runtime keeps two append-only streams and one hash:
//!
//! - `stream:instructions:<OrderID>` - instruction payloads
//! - `stream:reports:<OrderID>`     - report payloads
//! - `hash:order:<OrderID>`         - last-consumed id per stream
//!
//! Entry ids are monotonic per stream and opaque to the runtime. The
//! [`Journal`] trait is exactly the three operations the runtime uses;
//! a Redis client maps them onto XADD, XREAD and HSET. The in-process
//! [`MemoryJournal`] backs the tests and the example binary.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::core::{Error, Report, Result};
use crate::runtime::AnyOrder;

/// Key prefixes name the substrate data structure first, a convenience
/// when inspecting the store from its command line.
pub const INSTRUCTIONS_STREAM_PREFIX: &str = "stream:instructions:";
pub const REPORTS_STREAM_PREFIX: &str = "stream:reports:";
pub const ORDER_HASH_PREFIX: &str = "hash:order:";

/// The id from which a fresh consumer reads a whole stream.
pub const START_ID: &str = "0";

pub fn instructions_stream(order_id: &str) -> String {
    format!("{INSTRUCTIONS_STREAM_PREFIX}{order_id}")
}

pub fn reports_stream(order_id: &str) -> String {
    format!("{REPORTS_STREAM_PREFIX}{order_id}")
}

pub fn order_hash(order_id: &str) -> String {
    format!("{ORDER_HASH_PREFIX}{order_id}")
}

/// One stream entry: an opaque monotonic id and the `json` field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: String,
    pub json: String,
}

/// A read position: entries strictly after `after_id`.
#[derive(Debug, Clone)]
pub struct ReadFrom {
    pub stream: String,
    pub after_id: String,
}

/// Entries returned for one stream.
#[derive(Debug, Clone)]
pub struct StreamEntries {
    pub stream: String,
    pub entries: Vec<Entry>,
}

/// The persistence operations the runtime needs, and nothing more.
#[async_trait]
pub trait Journal: Send + Sync {
    /// Append a payload, returning the assigned entry id.
    async fn append(&self, stream: &str, json: String) -> Result<String>;

    /// Read new entries from the given positions, blocking up to
    /// `block` when nothing is immediately available. Streams with no
    /// new entries are omitted from the result.
    async fn read_from(&self, positions: &[ReadFrom], block: Duration)
        -> Result<Vec<StreamEntries>>;

    /// Set fields on a hash.
    async fn write_hash(&self, key: &str, fields: &[(String, String)]) -> Result<()>;
}

/// Append an instruction to its order's stream.
pub async fn append_instruction<T: AnyOrder>(journal: &dyn Journal, order: &T) -> Result<String> {
    let json = serde_json::to_string(order)?;
    journal
        .append(&instructions_stream(&order.definition().order_id), json)
        .await
}

/// Append a report to its order's stream.
pub async fn append_report(journal: &dyn Journal, report: &Report) -> Result<String> {
    let json = serde_json::to_string(report)?;
    journal
        .append(&reports_stream(&report.order_id), json)
        .await
}

/// Decode a report stream entry.
pub fn decode_report(entry: &Entry) -> Result<Report> {
    serde_json::from_str(&entry.json).map_err(Error::from)
}

/// Decode an instruction stream entry into the delegate's order type.
pub fn decode_instruction<T: AnyOrder>(entry: &Entry) -> Result<T> {
    serde_json::from_str(&entry.json).map_err(Error::from)
}

/// In-process [`Journal`]. Ids are zero-padded sequence numbers so the
/// opaque-id contract (monotonic, ordered) holds.
#[derive(Default)]
pub struct MemoryJournal {
    state: Mutex<MemoryState>,
    appended: Notify,
}

#[derive(Default)]
struct MemoryState {
    sequence: u64,
    streams: HashMap<String, Vec<Entry>>,
    hashes: HashMap<String, HashMap<String, String>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the named hash, for checkpoint inspection.
    pub fn hash(&self, key: &str) -> HashMap<String, String> {
        self.state.lock().hashes.get(key).cloned().unwrap_or_default()
    }

    /// A copy of the named stream.
    pub fn stream(&self, stream: &str) -> Vec<Entry> {
        self.state.lock().streams.get(stream).cloned().unwrap_or_default()
    }

    fn collect(&self, positions: &[ReadFrom]) -> Vec<StreamEntries> {
        let state = self.state.lock();
        let mut batches = Vec::new();
        for position in positions {
            let Some(entries) = state.streams.get(&position.stream) else {
                continue;
            };
            let new: Vec<Entry> = entries
                .iter()
                .filter(|e| e.id.as_str() > position.after_id.as_str())
                .cloned()
                .collect();
            if !new.is_empty() {
                batches.push(StreamEntries {
                    stream: position.stream.clone(),
                    entries: new,
                });
            }
        }
        batches
    }
}

#[async_trait]
impl Journal for MemoryJournal {
    async fn append(&self, stream: &str, json: String) -> Result<String> {
        let id = {
            let mut state = self.state.lock();
            state.sequence += 1;
            let id = format!("{:020}", state.sequence);
            state
                .streams
                .entry(stream.to_string())
                .or_default()
                .push(Entry {
                    id: id.clone(),
                    json,
                });
            id
        };
        self.appended.notify_waiters();
        Ok(id)
    }

    async fn read_from(
        &self,
        positions: &[ReadFrom],
        block: Duration,
    ) -> Result<Vec<StreamEntries>> {
        let batches = self.collect(positions);
        if !batches.is_empty() {
            return Ok(batches);
        }
        let _ = tokio::time::timeout(block, self.appended.notified()).await;
        Ok(self.collect(positions))
    }

    async fn write_hash(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        let mut state = self.state.lock();
        let hash = state.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.clone(), value.clone());
        }
        Ok(())
    }
}
