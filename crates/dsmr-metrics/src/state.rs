//! Metric state — the latest reading per metric plus ingestion counters.
//!
//! One writer (the ingestion loop) and any number of readers (scrape
//! handlers). Each reading sits behind its own lock, held only for the
//! copy of a `Reading`; the slot map itself is fixed at construction and
//! needs no lock. Counters are plain atomics.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{trace, warn};

use dsmr_core::{DispatchTable, MetricId, Update};

/// One stored value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub value: f64,
    /// Unix epoch milliseconds of the last update.
    pub updated_at_ms: u64,
}

/// Lifecycle of the ingestion loop as seen by readers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestStatus {
    Running,
    /// Terminal; carries the reason ingestion ended.
    Stopped(String),
}

impl IngestStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, IngestStatus::Running)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestCounters {
    pub lines: u64,
    pub updates: u64,
    pub parse_failures: u64,
}

/// Point-in-time view for exposition.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Readings that have received at least one value, ordered by metric.
    pub readings: Vec<(MetricId, Reading)>,
    pub counters: IngestCounters,
    pub status: IngestStatus,
}

/// Live readings shared between the ingestion loop and scrape handlers.
///
/// Slots are created for every metric in the dispatch table, but stay empty
/// until the first successful decode: a metric that has never been read is
/// left out of snapshots rather than reported as zero.
pub struct MetricState {
    slots: BTreeMap<MetricId, RwLock<Option<Reading>>>,
    lines_total: AtomicU64,
    updates_total: AtomicU64,
    parse_failures_total: AtomicU64,
    status: RwLock<IngestStatus>,
}

impl MetricState {
    /// Create state with one empty slot per metric in `table`.
    pub fn new(table: &DispatchTable) -> Self {
        Self::with_metrics(table.metrics())
    }

    pub fn with_metrics(metrics: impl IntoIterator<Item = MetricId>) -> Self {
        Self {
            slots: metrics
                .into_iter()
                .map(|m| (m, RwLock::new(None)))
                .collect(),
            lines_total: AtomicU64::new(0),
            updates_total: AtomicU64::new(0),
            parse_failures_total: AtomicU64::new(0),
            status: RwLock::new(IngestStatus::Running),
        }
    }

    /// Overwrite a reading (last value wins).
    ///
    /// Returns `false` if this state has no slot for the metric.
    pub fn apply(&self, update: Update) -> bool {
        let Some(slot) = self.slots.get(&update.metric) else {
            warn!(metric = %update.metric, "update for untracked metric dropped");
            return false;
        };

        let reading = Reading {
            value: update.value,
            updated_at_ms: epoch_millis(),
        };
        *slot.write().unwrap_or_else(PoisonError::into_inner) = Some(reading);
        self.updates_total.fetch_add(1, Ordering::Relaxed);

        trace!(metric = %update.metric, value = update.value, "reading updated");
        true
    }

    /// Current reading for one metric, if it has been set.
    pub fn get(&self, metric: &MetricId) -> Option<Reading> {
        self.slots
            .get(metric)
            .and_then(|slot| *slot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Copy out every set reading, one slot at a time.
    pub fn snapshot(&self) -> Snapshot {
        let readings = self
            .slots
            .iter()
            .filter_map(|(metric, slot)| {
                let reading = *slot.read().unwrap_or_else(PoisonError::into_inner);
                reading.map(|r| (*metric, r))
            })
            .collect();

        Snapshot {
            readings,
            counters: self.counters(),
            status: self.ingest_status(),
        }
    }

    pub fn tracked_metrics(&self) -> impl Iterator<Item = &MetricId> {
        self.slots.keys()
    }

    // ── Ingestion bookkeeping ─────────────────────────────────

    pub fn record_line(&self) {
        self.lines_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_failure(&self) {
        self.parse_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counters(&self) -> IngestCounters {
        IngestCounters {
            lines: self.lines_total.load(Ordering::Relaxed),
            updates: self.updates_total.load(Ordering::Relaxed),
            parse_failures: self.parse_failures_total.load(Ordering::Relaxed),
        }
    }

    pub fn mark_running(&self) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = IngestStatus::Running;
    }

    /// Record that ingestion has ended. Readings keep their last values.
    pub fn mark_stopped(&self, reason: impl Into<String>) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) =
            IngestStatus::Stopped(reason.into());
    }

    pub fn ingest_status(&self) -> IngestStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MetricState {
    fn default() -> Self {
        Self::new(&DispatchTable::dsmr())
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
