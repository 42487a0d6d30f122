//! Concurrent per-station store of weather readings.
//!
//! The store holds two maps behind one [`RwLock`]:
//!
//! - **ledgers**: station id to the readings for that station, kept sorted
//!   by Lamport time (ties in arrival order);
//! - **liveness**: source id to the wall-clock time of that source's last
//!   accepted push.
//!
//! Callers never see the raw maps. Every operation takes the lock once, so
//! [`ContentStore::snapshot`] is a point-in-time copy even while the worker
//! and the eviction task are mutating the store.
//!
//! Lookups use binary search over the sorted ledger and return the reading
//! with the largest Lamport time not exceeding the requested bound.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};
use weather_types::{Reading, Snapshot, SourceId, StationId};

/// Errors returned by store mutations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// The reading's station id is the empty string.
    #[error("station id must not be empty")]
    EmptyStationId,
}

/// How a push relates to the source's previous contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactKind {
    /// The source had no liveness entry.
    FirstContact,
    /// The source's previous contact is older than the staleness window.
    Renewed,
    /// The source was already live.
    Continued,
}

impl ContactKind {
    /// Whether this contact (re)establishes the source.
    pub const fn is_new(self) -> bool {
        matches!(self, Self::FirstContact | Self::Renewed)
    }
}

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Sources whose liveness entry expired in this pass.
    pub expired_sources: Vec<SourceId>,
    /// Number of readings removed from the ledgers.
    pub readings_removed: usize,
    /// Whether the whole store was cleared because no live source remained.
    pub cleared: bool,
}

#[derive(Debug, Default)]
struct Inner {
    ledgers: BTreeMap<StationId, Vec<Reading>>,
    liveness: BTreeMap<SourceId, DateTime<Utc>>,
}

impl Inner {
    fn reading_count(&self) -> usize {
        self.ledgers.values().map(Vec::len).sum()
    }
}

/// Thread-safe store of station ledgers and source liveness.
#[derive(Debug)]
pub struct ContentStore {
    inner: RwLock<Inner>,
    staleness: TimeDelta,
}

impl ContentStore {
    /// Create an empty store.
    ///
    /// `staleness` is the window after which a silent source counts as
    /// stale; it decides whether a push is [`ContactKind::Renewed`].
    pub fn new(staleness: TimeDelta) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            staleness,
        }
    }

    /// The configured staleness window.
    pub const fn staleness(&self) -> TimeDelta {
        self.staleness
    }

    /// Append a reading, stamping its source as live now.
    pub fn put(&self, reading: Reading) -> Result<ContactKind, StoreError> {
        self.put_at(reading, Utc::now())
    }

    /// Append a reading, stamping its source as live at `now`.
    ///
    /// Duplicates are kept. The reading is placed after every existing
    /// reading with the same or lower Lamport time.
    pub fn put_at(&self, reading: Reading, now: DateTime<Utc>) -> Result<ContactKind, StoreError> {
        if reading.station_id.is_empty() {
            return Err(StoreError::EmptyStationId);
        }

        let mut inner = self.write();

        let previous = inner.liveness.insert(reading.source_id.clone(), now);
        let kind = match previous {
            None => ContactKind::FirstContact,
            Some(last) if now.signed_duration_since(last) > self.staleness => ContactKind::Renewed,
            Some(_) => ContactKind::Continued,
        };

        let ledger = inner.ledgers.entry(reading.station_id.clone()).or_default();
        let at = ledger.partition_point(|r| r.lamport_time <= reading.lamport_time);
        debug!(
            station = %reading.station_id,
            source = %reading.source_id,
            lamport_time = reading.lamport_time,
            contact = ?kind,
            "reading stored"
        );
        ledger.insert(at, reading);

        Ok(kind)
    }

    /// Return the reading with the largest Lamport time `<= bound`.
    pub fn get(&self, station: &StationId, bound: u64) -> Option<Reading> {
        let inner = self.read();
        let ledger = inner.ledgers.get(station)?;
        let end = ledger.partition_point(|r| r.lamport_time <= bound);
        let last = end.checked_sub(1)?;
        ledger.get(last).cloned()
    }

    /// Station used when a query names none: the smallest present id.
    ///
    /// Returns `None` on an empty store.
    pub fn default_station(&self) -> Option<StationId> {
        self.read().ledgers.keys().next().cloned()
    }

    /// Look up `station`, falling back to [`default_station`] when absent.
    ///
    /// [`default_station`]: Self::default_station
    pub fn resolve(&self, station: Option<&StationId>, bound: u64) -> Option<Reading> {
        match station.filter(|s| !s.is_empty()) {
            Some(station) => self.get(station, bound),
            None => {
                let station = self.default_station()?;
                self.get(&station, bound)
            }
        }
    }

    /// Evict every source silent for longer than `staleness`.
    ///
    /// Readings of evicted sources are removed from all ledgers and empty
    /// ledgers are dropped. If no live source remains the store is cleared.
    pub fn evict(&self, staleness: TimeDelta, now: DateTime<Utc>) -> EvictionReport {
        let mut inner = self.write();
        let mut report = EvictionReport::default();

        inner.liveness.retain(|source, last| {
            let stale = now.signed_duration_since(*last) > staleness;
            if stale {
                report.expired_sources.push(source.clone());
            }
            !stale
        });

        let before = inner.reading_count();

        if inner.liveness.is_empty() {
            report.cleared = !inner.ledgers.is_empty();
            inner.ledgers.clear();
        } else {
            let Inner { ledgers, liveness } = &mut *inner;
            ledgers.retain(|_, ledger| {
                ledger.retain(|r| liveness.contains_key(&r.source_id));
                !ledger.is_empty()
            });
        }

        report.readings_removed = before.saturating_sub(inner.reading_count());

        if !report.expired_sources.is_empty() || report.cleared {
            info!(
                expired = report.expired_sources.len(),
                readings_removed = report.readings_removed,
                cleared = report.cleared,
                "stale sources evicted"
            );
        }
        report
    }

    /// Copy the full state of the store.
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.read();
        Snapshot {
            ledgers: inner.ledgers.clone(),
            liveness: inner.liveness.clone(),
        }
    }

    /// Replace the full state of the store with `snapshot`.
    ///
    /// Readings filed under the wrong station are dropped, ledgers are
    /// re-sorted by Lamport time (stable, so arrival order of ties is
    /// kept), and empty ledgers are removed.
    pub fn restore(&self, snapshot: Snapshot) {
        let Snapshot { mut ledgers, liveness } = snapshot;

        ledgers.retain(|station, ledger| {
            ledger.retain(|r| &r.station_id == station);
            ledger.sort_by_key(|r| r.lamport_time);
            !ledger.is_empty()
        });

        let mut inner = self.write();
        inner.ledgers = ledgers;
        inner.liveness = liveness;
        info!(
            stations = inner.ledgers.len(),
            readings = inner.reading_count(),
            sources = inner.liveness.len(),
            "store restored"
        );
    }

    /// Number of stations with at least one reading.
    pub fn station_count(&self) -> usize {
        self.read().ledgers.len()
    }

    /// Total number of readings.
    pub fn reading_count(&self) -> usize {
        self.read().reading_count()
    }

    /// Number of sources with a liveness entry.
    pub fn source_count(&self) -> usize {
        self.read().liveness.len()
    }

    /// Whether the store holds no readings.
    pub fn is_empty(&self) -> bool {
        self.read().ledgers.is_empty()
    }

    /// Ids of all stations with readings, in ascending order.
    pub fn stations(&self) -> Vec<StationId> {
        self.read().ledgers.keys().cloned().collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
