//! In-memory request statistics.
//!
//! A bounded buffer of per-request records, plus a couple of counters
//! that are cheap enough to keep forever. When the buffer is full the
//! oldest record is dropped; the drop count is kept so a consumer can
//! tell how much history it lost.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::platforms::PlatformId;

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    Success,
    Unsupported,
    AllStrategiesFailed,
    Timeout,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatRecord {
    pub platform: Option<PlatformId>,
    pub outcome: RequestOutcome,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub records: Vec<StatRecord>,
    pub cache_hits: u64,
    pub dropped: u64,
}

pub struct StatsRecorder {
    records: Mutex<VecDeque<StatRecord>>,
    capacity: usize,
    cache_hits: AtomicU64,
    dropped: AtomicU64,
}

impl StatsRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            cache_hits: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn record(&self, record: StatRecord) {
        let mut records = self.records.lock().expect("stats lock poisoned");
        if records.len() == self.capacity {
            records.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        records.push_back(record);
    }

    /// Cache hits skip the buffer entirely, they cost nothing and
    /// would crowd out the records worth reading.
    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let records = self.records.lock().expect("stats lock poisoned");
        StatsSnapshot {
            records: records.iter().cloned().collect(),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Take all buffered records, leaving the counters in place.
    pub fn drain(&self) -> Vec<StatRecord> {
        let mut records = self.records.lock().expect("stats lock poisoned");
        records.drain(..).collect()
    }
}
