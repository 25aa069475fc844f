//! Single-flight guard: concurrent resolutions of one URL collapse
//! into one leader doing the work and any number of followers waiting
//! on its broadcast.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::error::ResolveError;
use crate::platforms::NormalizedUrl;
use crate::strategies::ResolvedMedia;

pub type FlightResult = Result<Arc<ResolvedMedia>, ResolveError>;

pub struct SingleFlight {
    flights: DashMap<NormalizedUrl, broadcast::Sender<FlightResult>>,
}

pub enum FlightRole {
    /// First caller for this URL; must `complete` (or drop) the guard.
    Leader(FlightGuard),
    /// Someone else is already resolving; wait on the channel.
    Follower(broadcast::Receiver<FlightResult>),
}

impl SingleFlight {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            flights: DashMap::new(),
        })
    }

    pub fn join(self: &Arc<Self>, url: &NormalizedUrl) -> FlightRole {
        match self.flights.entry(url.clone()) {
            Entry::Occupied(entry) => FlightRole::Follower(entry.get().subscribe()),
            Entry::Vacant(entry) => {
                let (tx, _) = broadcast::channel(1);
                entry.insert(tx.clone());
                FlightRole::Leader(FlightGuard {
                    flights: Arc::clone(self),
                    url: url.clone(),
                    tx,
                })
            }
        }
    }

    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }
}

/// Removes the flight entry on drop, so a panicking or cancelled
/// leader never wedges followers forever: their channel closes and
/// they retry as the new leader.
pub struct FlightGuard {
    flights: Arc<SingleFlight>,
    url: NormalizedUrl,
    tx: broadcast::Sender<FlightResult>,
}

impl FlightGuard {
    pub fn complete(self, result: FlightResult) {
        // send while the entry is still registered, then drop unmaps it
        let _ = self.tx.send(result);
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flights.flights.remove(&self.url);
    }
}
