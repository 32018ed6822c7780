//! Zone-specific state and management.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use crate::cfg::ZoneConfig;
use crate::update::UpdateRequest;
use crate::zonedata::{SnapshotCell, StoredName, ZoneContents};

//----------- Zone -------------------------------------------------------------

/// A zone.
#[derive(Debug)]
pub struct Zone {
    /// The name of this zone.
    pub name: StoredName,

    /// The configuration of this zone.
    pub config: ZoneConfig,

    /// The published contents of this zone.
    ///
    /// Only the update worker of the zone publishes new contents, once the
    /// zone has been loaded.
    pub contents: SnapshotCell,

    /// The state of this zone.
    ///
    /// The lock is only held briefly, never across an await point.
    pub state: Mutex<ZoneState>,
}

/// The state of a zone.
#[derive(Debug, Default)]
pub struct ZoneState {
    /// Update requests waiting for the next batch.
    pub pending: VecDeque<UpdateRequest>,

    /// Whether an update worker is running for the zone.
    ///
    /// ## Invariants
    ///
    /// - `single-writer`: at most one worker runs per zone.
    pub worker_active: bool,

    /// When the zone must be re-signed next, if it is signed.
    pub next_resign: Option<jiff::Timestamp>,
}

impl Zone {
    /// Construct a new [`Zone`].
    pub fn new(config: ZoneConfig, contents: Option<ZoneContents>) -> Self {
        Self {
            name: config.name.clone(),
            config,
            contents: SnapshotCell::new(contents.map(Arc::new)),
            state: Mutex::new(ZoneState::default()),
        }
    }

    /// Whether updates to this zone are forwarded to a primary.
    pub fn is_secondary(&self) -> bool {
        self.config.primary.is_some()
    }

    /// Queue an update request.
    ///
    /// Returns whether a worker has to be started for the zone; the caller is
    /// then responsible for starting it.
    pub fn enqueue(&self, request: UpdateRequest) -> bool {
        let mut state = self.state.lock().unwrap();
        state.pending.push_back(request);
        !std::mem::replace(&mut state.worker_active, true)
    }

    /// Take all queued requests as the next batch.
    ///
    /// If there are none, the worker is considered finished and [`None`] is
    /// returned. Requests queued afterwards will start a new worker.
    pub fn take_batch(&self) -> Option<Vec<UpdateRequest>> {
        let mut state = self.state.lock().unwrap();
        if state.pending.is_empty() {
            state.worker_active = false;
            return None;
        }
        Some(state.pending.drain(..).collect())
    }

    /// The number of queued requests.
    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// When the zone must be re-signed next.
    pub fn next_resign(&self) -> Option<jiff::Timestamp> {
        self.state.lock().unwrap().next_resign
    }

    /// Schedule re-signing of the zone.
    ///
    /// The deadline is only moved forward. Returns whether it changed.
    pub fn schedule_resign(&self, at: jiff::Timestamp) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.next_resign {
            Some(current) if current <= at => false,
            _ => {
                state.next_resign = Some(at);
                true
            }
        }
    }
}

//============ Tests ===========================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use domain::base::{Rtype, iana::Class};

    use super::Zone;
    use crate::cfg::ZoneConfig;
    use crate::update::{Transport, UpdateMessage, UpdateRequest};
    use crate::zonedata::StoredName;

    fn request() -> UpdateRequest {
        let message = UpdateMessage {
            id: 1,
            zone: StoredName::from_str("example.").unwrap(),
            zone_class: Class::IN,
            zone_rtype: Rtype::SOA,
            prerequisites: Vec::new(),
            updates: Vec::new(),
            tsig: None,
        };
        let client = "192.0.2.10:5353".parse().unwrap();
        UpdateRequest::new(message, Transport::Datagram, client).0
    }

    #[test]
    fn batches() {
        let zone = Zone::new(
            ZoneConfig::new(StoredName::from_str("example.").unwrap()),
            None,
        );

        assert!(zone.enqueue(request()));
        assert!(!zone.enqueue(request()));
        assert_eq!(zone.take_batch().map(|b| b.len()), Some(2));

        // Requests queued while the batch is processed join the next one.
        assert!(!zone.enqueue(request()));
        assert_eq!(zone.take_batch().map(|b| b.len()), Some(1));

        assert!(zone.take_batch().is_none());
        assert!(zone.enqueue(request()));
        assert_eq!(zone.pending(), 1);
    }

    #[test]
    fn resign_deadline() {
        let zone = Zone::new(
            ZoneConfig::new(StoredName::from_str("example.").unwrap()),
            None,
        );
        let later = jiff::Timestamp::from_second(2_000_000_000).unwrap();
        let sooner = jiff::Timestamp::from_second(1_900_000_000).unwrap();

        assert!(zone.schedule_resign(later));
        assert!(zone.schedule_resign(sooner));
        assert!(!zone.schedule_resign(later));
        assert_eq!(zone.next_resign(), Some(sooner));
    }
}
