//! Events about zones.
//!
//! Committing an update has effects beyond the zone contents: secondaries
//! must be notified, the zone may have to be written out, and re-signing may
//! have to happen sooner. Weir does not perform these itself; it reports them
//! as [`ZoneEvent`]s to the embedding daemon.

use domain::base::Serial;
use tokio::sync::mpsc;
use tracing::debug;

use crate::zonedata::StoredName;

//----------- ZoneEvent --------------------------------------------------------

/// Something that should happen to a zone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ZoneEvent {
    /// Secondaries should be notified of a new serial.
    Notify {
        /// The zone.
        zone: StoredName,

        /// The serial that was committed.
        serial: Serial,
    },

    /// The zone should be written out.
    Flush {
        /// The zone.
        zone: StoredName,
    },

    /// The zone should be re-signed at the given time.
    Resign {
        /// The zone.
        zone: StoredName,

        /// When signatures must be refreshed.
        at: jiff::Timestamp,
    },
}

impl ZoneEvent {
    /// The zone the event is about.
    pub fn zone(&self) -> &StoredName {
        match self {
            Self::Notify { zone, .. } | Self::Flush { zone } | Self::Resign { zone, .. } => zone,
        }
    }
}

//----------- ZoneEvents -------------------------------------------------------

/// A sink for [`ZoneEvent`]s.
#[derive(Clone, Debug)]
pub struct ZoneEvents {
    tx: mpsc::UnboundedSender<ZoneEvent>,
}

impl ZoneEvents {
    /// Construct a new [`ZoneEvents`], and the receiver of its events.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ZoneEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit an event.
    ///
    /// If nobody is listening any more, the event is dropped.
    pub fn emit(&self, event: ZoneEvent) {
        debug!(zone = %event.zone(), ?event, "Emitting zone event");
        if self.tx.send(event).is_err() {
            debug!("Zone event dropped: the receiver is gone");
        }
    }
}

impl From<mpsc::UnboundedSender<ZoneEvent>> for ZoneEvents {
    fn from(tx: mpsc::UnboundedSender<ZoneEvent>) -> Self {
        Self { tx }
    }
}
