//! Persisting changesets.
//!
//! Every committed changeset is appended to a journal before the new contents
//! become visible. The journal is what outgoing IXFRs and restarts are served
//! from. This module defines the contract a journal must fulfill, and provides
//! [`MemoryJournal`], an in-process implementation.

use std::{collections::VecDeque, fmt, sync::Mutex};

use domain::base::Serial;
use tracing::debug;

use crate::{Changeset, OwnerKey, StoredName};

//----------- Journal ----------------------------------------------------------

/// Durable storage for the changesets of zones.
///
/// Appending may block (e.g. on disk I/O); callers in async contexts should
/// call it from a blocking thread.
pub trait Journal: Send + Sync {
    /// Append a committed changeset.
    ///
    /// The changeset must start at the serial the previous one for the zone
    /// ended at. A failure means the changeset was not stored.
    fn append(&self, zone: &StoredName, changeset: &Changeset) -> Result<(), JournalError>;

    /// Read the changesets leading from a serial to the latest version.
    fn read_since(&self, zone: &StoredName, serial: Serial) -> Result<Vec<Changeset>, JournalError>;
}

//----------- MemoryJournal ----------------------------------------------------

/// A journal kept in memory.
///
/// Each zone has a chain of consecutive changesets. The chain is bounded; the
/// oldest changesets are dropped first.
#[derive(Debug)]
pub struct MemoryJournal {
    /// The chains of changesets, per zone.
    chains: Mutex<foldhash::HashMap<OwnerKey, VecDeque<Changeset>>>,

    /// The maximum number of changesets per zone.
    max_entries: usize,
}

impl MemoryJournal {
    /// Construct a new [`MemoryJournal`].
    ///
    /// ## Panics
    ///
    /// Panics if `max_entries` is zero.
    pub fn new(max_entries: usize) -> Self {
        assert!(max_entries > 0, "a journal must hold at least one changeset");
        Self {
            chains: Mutex::new(foldhash::HashMap::default()),
            max_entries,
        }
    }

    /// The number of changesets stored for a zone.
    pub fn len(&self, zone: &StoredName) -> usize {
        let chains = self.chains.lock().unwrap();
        chains.get(&OwnerKey::from(zone)).map_or(0, VecDeque::len)
    }

    /// The serial the latest changeset of a zone ends at.
    pub fn last_serial(&self, zone: &StoredName) -> Option<Serial> {
        let chains = self.chains.lock().unwrap();
        chains.get(&OwnerKey::from(zone))?.back()?.serial_to()
    }
}

impl Journal for MemoryJournal {
    fn append(&self, zone: &StoredName, changeset: &Changeset) -> Result<(), JournalError> {
        let (Some(from), Some(to)) = (changeset.serial_from(), changeset.serial_to()) else {
            return Err(JournalError::Discontinuous);
        };

        let mut chains = self.chains.lock().unwrap();
        let chain = chains.entry(OwnerKey::from(zone)).or_default();

        if let Some(last) = chain.back()
            && last.serial_to() != Some(from)
        {
            return Err(JournalError::Discontinuous);
        }

        chain.push_back(changeset.clone());
        while chain.len() > self.max_entries {
            chain.pop_front();
        }

        debug!(zone = %zone, %from, %to, entries = chain.len(), "Journaled a changeset");
        Ok(())
    }

    fn read_since(&self, zone: &StoredName, serial: Serial) -> Result<Vec<Changeset>, JournalError> {
        let chains = self.chains.lock().unwrap();
        let Some(chain) = chains.get(&OwnerKey::from(zone)) else {
            return Err(JournalError::Discontinuous);
        };

        if chain.back().and_then(Changeset::serial_to) == Some(serial) {
            return Ok(Vec::new());
        }

        let start = chain
            .iter()
            .position(|c| c.serial_from() == Some(serial))
            .ok_or(JournalError::Discontinuous)?;
        Ok(chain.range(start..).cloned().collect())
    }
}

//============ Errors ==========================================================

//----------- JournalError -----------------------------------------------------

/// An error when using a journal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JournalError {
    /// The changesets do not form a continuous serial chain.
    Discontinuous,

    /// The underlying storage failed.
    Io(String),
}

impl std::error::Error for JournalError {}

impl fmt::Display for JournalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalError::Discontinuous => f.write_str("the journal has no continuous history"),
            JournalError::Io(error) => write!(f, "the journal could not be accessed: {error}"),
        }
    }
}

//============ Tests ===========================================================
