//! Changesets.
//!
//! A [`Changeset`] describes one versioned mutation of a zone: the RRsets it
//! removes, the RRsets it adds, and the SOA serial transition it represents.
//! Changesets are produced by update transactions and by the signer, merged
//! into one per update cycle, applied to build new zone contents, and finally
//! handed to the journal.

use std::fmt;

use domain::base::{Rtype, Serial};

use crate::{ChangesetIter, Changes, DiffSection, IterMode, Rrset, StoredName};

//----------- Changeset --------------------------------------------------------

/// A mutation of a zone.
///
/// The removals are applied before the additions. A changeset may, while it
/// is being built, contain the same record in both sections; producers are
/// expected to avoid leaving it that way (see [`ZoneUpdate`]).
///
/// [`ZoneUpdate`]: crate::ZoneUpdate
#[derive(Clone, Debug)]
pub struct Changeset {
    /// The apex of the zone being changed.
    zone: StoredName,

    /// The SOA serial of the zone before the change.
    serial_from: Option<Serial>,

    /// The SOA serial of the zone after the change.
    ///
    /// This is set once a new SOA record has been added.
    serial_to: Option<Serial>,

    /// The RRsets to add.
    add: DiffSection,

    /// The RRsets to remove.
    remove: DiffSection,
}

impl Changeset {
    /// Construct a new, empty [`Changeset`].
    pub const fn new(zone: StoredName) -> Self {
        Self {
            zone,
            serial_from: None,
            serial_to: None,
            add: DiffSection::new(),
            remove: DiffSection::new(),
        }
    }

    /// The apex of the zone being changed.
    pub const fn zone(&self) -> &StoredName {
        &self.zone
    }

    /// The serial the changeset starts from, if known.
    pub const fn serial_from(&self) -> Option<Serial> {
        self.serial_from
    }

    /// The serial the changeset ends at, if finalized.
    pub const fn serial_to(&self) -> Option<Serial> {
        self.serial_to
    }

    /// Set the serial the changeset starts from.
    pub fn set_serial_from(&mut self, serial: Serial) {
        self.serial_from = Some(serial);
    }

    /// The added RRsets.
    pub const fn additions(&self) -> &DiffSection {
        &self.add
    }

    /// The removed RRsets.
    pub const fn removals(&self) -> &DiffSection {
        &self.remove
    }

    /// The number of (owner, RRset) entries across both sections.
    pub const fn size(&self) -> usize {
        self.add.len() + self.remove.len()
    }

    /// Whether both sections are empty.
    pub const fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// The added SOA RRset, if any.
    pub fn soa_added(&self) -> Option<&Rrset> {
        self.add.get(&self.zone, Rtype::SOA)
    }

    /// The removed SOA RRset, if any.
    pub fn soa_removed(&self) -> Option<&Rrset> {
        self.remove.get(&self.zone, Rtype::SOA)
    }
}

impl Changeset {
    /// Add an RRset to the addition section.
    ///
    /// Adding an SOA record at the apex finalizes the target serial.
    pub fn add(&mut self, rrset: Rrset) -> Result<(), ChangesetError> {
        let serial = self.apex_soa_serial(&rrset);
        self.add.insert(rrset)?;
        if serial.is_some() {
            self.serial_to = serial;
        }
        Ok(())
    }

    /// Add an RRset to the removal section.
    ///
    /// Removing an SOA record at the apex records the source serial, unless
    /// it is already known.
    pub fn remove(&mut self, rrset: Rrset) -> Result<(), ChangesetError> {
        let serial = self.apex_soa_serial(&rrset);
        self.remove.insert(rrset)?;
        if self.serial_from.is_none() {
            self.serial_from = serial;
        }
        Ok(())
    }

    /// Cancel records out of the addition section.
    ///
    /// Returns the records that were not present there.
    pub fn cancel_addition(&mut self, rrset: &Rrset) -> Rrset {
        let leftover = self.add.cancel(rrset);
        if rrset.rtype() == Rtype::SOA && self.soa_added().is_none() {
            self.serial_to = None;
        }
        leftover
    }

    /// Cancel records out of the removal section.
    ///
    /// Returns the records that were not present there.
    pub fn cancel_removal(&mut self, rrset: &Rrset) -> Rrset {
        self.remove.cancel(rrset)
    }

    /// Withdraw a whole added RRset.
    pub fn take_addition(&mut self, owner: &StoredName, rtype: Rtype) -> Option<Rrset> {
        let rrset = self.add.take(owner, rtype)?;
        if rtype == Rtype::SOA && crate::names_eq(owner, &self.zone) {
            self.serial_to = None;
        }
        Some(rrset)
    }

    /// Release all RRsets.
    ///
    /// The serials are forgotten too. This is safe to call on an empty
    /// changeset.
    pub fn clear(&mut self) {
        self.add.clear();
        self.remove.clear();
        self.serial_from = None;
        self.serial_to = None;
    }

    /// The serial of an apex SOA RRset.
    fn apex_soa_serial(&self, rrset: &Rrset) -> Option<Serial> {
        if rrset.rtype() != Rtype::SOA || !crate::names_eq(rrset.owner(), &self.zone) {
            return None;
        }
        rrset.rdata().first()?.soa_serial()
    }
}

impl Changeset {
    /// Iterate over the RRsets of this changeset.
    ///
    /// The changeset is not modified; it can be iterated over any number of
    /// times.
    pub fn iter(&self, mode: IterMode) -> ChangesetIter<'_> {
        ChangesetIter::new(self, mode)
    }

    /// Iterate over all changes, with the side each one is on.
    ///
    /// Changes are yielded in the same order as `self.iter(IterMode::All)`.
    pub fn iter_changes(&self) -> Changes<'_> {
        Changes::new(self, IterMode::All)
    }

    /// Merge a subsequent changeset into this one.
    ///
    /// `second` is meant to be applied after `self`. On success, `self` is
    /// equivalent to applying both in sequence. Records removed by `second`
    /// that `self` adds cancel out, as do records added by `second` that
    /// `self` removes. Everything else is carried over.
    ///
    /// On failure, `self` is consistent but its contents are unspecified; it
    /// should be discarded.
    pub fn merge(&mut self, second: &Self) -> Result<(), ChangesetError> {
        // 'second' removes before it adds; its removals must be applied first
        // so that a record it re-adds is not cancelled out.
        for rrset in second.remove.rrsets() {
            let leftover = self.cancel_addition(rrset);
            self.remove.insert(leftover)?;
        }

        for rrset in second.add.rrsets() {
            let leftover = self.remove.cancel(rrset);
            self.add.insert(leftover)?;
        }

        if self.serial_from.is_none() {
            self.serial_from = second.serial_from;
        }
        if second.serial_to.is_some() {
            self.serial_to = second.serial_to;
        }
        Ok(())
    }
}

//----------- Side -------------------------------------------------------------

/// A section of a changeset.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Side {
    /// The RRset is added.
    Add,

    /// The RRset is removed.
    Remove,
}

//============ Errors ==========================================================

//----------- ChangesetError ---------------------------------------------------

/// An error when building a changeset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangesetError {
    /// Memory for a new entry could not be allocated.
    OutOfMemory,
}

impl std::error::Error for ChangesetError {}

impl fmt::Display for ChangesetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangesetError::OutOfMemory => f.write_str("out of memory while building a changeset"),
        }
    }
}

//============ Tests ===========================================================
