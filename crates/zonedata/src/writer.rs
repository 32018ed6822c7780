//! Building new versions of zones.
//!
//! This module extends [`ZoneContents`] with the ability to apply a
//! [`Changeset`]. Published contents are never modified; a new version is
//! always built next to the old one, sharing the nodes the changeset does not
//! touch.

use std::{fmt, sync::Arc};

use domain::base::Rtype;

use crate::{Changeset, Node, OwnerKey, Rrset, ZoneContents, is_in_zone};

//----------- Patching ---------------------------------------------------------

impl ZoneContents {
    /// Build a new version of the zone by applying a changeset.
    ///
    /// `self` is left untouched. Only the nodes the changeset touches are
    /// copied; all others are shared between `self` and the new version.
    ///
    /// The changeset is checked strictly: every removed record must exist and
    /// every added record must not. Records added to an existing RRset must
    /// match its TTL, except for RRSIGs. The new version must have an SOA.
    pub fn patched(&self, changeset: &Changeset) -> Result<Self, PatchError> {
        let mut next = self.clone();
        next.patch_in_place(changeset)?;
        Ok(next)
    }

    /// Apply a changeset to unpublished contents.
    ///
    /// This follows the same rules as [`patched()`](Self::patched()). On
    /// failure, `self` is left in an unspecified state and must be discarded.
    pub fn patch_in_place(&mut self, changeset: &Changeset) -> Result<(), PatchError> {
        for rrset in changeset.removals().rrsets() {
            self.remove_records(rrset)?;
        }

        for rrset in changeset.additions().rrsets() {
            self.add_records(rrset)?;
        }

        if self.soa().is_none() {
            return Err(PatchError::MissingSoa);
        }

        Ok(())
    }

    /// Remove the records of an RRset.
    fn remove_records(&mut self, rrset: &Rrset) -> Result<(), PatchError> {
        let key = OwnerKey::from(rrset.owner());
        let Some(node) = self.nodes.get_mut(&key) else {
            return Err(PatchError::MissingRecord);
        };
        let node = Arc::make_mut(node);

        let Some(index) = node.rrsets.iter().position(|r| r.rtype() == rrset.rtype()) else {
            return Err(PatchError::MissingRecord);
        };
        let existing = &mut node.rrsets[index];
        for rdata in rrset.rdata() {
            if !existing.remove(rdata) {
                return Err(PatchError::MissingRecord);
            }
        }

        if existing.is_empty() {
            node.rrsets.remove(index);
            if node.rrsets.is_empty() {
                self.nodes.remove(&key);
            }
        }

        Ok(())
    }

    /// Add the records of an RRset.
    fn add_records(&mut self, rrset: &Rrset) -> Result<(), PatchError> {
        if !is_in_zone(rrset.owner(), self.apex()) {
            return Err(PatchError::OutOfZone);
        }

        let node = self
            .nodes
            .entry(OwnerKey::from(rrset.owner()))
            .or_insert_with(|| Arc::new(Node::new(rrset.owner().clone())));
        let node = Arc::make_mut(node);

        let Some(existing) = node.rrset_mut(rrset.rtype()) else {
            node.rrsets
                .try_reserve(1)
                .map_err(|_| PatchError::OutOfMemory)?;
            node.rrsets.push(rrset.clone());
            return Ok(());
        };

        if existing.ttl() != rrset.ttl() && rrset.rtype() != Rtype::RRSIG {
            return Err(PatchError::TtlMismatch);
        }
        for rdata in rrset.rdata() {
            if !existing.push(rdata.clone()) {
                return Err(PatchError::DuplicateRecord);
            }
        }

        Ok(())
    }
}

//============ Errors ==========================================================

//----------- PatchError -------------------------------------------------------

/// An error when applying a changeset to zone contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatchError {
    /// A removed record does not exist.
    MissingRecord,

    /// An added record already exists.
    DuplicateRecord,

    /// An added record has a different TTL than its RRset.
    TtlMismatch,

    /// A record is outside the zone.
    OutOfZone,

    /// The result does not have an SOA record.
    MissingSoa,

    /// Memory for the new version could not be allocated.
    OutOfMemory,
}

impl std::error::Error for PatchError {}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PatchError::MissingRecord => "a removed record does not exist in the zone",
            PatchError::DuplicateRecord => "an added record already exists in the zone",
            PatchError::TtlMismatch => "an added record does not match the TTL of its RRset",
            PatchError::OutOfZone => "a record is outside the zone",
            PatchError::MissingSoa => "the zone would not have a SOA record",
            PatchError::OutOfMemory => "out of memory while building the zone",
        })
    }
}

//============ Tests ===========================================================
