//! Zone update transactions.
//!
//! This module provides [`ZoneUpdate`], a working session in which changes to
//! a zone are accumulated before being applied. The transaction reads from a
//! fixed base snapshot and writes only into its changeset. It answers queries
//! about the zone as it would look with the accumulated changes applied, which
//! is what prerequisite checks and update processing need.

use std::sync::Arc;

use domain::base::{Rtype, Serial};

use crate::{Changeset, ChangesetError, Rrset, StoredName, ZoneContents};

//----------- ZoneUpdate -------------------------------------------------------

/// A transaction on a zone.
///
/// The changeset of a [`ZoneUpdate`] is kept normalized: records are only
/// removed if they exist in the base, and records are only added if they do
/// not. A record is never both added and removed, except when its RRset is
/// replaced under a new TTL.
pub struct ZoneUpdate {
    /// The contents the transaction is based on.
    base: Arc<ZoneContents>,

    /// The accumulated changes.
    changeset: Changeset,
}

impl ZoneUpdate {
    /// Open a transaction against some contents.
    pub fn new(base: Arc<ZoneContents>) -> Self {
        let mut changeset = Changeset::new(base.apex().clone());
        if let Some(serial) = base.serial() {
            changeset.set_serial_from(serial);
        }
        Self { base, changeset }
    }

    /// The contents the transaction is based on.
    pub const fn base(&self) -> &Arc<ZoneContents> {
        &self.base
    }

    /// The accumulated changes.
    pub const fn changeset(&self) -> &Changeset {
        &self.changeset
    }

    /// Whether no changes have been made.
    pub const fn is_empty(&self) -> bool {
        self.changeset.is_empty()
    }

    /// Close the transaction, returning its parts.
    pub fn into_parts(self) -> (Arc<ZoneContents>, Changeset) {
        (self.base, self.changeset)
    }

    /// Discard all accumulated changes.
    pub fn clear(&mut self) {
        self.changeset.clear();
        if let Some(serial) = self.base.serial() {
            self.changeset.set_serial_from(serial);
        }
    }
}

//--- Reading

impl ZoneUpdate {
    /// The RRset of a type at a name, with the changes applied.
    pub fn rrset(&self, owner: &StoredName, rtype: Rtype) -> Option<Rrset> {
        let base = self.base.rrset(owner, rtype);
        let removed = self.changeset.removals().get(owner, rtype);
        let added = self.changeset.additions().get(owner, rtype);

        let mut rrset = match (base, added) {
            (Some(base), _) => base.clone(),
            (None, Some(added)) => added.empty_like(),
            (None, None) => return None,
        };
        if let Some(removed) = removed {
            rrset.subtract(removed);
        }
        if let Some(added) = added {
            // An RRset that was replaced entirely takes the new TTL.
            if rrset.is_empty() {
                rrset.set_ttl(added.ttl());
            }
            rrset.union(added);
        }

        (!rrset.is_empty()).then_some(rrset)
    }

    /// All RRsets at a name, with the changes applied.
    pub fn rrsets_at(&self, owner: &StoredName) -> Vec<Rrset> {
        let mut rtypes: Vec<Rtype> = Vec::new();
        let base = self.base.node(owner).into_iter().flat_map(|n| n.rrsets());
        for rrset in base.chain(self.changeset.additions().at(owner)) {
            if !rtypes.contains(&rrset.rtype()) {
                rtypes.push(rrset.rtype());
            }
        }

        rtypes
            .into_iter()
            .filter_map(|rtype| self.rrset(owner, rtype))
            .collect()
    }

    /// Whether any records exist at a name, with the changes applied.
    pub fn name_in_use(&self, owner: &StoredName) -> bool {
        if !self.changeset.additions().at(owner).is_empty() {
            return true;
        }
        let Some(node) = self.base.node(owner) else {
            return false;
        };
        node.rrsets()
            .iter()
            .any(|r| self.rrset(owner, r.rtype()).is_some())
    }

    /// The apex SOA RRset, with the changes applied.
    pub fn soa(&self) -> Option<Rrset> {
        self.rrset(self.base.apex(), Rtype::SOA)
    }

    /// The SOA serial, with the changes applied.
    pub fn serial(&self) -> Option<Serial> {
        self.soa()?.rdata().first()?.soa_serial()
    }
}

//--- Writing

impl ZoneUpdate {
    /// Add records.
    ///
    /// Records that are already present are ignored. Records that were removed
    /// earlier in this transaction are restored, unless they are added under a
    /// different TTL: the base RRset is then replaced as a whole, and the new
    /// records carry the new TTL.
    pub fn add(&mut self, rrset: Rrset) -> Result<(), ChangesetError> {
        let Some(base) = self.base.rrset(rrset.owner(), rrset.rtype()) else {
            return self.changeset.add(rrset);
        };

        let replacing = base.ttl() != rrset.ttl()
            && self
                .changeset
                .removals()
                .get(rrset.owner(), rrset.rtype())
                .is_some();
        if !replacing {
            let mut leftover = self.changeset.cancel_removal(&rrset);
            leftover.subtract(base);
            return self.changeset.add(leftover);
        }

        let base = base.clone();
        let mut added = rrset;
        if let Some(pending) = self.changeset.take_addition(added.owner(), added.rtype()) {
            added.union(&pending);
        }
        self.changeset.remove(base)?;
        self.changeset.add(added)
    }

    /// Remove records.
    ///
    /// Records that are not present are ignored. Records that were added
    /// earlier in this transaction are withdrawn.
    pub fn remove(&mut self, rrset: Rrset) -> Result<(), ChangesetError> {
        let leftover = self.changeset.cancel_addition(&rrset);
        let Some(base) = self.base.rrset(rrset.owner(), rrset.rtype()) else {
            return Ok(());
        };

        // Removals carry the TTL of the existing RRset.
        let mut removed = base.empty_like();
        for rdata in leftover.rdata() {
            if base.contains(rdata) {
                removed.push(rdata.clone());
            }
        }
        self.changeset.remove(removed)
    }

    /// Remove the whole RRset of a type at a name.
    pub fn remove_rrset(&mut self, owner: &StoredName, rtype: Rtype) -> Result<(), ChangesetError> {
        match self.rrset(owner, rtype) {
            Some(rrset) => self.remove(rrset),
            None => Ok(()),
        }
    }

    /// Replace the apex SOA record.
    pub fn replace_soa(&mut self, soa: Rrset) -> Result<(), ChangesetError> {
        let apex = self.base.apex().clone();
        self.changeset.take_addition(&apex, Rtype::SOA);
        self.remove_rrset(&apex, Rtype::SOA)?;
        self.add(soa)
    }
}

//============ Tests ===========================================================
