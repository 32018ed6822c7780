//! One side of a changeset.
//!
//! This module provides [`DiffSection`]. A changeset holds two of them: the
//! records it adds and the records it removes. Sections are small compared to
//! zones, and are built once and traversed a few times (for patching, the
//! journal, and outgoing transfers), so they favour simplicity over lookup
//! performance.

use std::collections::{BTreeMap, btree_map};

use domain::base::Rtype;

use crate::{ChangesetError, OwnerKey, Rrset, StoredName};

//----------- DiffSection ------------------------------------------------------

/// The RRsets on one side of a changeset.
///
/// Owners are kept in canonical order. At each owner, RRsets are kept in the
/// order in which their type was first inserted; inserting more records of a
/// type that is already present extends the existing RRset instead.
#[derive(Clone, Debug, Default)]
pub struct DiffSection {
    /// The RRsets at each owner.
    ///
    /// ## Invariants
    ///
    /// - `no-empty`: no owner maps to an empty list, and no listed RRset is
    ///   empty.
    owners: BTreeMap<OwnerKey, Vec<Rrset>>,

    /// The number of RRsets across all owners.
    len: usize,
}

impl DiffSection {
    /// Construct a new, empty [`DiffSection`].
    pub const fn new() -> Self {
        Self {
            owners: BTreeMap::new(),
            len: 0,
        }
    }

    /// The number of (owner, RRset) entries.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether this section is empty.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.owners.clear();
        self.len = 0;
    }
}

impl DiffSection {
    /// Insert an RRset.
    ///
    /// If an RRset of the same type and class exists at the owner, the records
    /// are merged into it. Inserting records that are all present already has
    /// no effect. Returns whether a new entry was created.
    pub fn insert(&mut self, rrset: Rrset) -> Result<bool, ChangesetError> {
        if rrset.is_empty() {
            return Ok(false);
        }

        let entries = match self.owners.entry(OwnerKey::from(rrset.owner())) {
            btree_map::Entry::Occupied(entry) => entry.into_mut(),
            btree_map::Entry::Vacant(entry) => entry.insert(Vec::new()),
        };

        if let Some(existing) = entries.iter_mut().find(|e| e.same_set(&rrset)) {
            existing.union(&rrset);
            return Ok(false);
        }

        if entries.try_reserve(1).is_err() {
            if entries.is_empty() {
                self.owners.remove(&OwnerKey::from(rrset.owner()));
            }
            return Err(ChangesetError::OutOfMemory);
        }
        entries.push(rrset);
        self.len += 1;
        Ok(true)
    }

    /// Cancel the records of an RRset out of this section.
    ///
    /// The records of `rrset` that are present here are removed. The records
    /// that were not present are returned, as an RRset with the same key and
    /// TTL as `rrset` (possibly empty).
    pub fn cancel(&mut self, rrset: &Rrset) -> Rrset {
        let key = OwnerKey::from(rrset.owner());
        let Some(entries) = self.owners.get_mut(&key) else {
            return rrset.clone();
        };
        let Some(index) = entries.iter().position(|e| e.same_set(rrset)) else {
            return rrset.clone();
        };

        let existing = &mut entries[index];
        let mut leftover = rrset.empty_like();
        for rdata in rrset.rdata() {
            if !existing.remove(rdata) {
                leftover.push(rdata.clone());
            }
        }

        if existing.is_empty() {
            entries.remove(index);
            self.len -= 1;
            if entries.is_empty() {
                self.owners.remove(&key);
            }
        }

        leftover
    }

    /// Remove the whole RRset of a type at an owner.
    pub fn take(&mut self, owner: &StoredName, rtype: Rtype) -> Option<Rrset> {
        let key = OwnerKey::from(owner);
        let entries = self.owners.get_mut(&key)?;
        let index = entries.iter().position(|e| e.rtype() == rtype)?;
        let rrset = entries.remove(index);
        self.len -= 1;
        if entries.is_empty() {
            self.owners.remove(&key);
        }
        Some(rrset)
    }
}

impl DiffSection {
    /// The RRset of a type at an owner.
    pub fn get(&self, owner: &StoredName, rtype: Rtype) -> Option<&Rrset> {
        self.at(owner).iter().find(|e| e.rtype() == rtype)
    }

    /// The RRsets at an owner, in insertion order.
    pub fn at(&self, owner: &StoredName) -> &[Rrset] {
        self.owners
            .get(&OwnerKey::from(owner))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether all the records of an RRset are present.
    pub fn contains(&self, rrset: &Rrset) -> bool {
        self.at(rrset.owner())
            .iter()
            .any(|e| e.same_set(rrset) && e.contains_all(rrset))
    }

    /// The owners with entries, in canonical order.
    pub fn owners(&self) -> impl Iterator<Item = (&OwnerKey, &[Rrset])> + '_ {
        self.owners.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// All entries, in canonical owner order.
    pub fn rrsets(&self) -> impl Iterator<Item = &Rrset> + '_ {
        self.owners.values().flatten()
    }
}

//============ Tests ===========================================================
