//! The contents of a zone.
//!
//! This module provides [`ZoneContents`], one complete version of the records
//! in a zone. Contents are built once (by loading, or by patching a previous
//! version) and are immutable after being published.
//!
//! # Implementation
//!
//! The records are grouped into [`Node`]s, one per owner name, kept in a
//! B-tree map in canonical order. Nodes are reference-counted, so that a new
//! version can share all the nodes that a changeset did not touch with the
//! version it was built from. Cloning [`ZoneContents`] copies the map but not
//! the nodes.

use std::{collections::BTreeMap, sync::Arc};

use domain::base::{Rtype, Serial, iana::Class};

use crate::{OwnerKey, PatchError, Rrset, StoredName, is_in_zone};

//----------- ZoneContents -----------------------------------------------------

/// The records of one version of a zone.
#[derive(Clone, Debug)]
pub struct ZoneContents {
    /// The apex name.
    apex: StoredName,

    /// The class of the zone.
    class: Class,

    /// The nodes of the zone.
    ///
    /// ## Invariants
    ///
    /// - `no-empty`: every node has at least one RRset, and no RRset is empty.
    pub(crate) nodes: BTreeMap<OwnerKey, Arc<Node>>,
}

impl ZoneContents {
    /// Construct new, empty [`ZoneContents`].
    pub const fn new(apex: StoredName, class: Class) -> Self {
        Self {
            apex,
            class,
            nodes: BTreeMap::new(),
        }
    }

    /// The apex name.
    pub const fn apex(&self) -> &StoredName {
        &self.apex
    }

    /// The class of the zone.
    pub const fn class(&self) -> Class {
        self.class
    }

    /// Insert an RRset while loading the zone.
    ///
    /// The records are merged into an existing RRset of the same type, if
    /// any; its TTL is kept.
    pub fn insert(&mut self, rrset: Rrset) -> Result<(), PatchError> {
        if !is_in_zone(rrset.owner(), &self.apex) {
            return Err(PatchError::OutOfZone);
        }
        if rrset.is_empty() {
            return Ok(());
        }

        let node = self
            .nodes
            .entry(OwnerKey::from(rrset.owner()))
            .or_insert_with(|| Arc::new(Node::new(rrset.owner().clone())));
        let node = Arc::make_mut(node);
        match node.rrset_mut(rrset.rtype()) {
            Some(existing) => {
                existing.union(&rrset);
            }
            None => node.rrsets.push(rrset),
        }
        Ok(())
    }
}

impl ZoneContents {
    /// The SOA RRset at the apex.
    pub fn soa(&self) -> Option<&Rrset> {
        self.rrset(&self.apex, Rtype::SOA)
    }

    /// The SOA serial.
    pub fn serial(&self) -> Option<Serial> {
        self.soa()?.rdata().first()?.soa_serial()
    }

    /// The node at a name.
    pub fn node(&self, owner: &StoredName) -> Option<&Arc<Node>> {
        self.nodes.get(&OwnerKey::from(owner))
    }

    /// The RRset of a type at a name.
    pub fn rrset(&self, owner: &StoredName, rtype: Rtype) -> Option<&Rrset> {
        self.node(owner)?.rrset(rtype)
    }

    /// Whether any records exist at a name.
    pub fn contains_name(&self, owner: &StoredName) -> bool {
        self.node(owner).is_some()
    }

    /// All nodes, in canonical order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.values().map(|n| &**n)
    }

    /// All RRsets, in canonical owner order.
    pub fn rrsets(&self) -> impl Iterator<Item = &Rrset> + '_ {
        self.nodes().flat_map(|n| n.rrsets.iter())
    }

    /// The number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The number of RRsets.
    pub fn rrset_count(&self) -> usize {
        self.nodes.values().map(|n| n.rrsets.len()).sum()
    }
}

//----------- Node -------------------------------------------------------------

/// The records at one owner name.
#[derive(Clone, Debug)]
pub struct Node {
    /// The owner name.
    owner: StoredName,

    /// The RRsets, one per type, in insertion order.
    pub(crate) rrsets: Vec<Rrset>,
}

impl Node {
    /// Construct a new, empty [`Node`].
    pub(crate) const fn new(owner: StoredName) -> Self {
        Self {
            owner,
            rrsets: Vec::new(),
        }
    }

    /// The owner name.
    pub const fn owner(&self) -> &StoredName {
        &self.owner
    }

    /// The RRsets at this node.
    pub fn rrsets(&self) -> &[Rrset] {
        &self.rrsets
    }

    /// The RRset of a type.
    pub fn rrset(&self, rtype: Rtype) -> Option<&Rrset> {
        self.rrsets.iter().find(|r| r.rtype() == rtype)
    }

    /// The RRset of a type, mutably.
    pub(crate) fn rrset_mut(&mut self, rtype: Rtype) -> Option<&mut Rrset> {
        self.rrsets.iter_mut().find(|r| r.rtype() == rtype)
    }
}

//============ Tests ===========================================================
