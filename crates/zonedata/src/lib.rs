//! Zone data for Weir.
//!
//! This crate holds everything needed to mutate an authoritative zone while
//! it is being served. It provides the following functionality:
//!
//! - Immutable, reference-counted snapshots of zone contents.
//! - Changesets: the difference between two versions of a zone.
//! - Ordered iteration over changesets, and merging of consecutive ones.
//! - Update transactions, which accumulate changes against a fixed base.
//! - Building new snapshots from a base and a changeset (copy-on-write).
//! - Publishing snapshots to readers, and reclaiming the ones they left.
//! - The journal contract through which changesets are persisted.
//!
//! # Design
//!
//! A zone's _contents_ are the DNS records making up the zone. Readers (the
//! query path, zone transfers) always see one complete version of them, which
//! they obtain through a [`SnapshotCell`]. A published [`ZoneContents`] value
//! is never modified again.
//!
//! A new version is produced by opening a [`ZoneUpdate`] against the current
//! snapshot. The transaction records additions and removals in a
//! [`Changeset`], and can answer questions about the zone as it would look
//! with those changes applied. Nothing is copied while the transaction is open.
//!
//! Once the transaction is complete, [`ZoneContents::patched()`] builds the
//! new snapshot. Nodes of the zone are shared between snapshots through
//! [`Arc`](std::sync::Arc)s; only the nodes touched by the changeset are
//! duplicated. The old snapshot stays valid until every reader has let go of
//! it, after which a [`Retired`] handle reclaims it.
//!
//! ## Ordering
//!
//! Owner names are kept in canonical DNS order (RFC 4034, section 6.1): names
//! are compared label by label starting from the rightmost label, and labels
//! are compared as case-insensitive octet strings. [`OwnerKey`] implements
//! this order, so that the maps in this crate can be traversed in it directly.

use std::{
    cmp, fmt,
    hash::{Hash, Hasher},
    iter::Peekable,
};

use bytes::Bytes;
use domain::base::Name;

mod rrset;
pub use rrset::{Rdata, Rrset};

mod diff;
pub use diff::DiffSection;

mod changeset;
pub use changeset::{Changeset, ChangesetError, Side};

mod iter;
pub use iter::{ChangesetIter, Changes, IterMode};

mod data;
pub use data::{Node, ZoneContents};

mod writer;
pub use writer::PatchError;

mod transaction;
pub use transaction::ZoneUpdate;

mod viewer;
pub use viewer::SnapshotCell;

mod cleaner;
pub use cleaner::Retired;

mod persister;
pub use persister::{Journal, JournalError, MemoryJournal};

//============ Helpers =========================================================

/// The owned domain name type used throughout Weir.
pub type StoredName = Name<Bytes>;

//----------- OwnerKey ---------------------------------------------------------

/// A domain name, compared in canonical DNS order.
///
/// Comparison and hashing ignore ASCII case, so two keys are equal exactly
/// when the names are equal as DNS names.
#[derive(Clone)]
pub struct OwnerKey(StoredName);

impl OwnerKey {
    /// Wrap a name.
    pub const fn new(name: StoredName) -> Self {
        Self(name)
    }

    /// The wrapped name.
    pub const fn name(&self) -> &StoredName {
        &self.0
    }

    /// Unwrap the name.
    pub fn into_name(self) -> StoredName {
        self.0
    }
}

impl From<StoredName> for OwnerKey {
    fn from(value: StoredName) -> Self {
        Self(value)
    }
}

impl From<&StoredName> for OwnerKey {
    fn from(value: &StoredName) -> Self {
        Self(value.clone())
    }
}

impl PartialEq for OwnerKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for OwnerKey {}

impl PartialOrd for OwnerKey {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OwnerKey {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        canonical_cmp(self.0.as_slice(), other.0.as_slice())
    }
}

impl Hash for OwnerKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.as_slice() {
            state.write_u8(byte.to_ascii_lowercase());
        }
    }
}

impl fmt::Debug for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerKey({})", self.0)
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

//----------- canonical_cmp() --------------------------------------------------

/// The maximum number of non-root labels in a domain name.
const MAX_LABELS: usize = 127;

/// Locate the non-root labels of an uncompressed wire-format name.
///
/// Returns the offsets of the length octets, in order, and their count.
fn label_offsets(wire: &[u8]) -> ([u8; MAX_LABELS], usize) {
    let mut offsets = [0u8; MAX_LABELS];
    let mut count = 0;
    let mut pos = 0usize;
    while let Some(&len) = wire.get(pos) {
        if len == 0 || count == MAX_LABELS {
            break;
        }
        // Wire names are at most 255 octets long, so offsets fit.
        offsets[count] = pos as u8;
        count += 1;
        pos += 1 + len as usize;
    }
    (offsets, count)
}

/// The content of the label at the given offset.
fn label_at(wire: &[u8], offset: u8) -> &[u8] {
    let start = offset as usize + 1;
    let len = wire[offset as usize] as usize;
    wire.get(start..start + len).unwrap_or_default()
}

/// Compare two labels as case-insensitive octet strings.
fn label_cmp(left: &[u8], right: &[u8]) -> cmp::Ordering {
    left.iter()
        .map(u8::to_ascii_lowercase)
        .cmp(right.iter().map(u8::to_ascii_lowercase))
}

/// Compare two wire-format names in canonical DNS order.
fn canonical_cmp(left: &[u8], right: &[u8]) -> cmp::Ordering {
    let (left_offsets, left_count) = label_offsets(left);
    let (right_offsets, right_count) = label_offsets(right);

    let shared = left_count.min(right_count);
    for i in 1..=shared {
        let l = label_at(left, left_offsets[left_count - i]);
        let r = label_at(right, right_offsets[right_count - i]);
        match label_cmp(l, r) {
            cmp::Ordering::Equal => {}
            other => return other,
        }
    }

    // All shared labels are equal; the name with fewer labels is an ancestor
    // of the other and sorts first.
    left_count.cmp(&right_count)
}

/// Whether `name` is equal to or below `apex`.
pub fn is_in_zone(name: &StoredName, apex: &StoredName) -> bool {
    let (name_wire, apex_wire) = (name.as_slice(), apex.as_slice());
    let (name_offsets, name_count) = label_offsets(name_wire);
    let (apex_offsets, apex_count) = label_offsets(apex_wire);

    if apex_count > name_count {
        return false;
    }

    (1..=apex_count).all(|i| {
        let n = label_at(name_wire, name_offsets[name_count - i]);
        let a = label_at(apex_wire, apex_offsets[apex_count - i]);
        label_cmp(n, a).is_eq()
    })
}

/// Whether two names are equal, ignoring ASCII case.
pub fn names_eq(left: &StoredName, right: &StoredName) -> bool {
    canonical_cmp(left.as_slice(), right.as_slice()).is_eq()
}

//----------- merge() ----------------------------------------------------------

/// Merge sorted iterators.
///
/// Each step yields, for every input, the smallest pending item if it is equal
/// to the overall smallest pending item, and `None` otherwise.
fn merge<T: Ord, I: IntoIterator<Item = T>, const N: usize>(
    iters: [I; N],
) -> impl Iterator<Item = [Option<T>; N]> {
    struct Merge<T: Ord, I: Iterator<Item = T>, const N: usize>([Peekable<I>; N]);

    impl<T: Ord, I: Iterator<Item = T>, const N: usize> Iterator for Merge<T, I, N> {
        type Item = [Option<T>; N];

        fn next(&mut self) -> Option<Self::Item> {
            let set = self.0.each_mut().map(|e| e.peek());
            let min = set.iter().cloned().flatten().min()?;
            let used = set.map(|e| e == Some(min));
            let mut index = 0usize;
            Some(self.0.each_mut().map(|i| {
                let used = used[index];
                index += 1;
                i.next_if(|_| used)
            }))
        }
    }

    Merge(iters.map(|i| i.into_iter().peekable()))
}

//============ Tests ===========================================================
