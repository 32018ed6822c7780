//! Iterating over changesets.

use std::{cmp, slice};

use crate::{Changeset, DiffSection, OwnerKey, Rrset, Side};

//----------- IterMode ---------------------------------------------------------

/// Which sections of a changeset to iterate over.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IterMode {
    /// Only the added RRsets.
    Add,

    /// Only the removed RRsets.
    Remove,

    /// Both sections.
    ///
    /// At each owner, the added RRsets precede the removed ones.
    All,
}

//----------- Changes ----------------------------------------------------------

/// An iterator over the changes in a changeset, with their sides.
///
/// Owners are visited in canonical order, and RRsets at an owner in the order
/// they were inserted. Owners without entries are never visited. Iteration
/// ends with [`None`], and is fused.
pub struct Changes<'a> {
    /// The owners with entries, across the selected sections.
    owners: Box<dyn Iterator<Item = [Option<OwnerEntries<'a>>; 2]> + 'a>,

    /// The pending added RRsets at the current owner.
    added: slice::Iter<'a, Rrset>,

    /// The pending removed RRsets at the current owner.
    removed: slice::Iter<'a, Rrset>,
}

impl<'a> Changes<'a> {
    /// Begin iterating over a changeset.
    pub(crate) fn new(changeset: &'a Changeset, mode: IterMode) -> Self {
        let (add, remove) = match mode {
            IterMode::Add => (true, false),
            IterMode::Remove => (false, true),
            IterMode::All => (true, true),
        };

        let owners = crate::merge([
            section_owners(changeset.additions(), add),
            section_owners(changeset.removals(), remove),
        ]);

        Self {
            owners: Box::new(owners),
            added: [].iter(),
            removed: [].iter(),
        }
    }
}

impl<'a> Iterator for Changes<'a> {
    type Item = (Side, &'a Rrset);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(rrset) = self.added.find(|r| !r.is_empty()) {
                return Some((Side::Add, rrset));
            }
            if let Some(rrset) = self.removed.find(|r| !r.is_empty()) {
                return Some((Side::Remove, rrset));
            }

            let [added, removed] = self.owners.next()?;
            self.added = added.map_or(&[][..], |e| e.1).iter();
            self.removed = removed.map_or(&[][..], |e| e.1).iter();
        }
    }
}

//----------- ChangesetIter ----------------------------------------------------

/// An iterator over the RRsets of a changeset.
///
/// This is created by [`Changeset::iter()`]. It borrows the changeset and does
/// not modify it; to iterate again, create a new iterator.
pub struct ChangesetIter<'a> {
    /// The underlying iterator.
    inner: Changes<'a>,
}

impl<'a> ChangesetIter<'a> {
    /// Begin iterating over a changeset.
    pub(crate) fn new(changeset: &'a Changeset, mode: IterMode) -> Self {
        Self {
            inner: Changes::new(changeset, mode),
        }
    }
}

impl<'a> Iterator for ChangesetIter<'a> {
    type Item = &'a Rrset;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, rrset)| rrset)
    }
}

//----------- OwnerEntries -----------------------------------------------------

/// The entries at an owner, ordered by the owner.
struct OwnerEntries<'a>(&'a OwnerKey, &'a [Rrset]);

impl PartialEq for OwnerEntries<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for OwnerEntries<'_> {}

impl PartialOrd for OwnerEntries<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OwnerEntries<'_> {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.0.cmp(other.0)
    }
}

/// The owners of a section, or nothing if the section is not selected.
fn section_owners<'a>(
    section: &'a DiffSection,
    selected: bool,
) -> Box<dyn Iterator<Item = OwnerEntries<'a>> + 'a> {
    if !selected {
        return Box::new(std::iter::empty());
    }
    Box::new(
        section
            .owners()
            .map(|(owner, entries)| OwnerEntries(owner, entries)),
    )
}

//============ Tests ===========================================================

#[cfg(test)]
mod tests {
    use domain::base::Rtype;

    use crate::{
        Changeset, IterMode,
        testing::{name, rrset, txt},
    };

    #[test]
    fn empty_changeset() {
        let ch = Changeset::new(name("example."));
        for mode in [IterMode::Add, IterMode::Remove, IterMode::All] {
            let mut it = ch.iter(mode);
            assert!(it.next().is_none());
            assert!(it.next().is_none());
        }
    }

    #[test]
    fn cancelled_owners_are_skipped() {
        let mut ch = Changeset::new(name("example."));
        let gone = rrset("a.example.", Rtype::TXT, txt("x"));
        ch.add(gone.clone()).unwrap();
        ch.add(rrset("b.example.", Rtype::TXT, txt("y"))).unwrap();
        ch.cancel_addition(&gone);

        let owners: Vec<_> = ch.iter(IterMode::All).map(|r| r.owner().clone()).collect();
        assert_eq!(owners, vec![name("b.example.")]);
    }

    #[test]
    fn restartable() {
        let mut ch = Changeset::new(name("example."));
        ch.add(rrset("a.example.", Rtype::TXT, txt("x"))).unwrap();
        ch.remove(rrset("b.example.", Rtype::TXT, txt("y"))).unwrap();

        let first: Vec<_> = ch.iter(IterMode::All).collect();
        let second: Vec<_> = ch.iter(IterMode::All).collect();
        assert_eq!(first, second);
        assert_eq!(ch.iter(IterMode::Add).count(), 1);
        assert_eq!(ch.iter(IterMode::Remove).count(), 1);
        assert_eq!(ch.size(), 2);
    }
}
