//! Viewing zones.
//!
//! This module provides [`SnapshotCell`], through which the current contents
//! of a zone are published to readers. Readers never lock: they load the
//! current snapshot once and keep using it, even if a newer one is published
//! in the meantime. Publishing swaps the snapshot atomically, so a reader sees
//! either the old version or the new one in full.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::{Retired, ZoneContents};

//----------- SnapshotCell -----------------------------------------------------

/// The published contents of a zone.
///
/// A zone might not have any contents yet (e.g. before it is first loaded).
#[derive(Debug, Default)]
pub struct SnapshotCell {
    /// The current snapshot.
    current: ArcSwapOption<ZoneContents>,
}

impl SnapshotCell {
    /// Construct a new [`SnapshotCell`].
    pub fn new(contents: Option<Arc<ZoneContents>>) -> Self {
        Self {
            current: ArcSwapOption::new(contents),
        }
    }

    /// Take a reference to the current snapshot.
    ///
    /// The snapshot remains valid for as long as the returned [`Arc`] is held.
    pub fn load(&self) -> Option<Arc<ZoneContents>> {
        self.current.load_full()
    }

    /// Read the current snapshot without taking a long-lived reference.
    pub fn read<R>(&self, f: impl FnOnce(Option<&ZoneContents>) -> R) -> R {
        let guard = self.current.load();
        f(guard.as_deref())
    }

    /// Publish new contents.
    ///
    /// The previous snapshot, if any, is returned so that it can be reclaimed
    /// once no reader holds it any more.
    pub fn publish(&self, contents: Arc<ZoneContents>) -> Option<Retired> {
        self.current.swap(Some(contents)).map(Retired::new)
    }
}

//============ Tests ===========================================================
