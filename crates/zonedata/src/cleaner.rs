//! Cleaning old versions of zones.

use std::{sync::Arc, time::Duration};

use domain::base::Serial;
use tracing::trace;

use crate::ZoneContents;

//----------- Retired ----------------------------------------------------------

/// A snapshot that has been replaced.
///
/// Readers that loaded the snapshot before it was replaced may still be using
/// it. A [`Retired`] tracks it until they are done, and then releases it.
#[derive(Debug)]
pub struct Retired {
    /// The replaced snapshot.
    contents: Arc<ZoneContents>,
}

impl Retired {
    /// Construct a new [`Retired`].
    pub(crate) const fn new(contents: Arc<ZoneContents>) -> Self {
        Self { contents }
    }

    /// The serial of the replaced snapshot.
    pub fn serial(&self) -> Option<Serial> {
        self.contents.serial()
    }

    /// The number of readers still holding the snapshot.
    pub fn readers(&self) -> usize {
        Arc::strong_count(&self.contents) - 1
    }

    /// Whether no reader holds the snapshot any more.
    pub fn is_quiescent(&self) -> bool {
        self.readers() == 0
    }

    /// Wait until no reader holds the snapshot, then release it.
    ///
    /// The readers are checked every `poll` interval. Large zones can take a
    /// while to deallocate, so that happens on a blocking thread.
    pub async fn reclaim(self, poll: Duration) {
        while !self.is_quiescent() {
            trace!(readers = self.readers(), "Waiting for readers of a retired snapshot");
            tokio::time::sleep(poll).await;
        }

        let serial = self.serial();
        let contents = self.contents;
        let _ = tokio::task::spawn_blocking(move || drop(contents)).await;
        trace!(?serial, "Reclaimed a retired snapshot");
    }
}

//============ Tests ===========================================================
