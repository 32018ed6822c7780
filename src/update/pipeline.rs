//! Committing transactions.
//!
//! A transaction is committed in stages. The new contents of the zone are
//! built from the changeset, signed if the zone is signed, and the final
//! changeset is journaled. Only then are the new contents published. A failure
//! at any stage leaves the published contents untouched; everything built so
//! far is dropped.

use std::{fmt, sync::Arc, time::Duration};

use domain::base::Serial;
use jiff::Timestamp;
use tracing::{info, trace, warn};

use crate::events::{ZoneEvent, ZoneEvents};
use crate::signer::{SignScope, ZoneSigner, apex_keys_changed};
use crate::update::UpdateError;
use crate::zone::Zone;
use crate::zonedata::{Changeset, Journal, ZoneContents, ZoneUpdate};

//----------- PipelineContext --------------------------------------------------

/// What the pipeline needs beyond the zone itself.
#[derive(Clone)]
pub struct PipelineContext {
    /// Where committed changesets are stored.
    pub journal: Arc<dyn Journal>,

    /// The signer for signed zones.
    pub signer: Option<Arc<dyn ZoneSigner>>,

    /// Where to report zone events.
    pub events: ZoneEvents,

    /// How often to check whether retired snapshots can be released.
    pub reclaim_interval: Duration,
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("signer", &self.signer.is_some())
            .field("events", &self.events)
            .field("reclaim_interval", &self.reclaim_interval)
            .finish_non_exhaustive()
    }
}

//----------- CycleState -------------------------------------------------------

/// The stage an update cycle is in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CycleState {
    /// Requests are waiting to be processed.
    Queued,

    /// Prerequisites and updates are being checked.
    Validating,

    /// The new contents are being built.
    Building,

    /// The new contents are being signed.
    Signing,

    /// The changeset is being journaled.
    Persisting,

    /// The new contents have been published.
    Committed,

    /// The cycle failed; nothing was published.
    Failed,
}

impl CycleState {
    /// Whether the cycle is over.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Failed)
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Queued => "queued",
            Self::Validating => "validating",
            Self::Building => "building",
            Self::Signing => "signing",
            Self::Persisting => "persisting",
            Self::Committed => "committed",
            Self::Failed => "failed",
        })
    }
}

//----------- Committed --------------------------------------------------------

/// The outcome of a committed cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Committed {
    /// The serial before the cycle.
    pub old_serial: Option<Serial>,

    /// The serial after the cycle.
    pub new_serial: Option<Serial>,

    /// Whether the serial changed, i.e. new contents were published.
    pub changed: bool,
}

//----------- Cycle ------------------------------------------------------------

/// An update cycle of a zone.
#[derive(Debug)]
pub struct Cycle<'a> {
    /// The zone being updated.
    zone: &'a Zone,

    /// The current stage.
    state: CycleState,
}

impl<'a> Cycle<'a> {
    /// Start a new cycle.
    pub fn new(zone: &'a Zone) -> Self {
        Self {
            zone,
            state: CycleState::Queued,
        }
    }

    /// The current stage.
    pub const fn state(&self) -> CycleState {
        self.state
    }

    /// Move to a new stage.
    ///
    /// ## Panics
    ///
    /// Panics if the cycle is already over.
    pub fn enter(&mut self, state: CycleState) {
        assert!(
            !self.state.is_terminal(),
            "a finished update cycle cannot continue"
        );
        trace!(zone = %self.zone.name, from = %self.state, to = %state, "Update cycle moved");
        self.state = state;
    }

    /// Fail the cycle.
    ///
    /// Nothing built during the cycle is kept; the published contents of the
    /// zone remain as they were.
    pub fn fail(&mut self, error: &UpdateError) {
        let stage = self.state;
        self.enter(CycleState::Failed);
        warn!(zone = %self.zone.name, %stage, "Update failed, rolling back: {error}");
    }

    /// Commit a transaction.
    ///
    /// If the transaction made no changes, nothing is published. On failure,
    /// the cycle has been failed already.
    pub async fn commit(
        &mut self,
        ctx: &PipelineContext,
        update: ZoneUpdate,
    ) -> Result<Committed, UpdateError> {
        match self.try_commit(ctx, update).await {
            Ok(committed) => Ok(committed),
            Err(error) => {
                self.fail(&error);
                Err(error)
            }
        }
    }

    async fn try_commit(
        &mut self,
        ctx: &PipelineContext,
        update: ZoneUpdate,
    ) -> Result<Committed, UpdateError> {
        let zone = self.zone;
        let (base, changeset) = update.into_parts();
        let old_serial = base.serial();

        if changeset.is_empty() {
            self.enter(CycleState::Committed);
            info!(zone = %zone.name, "No change to zone made");
            return Ok(Committed {
                old_serial,
                new_serial: old_serial,
                changed: false,
            });
        }

        self.enter(CycleState::Building);
        let contents = base.patched(&changeset)?;

        let (contents, changeset, next_resign) = if zone.config.dnssec {
            self.enter(CycleState::Signing);
            let (contents, changeset, next_resign) =
                self.sign(ctx, &base, contents, changeset).await?;
            (contents, changeset, Some(next_resign))
        } else {
            (contents, changeset, None)
        };

        self.enter(CycleState::Persisting);
        let journal = ctx.journal.clone();
        let name = zone.name.clone();
        tokio::task::spawn_blocking(move || journal.append(&name, &changeset))
            .await
            .map_err(|err| UpdateError::PersistenceFailed(err.to_string()))??;

        let new_serial = contents.serial();
        if let Some(retired) = zone.contents.publish(Arc::new(contents)) {
            tokio::spawn(retired.reclaim(ctx.reclaim_interval));
        }
        // Release our hold on the retired snapshot.
        drop(base);
        self.enter(CycleState::Committed);

        let changed = new_serial != old_serial;
        match (old_serial, new_serial) {
            (Some(old), Some(new)) => info!(zone = %zone.name, "Serial {old} -> {new}"),
            _ => info!(zone = %zone.name, "Published new contents"),
        }

        if let Some(at) = next_resign
            && zone.schedule_resign(at)
        {
            ctx.events.emit(ZoneEvent::Resign {
                zone: zone.name.clone(),
                at,
            });
        }
        if zone.config.flush_immediately {
            ctx.events.emit(ZoneEvent::Flush {
                zone: zone.name.clone(),
            });
        }
        if changed && let Some(serial) = new_serial {
            ctx.events.emit(ZoneEvent::Notify {
                zone: zone.name.clone(),
                serial,
            });
        }

        Ok(Committed {
            old_serial,
            new_serial,
            changed,
        })
    }

    /// Sign the new contents.
    ///
    /// The signatures are applied to the contents directly, and merged into
    /// the changeset. The signer's next resign deadline is returned as well.
    async fn sign(
        &mut self,
        ctx: &PipelineContext,
        base: &ZoneContents,
        contents: ZoneContents,
        changeset: Changeset,
    ) -> Result<(ZoneContents, Changeset, Timestamp), UpdateError> {
        let zone = self.zone;
        let signer = ctx
            .signer
            .clone()
            .ok_or_else(|| UpdateError::SigningFailed("no signer is configured".into()))?;

        let full = apex_keys_changed(base, &contents);
        trace!(zone = %zone.name, full, "Signing the new contents");

        let (result, mut contents, mut changeset) = tokio::task::spawn_blocking(move || {
            let scope = if full {
                SignScope::Full
            } else {
                SignScope::Incremental(&changeset)
            };
            let result = signer.sign(&contents, scope);
            (result, contents, changeset)
        })
        .await
        .map_err(|err| UpdateError::SigningFailed(err.to_string()))?;
        let signed = result.map_err(|err| UpdateError::SigningFailed(err.0))?;

        contents.patch_in_place(&signed.changeset)?;
        changeset.merge(&signed.changeset)?;

        Ok((contents, changeset, signed.next_resign))
    }
}

//============ Tests ===========================================================
