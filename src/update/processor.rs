//! Processing batches of update requests.
//!
//! All requests in a batch are applied to one transaction, in the order they
//! were queued. The batch is committed as a whole, or not at all.

use domain::base::iana::Rcode;
use tracing::{debug, warn};

use crate::update::pipeline::{Committed, Cycle, CycleState, PipelineContext};
use crate::update::{UpdateError, UpdateMessage, UpdateRequest, ddns, prereq};
use crate::zone::Zone;
use crate::zonedata::ZoneUpdate;

/// Process a batch of requests for a zone without a primary.
///
/// Every request in the batch is answered. If a request fails, it is answered
/// with the code of its failure and the others with SERVFAIL; if the commit
/// fails, all are answered with the code of that failure.
pub async fn execute_batch(
    ctx: &PipelineContext,
    zone: &Zone,
    batch: Vec<UpdateRequest>,
) -> Result<Committed, UpdateError> {
    let mut cycle = Cycle::new(zone);

    let Some(base) = zone.contents.load() else {
        let error = UpdateError::ServerFailure;
        cycle.fail(&error);
        respond_all(batch, error.rcode());
        return Err(error);
    };

    cycle.enter(CycleState::Validating);
    let mut update = ZoneUpdate::new(base);
    let mut failure = None;
    for (index, request) in batch.iter().enumerate() {
        match process_request(&mut update, &request.message) {
            Ok(()) => {
                debug!(zone = %zone.name, client = %request.client, id = request.message.id, "Accepted an update");
            }
            Err(error) => {
                warn!(
                    zone = %zone.name,
                    client = %request.client,
                    id = request.message.id,
                    "Rejected an update: {error}"
                );
                failure = Some((index, error));
                break;
            }
        }
    }

    if let Some((index, error)) = failure {
        cycle.fail(&error);

        // The failing request learns why; the others were caught up in it.
        let rcode = error.rcode();
        for (i, request) in batch.into_iter().enumerate() {
            request.respond(if i == index { rcode } else { Rcode::SERVFAIL });
        }
        return Err(error);
    }

    if let Err(error) = ddns::finalize_serial(&mut update, zone.config.serial_policy) {
        cycle.fail(&error);
        respond_all(batch, error.rcode());
        return Err(error);
    }

    match cycle.commit(ctx, update).await {
        Ok(committed) => {
            respond_all(batch, Rcode::NOERROR);
            Ok(committed)
        }
        Err(error) => {
            respond_all(batch, error.rcode());
            Err(error)
        }
    }
}

/// Check and apply a single request.
fn process_request(update: &mut ZoneUpdate, message: &UpdateMessage) -> Result<(), UpdateError> {
    prereq::check(update, &message.prerequisites)?;
    ddns::prescan(update.base().apex(), update.base().class(), &message.updates)?;
    ddns::apply(update, &message.updates)
}

/// Answer all requests with the same code.
fn respond_all(batch: Vec<UpdateRequest>, rcode: Rcode) {
    for request in batch {
        request.respond(rcode);
    }
}
