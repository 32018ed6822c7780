//! Forwarding updates to a primary.
//!
//! A secondary cannot change its zone; it relays update requests to the
//! primary and relays the answers back. Every request is forwarded on its own,
//! under a fresh message ID, and over the transport it arrived on. The answer
//! is returned to the client under the original ID and with the original
//! transaction signature.

use std::{fmt, net::SocketAddr, time::Duration};

use async_trait::async_trait;
use domain::base::iana::Rcode;
use tracing::{debug, error, info};

use crate::update::{Transport, UpdateMessage, UpdateRequest, UpdateResponse};
use crate::zonedata::StoredName;

//----------- Forwarder --------------------------------------------------------

/// A way to send update requests to another server.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Send an update to a server and wait for its response.
    async fn forward(
        &self,
        primary: SocketAddr,
        transport: Transport,
        message: UpdateMessage,
    ) -> Result<UpdateResponse, ForwardError>;
}

/// Forward a batch of requests to a primary.
///
/// A failure to forward one request is answered with SERVFAIL and does not
/// affect the others.
pub async fn forward_batch(
    forwarder: &dyn Forwarder,
    zone: &StoredName,
    primary: SocketAddr,
    timeout: Duration,
    batch: Vec<UpdateRequest>,
) {
    let count = batch.len();
    let mut ids = foldhash::HashSet::default();
    for request in batch {
        // Every forwarded request gets its own ID.
        let id = loop {
            let id = fastrand::u16(..);
            if ids.insert(id) {
                break id;
            }
        };
        forward_one(forwarder, zone, primary, timeout, id, request).await;
    }
    info!(zone = %zone, %primary, count, "UPDATEs forwarded");
}

/// Forward one request to a primary.
async fn forward_one(
    forwarder: &dyn Forwarder,
    zone: &StoredName,
    primary: SocketAddr,
    timeout: Duration,
    id: u16,
    request: UpdateRequest,
) {
    let mut message = request.message.clone();
    message.id = id;

    let forwarded = forwarder.forward(primary, request.transport, message);
    let result = tokio::time::timeout(timeout, forwarded)
        .await
        .unwrap_or(Err(ForwardError::Timeout));

    match result {
        Ok(mut response) => {
            debug!(
                zone = %zone,
                client = %request.client,
                rcode = %response.rcode,
                "Relaying the response of the primary"
            );
            response.id = request.message.id;
            response.tsig = request.message.tsig.clone();
            request.respond_with(response);
        }
        Err(err) => {
            error!(
                zone = %zone,
                client = %request.client,
                %primary,
                "Failed to forward an update: {err}"
            );
            request.respond(Rcode::SERVFAIL);
        }
    }
}

//============ Errors ==========================================================

//----------- ForwardError -----------------------------------------------------

/// An error when forwarding an update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForwardError {
    /// The primary did not respond in time.
    Timeout,

    /// The request could not be sent or the response received.
    Transport(String),
}

impl std::error::Error for ForwardError {}

impl fmt::Display for ForwardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("the primary did not respond in time"),
            Self::Transport(reason) => write!(f, "transport failure: {reason}"),
        }
    }
}

//--- Conversion

impl From<ForwardError> for crate::update::UpdateError {
    fn from(value: ForwardError) -> Self {
        Self::ForwardingFailed(value.to_string())
    }
}
