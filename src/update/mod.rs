//! Processing dynamic updates.
//!
//! Requests arrive already parsed, as [`UpdateMessage`]s. They are queued per
//! zone, and a worker drains the queue in batches:
//!
//! - For a zone with a primary server, every request is forwarded to the
//!   primary on its own ([`forward`]).
//!
//! - Otherwise, the batch is checked ([`prereq`]) and applied ([`ddns`]) to a
//!   single transaction, which is then committed ([`pipeline`]). A batch
//!   succeeds or fails as a whole ([`processor`]).
//!
//! Every request is answered exactly once: [`UpdateRequest`] is consumed by
//! responding to it.

use std::{fmt, net::SocketAddr};

use bytes::Bytes;
use domain::base::{
    Rtype, Ttl,
    iana::{Class, Rcode},
};
use tokio::sync::oneshot;
use tracing::debug;

use crate::zonedata::{ChangesetError, JournalError, PatchError, Rdata, Rrset, StoredName};

pub mod ddns;
pub mod forward;
pub mod pipeline;
pub mod prereq;
pub mod processor;

//----------- UpdateMessage ----------------------------------------------------

/// A parsed DNS UPDATE message.
#[derive(Clone, Debug)]
pub struct UpdateMessage {
    /// The message ID.
    pub id: u16,

    /// The name of the zone, from the zone section.
    pub zone: StoredName,

    /// The class of the zone, from the zone section.
    pub zone_class: Class,

    /// The record type in the zone section; must be SOA.
    pub zone_rtype: Rtype,

    /// The prerequisite section.
    pub prerequisites: Vec<UpdateRecord>,

    /// The update section.
    pub updates: Vec<UpdateRecord>,

    /// The transaction signature, if the message was signed.
    pub tsig: Option<Tsig>,
}

/// A record in the prerequisite or update section.
///
/// RFC 2136 overloads the class (and TTL) of these records; they cannot be
/// represented as [`Rrset`]s until their meaning has been determined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateRecord {
    /// The owner name.
    pub owner: StoredName,

    /// The class; the zone class, ANY or NONE.
    pub class: Class,

    /// The record type.
    pub rtype: Rtype,

    /// The TTL.
    pub ttl: Ttl,

    /// The record data; possibly empty.
    pub rdata: Rdata,
}

impl UpdateRecord {
    /// This record as an RRset in the given class.
    pub fn to_rrset(&self, class: Class) -> Rrset {
        Rrset::with_rdata(
            self.owner.clone(),
            self.rtype,
            class,
            self.ttl,
            [self.rdata.clone()],
        )
    }
}

/// A verified transaction signature.
///
/// The signature has been checked by the wire layer; the trailer is kept so
/// that the response can be signed in turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tsig {
    /// The name of the key used.
    pub key: StoredName,

    /// The TSIG record, in wire format.
    pub trailer: Bytes,
}

//----------- Transport --------------------------------------------------------

/// How a request was received.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Transport {
    /// Over UDP.
    Datagram,

    /// Over TCP (or another stream transport).
    Stream,
}

//----------- UpdateRequest ----------------------------------------------------

/// A queued update request.
#[derive(Debug)]
pub struct UpdateRequest {
    /// The request message.
    pub message: UpdateMessage,

    /// How the request was received.
    pub transport: Transport,

    /// The client that sent the request.
    pub client: SocketAddr,

    /// Where to send the response.
    responder: oneshot::Sender<UpdateResponse>,
}

impl UpdateRequest {
    /// Construct a new [`UpdateRequest`].
    ///
    /// The response will be delivered through the returned receiver.
    pub fn new(
        message: UpdateMessage,
        transport: Transport,
        client: SocketAddr,
    ) -> (Self, oneshot::Receiver<UpdateResponse>) {
        let (responder, rx) = oneshot::channel();
        let request = Self {
            message,
            transport,
            client,
            responder,
        };
        (request, rx)
    }

    /// Respond with a response code.
    pub fn respond(self, rcode: Rcode) {
        let response = UpdateResponse {
            id: self.message.id,
            rcode,
            tsig: self.message.tsig.clone(),
        };
        self.respond_with(response);
    }

    /// Respond with a prepared response.
    pub fn respond_with(self, response: UpdateResponse) {
        if self.responder.send(response).is_err() {
            debug!(client = %self.client, "The client is gone, dropping the response");
        }
    }
}

//----------- UpdateResponse ---------------------------------------------------

/// The response to an update request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateResponse {
    /// The message ID; that of the request.
    pub id: u16,

    /// The response code.
    pub rcode: Rcode,

    /// The transaction signature of the request, to sign the response with.
    pub tsig: Option<Tsig>,
}

//============ Errors ==========================================================

//----------- UpdateError ------------------------------------------------------

/// An error when processing an update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateError {
    /// An internal function was misused.
    InvalidArgument,

    /// Memory could not be allocated.
    OutOfMemory,

    /// The request or a record in it is malformed.
    MalformedData,

    /// A prerequisite did not hold; the response code says which.
    PrerequisiteFailed(Rcode),

    /// The update would not increase the serial of the zone.
    SerialConflict,

    /// An added record does not match the TTL of its RRset.
    TtlConflict,

    /// A record is outside the zone.
    NotZone,

    /// The zone is not served here, or the request is not authorized.
    NotAuth,

    /// The zone could not be signed.
    SigningFailed(String),

    /// The changes could not be journaled.
    PersistenceFailed(String),

    /// The request could not be forwarded to the primary.
    ForwardingFailed(String),

    /// Some other internal failure.
    ServerFailure,
}

impl UpdateError {
    /// The response code this error is reported with.
    pub fn rcode(&self) -> Rcode {
        match self {
            Self::MalformedData => Rcode::FORMERR,
            Self::PrerequisiteFailed(rcode) => *rcode,
            Self::SerialConflict | Self::TtlConflict => Rcode::REFUSED,
            Self::NotZone => Rcode::NOTZONE,
            Self::NotAuth => Rcode::NOTAUTH,
            Self::InvalidArgument
            | Self::OutOfMemory
            | Self::SigningFailed(_)
            | Self::PersistenceFailed(_)
            | Self::ForwardingFailed(_)
            | Self::ServerFailure => Rcode::SERVFAIL,
        }
    }
}

impl std::error::Error for UpdateError {}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => f.write_str("invalid argument"),
            Self::OutOfMemory => f.write_str("out of memory"),
            Self::MalformedData => f.write_str("malformed data"),
            Self::PrerequisiteFailed(rcode) => write!(f, "prerequisite failed ({rcode})"),
            Self::SerialConflict => f.write_str("the SOA serial would not increase"),
            Self::TtlConflict => f.write_str("the TTL does not match the existing RRset"),
            Self::NotZone => f.write_str("a record is outside the zone"),
            Self::NotAuth => f.write_str("not authoritative"),
            Self::SigningFailed(reason) => write!(f, "signing failed: {reason}"),
            Self::PersistenceFailed(reason) => write!(f, "journaling failed: {reason}"),
            Self::ForwardingFailed(reason) => write!(f, "forwarding failed: {reason}"),
            Self::ServerFailure => f.write_str("internal server failure"),
        }
    }
}

//--- Conversion

impl From<ChangesetError> for UpdateError {
    fn from(value: ChangesetError) -> Self {
        match value {
            ChangesetError::OutOfMemory => Self::OutOfMemory,
        }
    }
}

impl From<PatchError> for UpdateError {
    fn from(value: PatchError) -> Self {
        match value {
            PatchError::OutOfMemory => Self::OutOfMemory,
            PatchError::TtlMismatch => Self::TtlConflict,
            PatchError::OutOfZone => Self::NotZone,
            PatchError::MissingRecord | PatchError::DuplicateRecord | PatchError::MissingSoa => {
                Self::ServerFailure
            }
        }
    }
}

impl From<JournalError> for UpdateError {
    fn from(value: JournalError) -> Self {
        Self::PersistenceFailed(value.to_string())
    }
}

//============ Tests ===========================================================
