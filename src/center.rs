//! Weir's central command.

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use domain::base::{Rtype, iana::Rcode};
use tracing::{debug, error, info, warn};

use crate::cfg::{Config, ZoneConfig};
use crate::update::forward::{Forwarder, forward_batch};
use crate::update::pipeline::PipelineContext;
use crate::update::processor::execute_batch;
use crate::update::{UpdateError, UpdateRequest};
use crate::zone::Zone;
use crate::zonedata::{OwnerKey, StoredName, ZoneContents, names_eq};

//----------- Center -----------------------------------------------------------

/// Weir's central command.
pub struct Center {
    /// The configuration.
    pub config: Config,

    /// Known zones.
    ///
    /// Each zone is locked separately; this lock is only held to look zones
    /// up or register them.
    zones: Mutex<foldhash::HashMap<OwnerKey, Arc<Zone>>>,

    /// What update cycles need.
    pub context: PipelineContext,

    /// How updates to secondary zones reach their primaries.
    pub forwarder: Option<Arc<dyn Forwarder>>,
}

impl fmt::Debug for Center {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Center")
            .field("config", &self.config)
            .field("zones", &self.zones)
            .field("context", &self.context)
            .field("forwarder", &self.forwarder.is_some())
            .finish()
    }
}

impl Center {
    /// Construct a new [`Center`].
    ///
    /// The zones in the configuration are registered without contents.
    pub fn new(
        config: Config,
        context: PipelineContext,
        forwarder: Option<Arc<dyn Forwarder>>,
    ) -> Self {
        let zones = config
            .zones
            .iter()
            .map(|zone| {
                let key = OwnerKey::from(&zone.name);
                (key, Arc::new(Zone::new(zone.clone(), None)))
            })
            .collect();

        Self {
            config,
            zones: Mutex::new(zones),
            context,
            forwarder,
        }
    }

    /// Look up a zone.
    pub fn zone(&self, name: &StoredName) -> Option<Arc<Zone>> {
        let zones = self.zones.lock().unwrap();
        zones.get(&OwnerKey::from(name)).cloned()
    }

    /// Register a zone.
    pub fn add_zone(
        &self,
        config: ZoneConfig,
        contents: Option<ZoneContents>,
    ) -> Result<Arc<Zone>, ZoneAddError> {
        if let Some(contents) = &contents
            && (!names_eq(contents.apex(), &config.name) || contents.soa().is_none())
        {
            return Err(ZoneAddError::InvalidContents);
        }

        let mut zones = self.zones.lock().unwrap();
        let key = OwnerKey::from(&config.name);
        if zones.contains_key(&key) {
            return Err(ZoneAddError::AlreadyExists);
        }

        let zone = Arc::new(Zone::new(config, contents));
        zones.insert(key, zone.clone());
        info!("Added zone '{}'", zone.name);
        Ok(zone)
    }
}

//--- Actions

/// Accept an update request.
///
/// The request is checked and queued for its zone. If the zone is idle, a
/// worker is started for it. Requests that cannot be queued are answered
/// immediately.
pub fn enqueue(center: &Arc<Center>, request: UpdateRequest) {
    let zone = match intake(center, &request) {
        Ok(zone) => zone,
        Err(error) => {
            warn!(
                zone = %request.message.zone,
                client = %request.client,
                id = request.message.id,
                "Refused an update: {error}"
            );
            request.respond(error.rcode());
            return;
        }
    };

    if zone.enqueue(request) {
        debug!(zone = %zone.name, "Starting an update worker");
        tokio::spawn(run_worker(center.clone(), zone));
    }
}

/// Check whether a request can be queued.
fn intake(center: &Center, request: &UpdateRequest) -> Result<Arc<Zone>, UpdateError> {
    let message = &request.message;
    if message.zone_rtype != Rtype::SOA {
        return Err(UpdateError::MalformedData);
    }

    let zone = center.zone(&message.zone).ok_or(UpdateError::NotAuth)?;

    let authorized = zone.config.update_keys.is_empty()
        || message.tsig.as_ref().is_some_and(|tsig| {
            zone.config
                .update_keys
                .iter()
                .any(|key| names_eq(key, &tsig.key))
        });
    if !authorized {
        return Err(UpdateError::NotAuth);
    }

    if zone.is_secondary() {
        return Ok(zone);
    }

    let class = zone.contents.read(|contents| contents.map(|c| c.class()));
    match class {
        None => Err(UpdateError::ServerFailure),
        Some(class) if class != message.zone_class => Err(UpdateError::NotAuth),
        Some(_) => Ok(zone),
    }
}

/// Process the queued requests of a zone until there are none left.
async fn run_worker(center: Arc<Center>, zone: Arc<Zone>) {
    while let Some(batch) = zone.take_batch() {
        debug!(zone = %zone.name, requests = batch.len(), "Processing a batch of updates");

        if let Some(primary) = zone.config.primary {
            let Some(forwarder) = &center.forwarder else {
                error!(zone = %zone.name, "No forwarder is configured for a secondary zone");
                for request in batch {
                    request.respond(Rcode::SERVFAIL);
                }
                continue;
            };
            let timeout = center.config.updates.forward_timeout;
            forward_batch(&**forwarder, &zone.name, primary, timeout, batch).await;
        } else {
            // Failures have been answered and logged already.
            let _ = execute_batch(&center.context, &zone, batch).await;
        }
    }
    debug!(zone = %zone.name, "Update worker finished");
}

//============ Errors ==========================================================

//----------- ZoneAddError -----------------------------------------------------

/// An error adding a zone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ZoneAddError {
    /// A zone of the same name already exists.
    AlreadyExists,

    /// The contents do not belong to the zone, or lack an SOA record.
    InvalidContents,
}

impl std::error::Error for ZoneAddError {}

impl fmt::Display for ZoneAddError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AlreadyExists => "a zone of this name already exists",
            Self::InvalidContents => "the contents are not valid for the zone",
        })
    }
}
