//! Checking update prerequisites.
//!
//! See RFC 2136, section 3.2. Prerequisites are checked against the zone as it
//! looks within the current transaction, so that a request sees the changes
//! made by requests earlier in the same batch.

use domain::base::{
    Rtype,
    iana::{Class, Rcode},
};

use crate::update::{UpdateError, UpdateRecord};
use crate::zonedata::{Rrset, ZoneUpdate, is_in_zone};

/// Check the prerequisites of a request.
pub fn check(update: &ZoneUpdate, prerequisites: &[UpdateRecord]) -> Result<(), UpdateError> {
    let apex = update.base().apex();
    let zone_class = update.base().class();

    // RRsets that must exist exactly as given, grouped by owner and type.
    let mut required: Vec<Rrset> = Vec::new();

    for record in prerequisites {
        if record.ttl.as_secs() != 0 {
            return Err(UpdateError::MalformedData);
        }
        if !is_in_zone(&record.owner, apex) {
            return Err(UpdateError::NotZone);
        }

        if record.class == Class::ANY {
            if !record.rdata.is_empty() {
                return Err(UpdateError::MalformedData);
            }
            if record.rtype == Rtype::ANY {
                // Name is in use.
                if !update.name_in_use(&record.owner) {
                    return Err(UpdateError::PrerequisiteFailed(Rcode::NXDOMAIN));
                }
            } else if update.rrset(&record.owner, record.rtype).is_none() {
                // RRset exists (value independent).
                return Err(UpdateError::PrerequisiteFailed(Rcode::NXRRSET));
            }
        } else if record.class == Class::NONE {
            if !record.rdata.is_empty() {
                return Err(UpdateError::MalformedData);
            }
            if record.rtype == Rtype::ANY {
                // Name is not in use.
                if update.name_in_use(&record.owner) {
                    return Err(UpdateError::PrerequisiteFailed(Rcode::YXDOMAIN));
                }
            } else if update.rrset(&record.owner, record.rtype).is_some() {
                // RRset does not exist.
                return Err(UpdateError::PrerequisiteFailed(Rcode::YXRRSET));
            }
        } else if record.class == zone_class {
            // RRset exists (value dependent); checked once all are collected.
            let rrset = record.to_rrset(zone_class);
            match required.iter_mut().find(|r| r.same_set(&rrset)) {
                Some(existing) => {
                    existing.union(&rrset);
                }
                None => required.push(rrset),
            }
        } else {
            return Err(UpdateError::MalformedData);
        }
    }

    for rrset in required {
        match update.rrset(rrset.owner(), rrset.rtype()) {
            Some(current) if current == rrset => {}
            _ => return Err(UpdateError::PrerequisiteFailed(Rcode::NXRRSET)),
        }
    }

    Ok(())
}

//============ Tests ===========================================================
