//! Applying the update section of a request.
//!
//! See RFC 2136, section 3.4. The update section is scanned in full before
//! any of it is applied; records are then applied in order to the transaction.
//! Records that make no sense for the zone (a CNAME next to other data, an SOA
//! below the apex, removal of the apex SOA) are silently skipped, as the RFC
//! requires.

use domain::base::{Rtype, Serial, iana::Class};
use jiff::{Timestamp, Zoned, tz::TimeZone};
use tracing::debug;

use crate::cfg::SerialPolicy;
use crate::update::{UpdateError, UpdateRecord};
use crate::zonedata::{Rrset, StoredName, ZoneUpdate, is_in_zone, names_eq};

//----------- Prescan ----------------------------------------------------------

/// Check the shape of the update section.
pub fn prescan(
    apex: &StoredName,
    zone_class: Class,
    updates: &[UpdateRecord],
) -> Result<(), UpdateError> {
    for record in updates {
        if !is_in_zone(&record.owner, apex) {
            return Err(UpdateError::NotZone);
        }

        if record.class == zone_class {
            if is_meta(record.rtype) || record.rtype == Rtype::ANY {
                return Err(UpdateError::MalformedData);
            }
        } else if record.class == Class::ANY {
            if record.ttl.as_secs() != 0 || !record.rdata.is_empty() || is_meta(record.rtype) {
                return Err(UpdateError::MalformedData);
            }
        } else if record.class == Class::NONE {
            if record.ttl.as_secs() != 0 || is_meta(record.rtype) || record.rtype == Rtype::ANY {
                return Err(UpdateError::MalformedData);
            }
        } else {
            return Err(UpdateError::MalformedData);
        }
    }

    Ok(())
}

/// Whether a type only exists in queries or transfers.
fn is_meta(rtype: Rtype) -> bool {
    [
        Rtype::AXFR,
        Rtype::IXFR,
        Rtype::MAILA,
        Rtype::MAILB,
        Rtype::OPT,
        Rtype::TSIG,
    ]
    .contains(&rtype)
}

//----------- Processing -------------------------------------------------------

/// Apply the update section of a request to a transaction.
///
/// The section must have passed [`prescan()`].
pub fn apply(update: &mut ZoneUpdate, updates: &[UpdateRecord]) -> Result<(), UpdateError> {
    let zone_class = update.base().class();
    for record in updates {
        if record.class == zone_class {
            add_record(update, record, zone_class)?;
        } else if record.class == Class::ANY {
            if record.rtype == Rtype::ANY {
                delete_name(update, &record.owner)?;
            } else {
                delete_rrset(update, record)?;
            }
        } else {
            delete_record(update, record, zone_class)?;
        }
    }
    Ok(())
}

/// Add a record to an RRset.
fn add_record(
    update: &mut ZoneUpdate,
    record: &UpdateRecord,
    zone_class: Class,
) -> Result<(), UpdateError> {
    let owner = &record.owner;

    if record.rtype == Rtype::SOA {
        if !names_eq(owner, update.base().apex()) {
            debug!(%owner, "Ignoring an SOA record below the apex");
            return Ok(());
        }
        let new = record.rdata.soa_serial().ok_or(UpdateError::MalformedData)?;
        let current = update.serial().ok_or(UpdateError::ServerFailure)?;
        if new <= current {
            debug!(%current, %new, "Refusing an SOA record that does not increase the serial");
            return Err(UpdateError::SerialConflict);
        }
        update.replace_soa(record.to_rrset(zone_class))?;
        return Ok(());
    }

    // A CNAME cannot coexist with other data.
    if record.rtype == Rtype::CNAME {
        let conflict = update
            .rrsets_at(owner)
            .iter()
            .any(|r| !may_coexist_with_cname(r.rtype()));
        if conflict {
            debug!(%owner, "Ignoring a CNAME next to other data");
            return Ok(());
        }
        // There is only one CNAME per name; a new one replaces the old.
        if let Some(existing) = update.rrset(owner, Rtype::CNAME)
            && !existing.contains(&record.rdata)
        {
            update.remove(existing)?;
        }
    } else if !may_coexist_with_cname(record.rtype)
        && update.rrset(owner, Rtype::CNAME).is_some()
    {
        debug!(%owner, rtype = %record.rtype, "Ignoring data next to a CNAME");
        return Ok(());
    }

    if record.rtype != Rtype::RRSIG
        && let Some(existing) = update.rrset(owner, record.rtype)
        && existing.ttl() != record.ttl
    {
        return Err(UpdateError::TtlConflict);
    }

    update.add(record.to_rrset(zone_class))?;
    Ok(())
}

/// Whether a type may share an owner name with a CNAME.
fn may_coexist_with_cname(rtype: Rtype) -> bool {
    [Rtype::CNAME, Rtype::RRSIG, Rtype::NSEC].contains(&rtype)
}

/// Delete an RRset.
fn delete_rrset(update: &mut ZoneUpdate, record: &UpdateRecord) -> Result<(), UpdateError> {
    if is_apex_protected(update, &record.owner, record.rtype) {
        debug!(rtype = %record.rtype, "Ignoring deletion of an apex RRset");
        return Ok(());
    }
    update.remove_rrset(&record.owner, record.rtype)?;
    Ok(())
}

/// Delete all RRsets at a name.
fn delete_name(update: &mut ZoneUpdate, owner: &StoredName) -> Result<(), UpdateError> {
    for rrset in update.rrsets_at(owner) {
        if is_apex_protected(update, owner, rrset.rtype()) {
            continue;
        }
        update.remove(rrset)?;
    }
    Ok(())
}

/// Delete a record from an RRset.
fn delete_record(
    update: &mut ZoneUpdate,
    record: &UpdateRecord,
    zone_class: Class,
) -> Result<(), UpdateError> {
    if record.rtype == Rtype::SOA {
        debug!("Ignoring deletion of an SOA record");
        return Ok(());
    }

    // The last name server of the zone cannot be deleted.
    if record.rtype == Rtype::NS
        && names_eq(&record.owner, update.base().apex())
        && let Some(ns) = update.rrset(&record.owner, Rtype::NS)
        && ns.len() == 1
        && ns.contains(&record.rdata)
    {
        debug!("Ignoring deletion of the last apex NS record");
        return Ok(());
    }

    update.remove(record.to_rrset(zone_class))?;
    Ok(())
}

/// Whether an RRset is at the apex and may not be deleted as a whole.
fn is_apex_protected(update: &ZoneUpdate, owner: &StoredName, rtype: Rtype) -> bool {
    (rtype == Rtype::SOA || rtype == Rtype::NS) && names_eq(owner, update.base().apex())
}

//----------- Serials ----------------------------------------------------------

/// Make sure a changed zone gets a new serial.
///
/// If the transaction changed the zone but not its SOA, the SOA is replaced
/// with one carrying the next serial according to the policy.
pub fn finalize_serial(update: &mut ZoneUpdate, policy: SerialPolicy) -> Result<(), UpdateError> {
    if update.is_empty() || update.changeset().soa_added().is_some() {
        return Ok(());
    }

    let soa = update.soa().ok_or(UpdateError::ServerFailure)?;
    let rdata = soa.rdata().first().ok_or(UpdateError::ServerFailure)?;
    let previous = rdata.soa_serial().ok_or(UpdateError::MalformedData)?;
    let serial = next_serial(policy, previous);

    let rdata = rdata
        .with_soa_serial(serial)
        .ok_or(UpdateError::MalformedData)?;
    let new = Rrset::with_rdata(
        soa.owner().clone(),
        Rtype::SOA,
        soa.class(),
        soa.ttl(),
        [rdata],
    );
    update.replace_soa(new)?;
    Ok(())
}

/// Determine the serial following another one.
///
/// The result is always greater than `previous`.
pub fn next_serial(policy: SerialPolicy, previous: Serial) -> Serial {
    let serial = match policy {
        SerialPolicy::Counter => return previous.add(1),
        SerialPolicy::UnixTime => Serial::now(),
        SerialPolicy::DateCounter => {
            let zone = Zoned::new(Timestamp::now(), TimeZone::UTC);
            let serial = ((zone.year() as u32 * 100 + zone.month() as u32) * 100
                + zone.day() as u32)
                * 100;
            Serial::from(serial)
        }
    };

    if serial <= previous {
        previous.add(1)
    } else {
        serial
    }
}

//============ Tests ===========================================================
