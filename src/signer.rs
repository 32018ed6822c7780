//! Signing zones.
//!
//! Key management and the cryptography of DNSSEC are not part of Weir. A
//! [`ZoneSigner`] is handed the new contents of a zone and returns the changes
//! to its signatures (and denial-of-existence records) as a changeset.

use std::fmt;

use domain::base::Rtype;

use crate::zonedata::{Changeset, ZoneContents};

//----------- ZoneSigner -------------------------------------------------------

/// A service that signs zones.
///
/// Signing can be expensive; it is always called from a blocking thread.
pub trait ZoneSigner: Send + Sync {
    /// Sign new contents of a zone.
    ///
    /// The returned changeset must apply cleanly to `contents`.
    fn sign(&self, contents: &ZoneContents, scope: SignScope<'_>) -> Result<Signed, SignError>;
}

/// What to sign.
#[derive(Copy, Clone, Debug)]
pub enum SignScope<'a> {
    /// Re-sign the entire zone.
    Full,

    /// Sign only what the given changeset touched.
    Incremental(&'a Changeset),
}

impl SignScope<'_> {
    /// Whether the entire zone is re-signed.
    pub const fn is_full(&self) -> bool {
        matches!(self, Self::Full)
    }
}

/// The result of signing.
#[derive(Clone, Debug)]
pub struct Signed {
    /// The changes to the signatures of the zone.
    pub changeset: Changeset,

    /// When the zone must be re-signed next.
    pub next_resign: jiff::Timestamp,
}

/// Whether the keys or the NSEC3 parameters at the apex changed.
///
/// If they did, every signature in the zone is stale.
pub fn apex_keys_changed(old: &ZoneContents, new: &ZoneContents) -> bool {
    [Rtype::DNSKEY, Rtype::NSEC3PARAM].into_iter().any(|rtype| {
        old.rrset(old.apex(), rtype) != new.rrset(new.apex(), rtype)
    })
}

//============ Errors ==========================================================

//----------- SignError --------------------------------------------------------

/// An error when signing a zone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignError(pub String);

impl std::error::Error for SignError {}

impl fmt::Display for SignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "signing failed: {}", self.0)
    }
}

//============ Tests ===========================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use domain::base::{Rtype, Ttl, iana::Class};

    use super::apex_keys_changed;
    use crate::zonedata::{Rdata, Rrset, StoredName, ZoneContents};

    fn zone_with_key(key: &'static [u8]) -> ZoneContents {
        let apex = StoredName::from_str("example.").unwrap();
        let mut contents = ZoneContents::new(apex.clone(), Class::IN);
        let rrset = Rrset::with_rdata(
            apex,
            Rtype::DNSKEY,
            Class::IN,
            Ttl::from_secs(3600),
            [Rdata::from(key)],
        );
        contents.insert(rrset).unwrap();
        contents
    }

    #[test]
    fn key_changes() {
        let old = zone_with_key(b"one");
        assert!(!apex_keys_changed(&old, &zone_with_key(b"one")));
        assert!(apex_keys_changed(&old, &zone_with_key(b"two")));

        let empty = ZoneContents::new(old.apex().clone(), Class::IN);
        assert!(apex_keys_changed(&old, &empty));
    }
}
