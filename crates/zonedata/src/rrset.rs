//! Resource record sets.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use domain::base::{Rtype, Serial, Ttl, iana::Class};

use crate::{StoredName, names_eq};

//----------- Rdata ------------------------------------------------------------

/// The data of a single resource record.
///
/// This is the uncompressed wire format of the record data. [`Rdata`] values
/// are ordered bytewise, which is the canonical order of record data within an
/// RRset (RFC 4034, section 6.3).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rdata(Bytes);

impl Rdata {
    /// The offset of the serial field, counted from the end of SOA rdata.
    const SOA_SERIAL_FROM_END: usize = 20;

    /// Construct empty record data.
    ///
    /// Empty record data is used by the RFC 2136 deletion and prerequisite
    /// forms.
    pub const fn empty() -> Self {
        Self(Bytes::new())
    }

    /// Build the record data of an SOA record.
    ///
    /// `timers` holds the refresh, retry, expire and minimum fields, in that
    /// order.
    pub fn soa(mname: &StoredName, rname: &StoredName, serial: Serial, timers: [u32; 4]) -> Self {
        let mut buf = BytesMut::with_capacity(
            mname.as_slice().len() + rname.as_slice().len() + Self::SOA_SERIAL_FROM_END,
        );
        buf.put_slice(mname.as_slice());
        buf.put_slice(rname.as_slice());
        buf.put_u32(serial.0);
        for timer in timers {
            buf.put_u32(timer);
        }
        Self(buf.freeze())
    }

    /// The wire-format bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Whether the record data is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Interpret this as SOA record data and extract the serial.
    ///
    /// Returns [`None`] if the data is too short to be an SOA.
    pub fn soa_serial(&self) -> Option<Serial> {
        let start = self.0.len().checked_sub(Self::SOA_SERIAL_FROM_END)?;
        let bytes: [u8; 4] = self.0.get(start..start + 4)?.try_into().ok()?;
        Some(Serial(u32::from_be_bytes(bytes)))
    }

    /// Interpret this as SOA record data and replace the serial.
    ///
    /// Returns [`None`] if the data is too short to be an SOA.
    pub fn with_soa_serial(&self, serial: Serial) -> Option<Self> {
        let start = self.0.len().checked_sub(Self::SOA_SERIAL_FROM_END)?;
        let mut buf = BytesMut::from(&self.0[..]);
        buf[start..start + 4].copy_from_slice(&serial.0.to_be_bytes());
        Some(Self(buf.freeze()))
    }
}

//--- Conversion

impl From<Bytes> for Rdata {
    fn from(value: Bytes) -> Self {
        Self(value)
    }
}

impl From<Vec<u8>> for Rdata {
    fn from(value: Vec<u8>) -> Self {
        Self(value.into())
    }
}

impl From<&'static [u8]> for Rdata {
    fn from(value: &'static [u8]) -> Self {
        Self(Bytes::from_static(value))
    }
}

//--- Formatting

impl fmt::Debug for Rdata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Rdata(")?;
        for byte in self.0.iter() {
            write!(f, "{byte:02x}")?;
        }
        f.write_str(")")
    }
}

//----------- Rrset ------------------------------------------------------------

/// A resource record set.
///
/// An RRset collects all records sharing an owner name, type and class. The
/// record data is kept sorted and free of duplicates, so that RRsets can be
/// compared and combined cheaply.
///
/// Two RRsets are equal if their owner, type, class, and record data match.
/// The TTL is not considered.
#[derive(Clone)]
pub struct Rrset {
    /// The owner name.
    owner: StoredName,

    /// The record type.
    rtype: Rtype,

    /// The record class.
    class: Class,

    /// The TTL shared by all records.
    ttl: Ttl,

    /// The record data.
    ///
    /// ## Invariants
    ///
    /// - `sorted`: the elements are strictly ascending.
    rdata: Vec<Rdata>,
}

impl Rrset {
    /// Construct an empty [`Rrset`].
    pub const fn new(owner: StoredName, rtype: Rtype, class: Class, ttl: Ttl) -> Self {
        Self {
            owner,
            rtype,
            class,
            ttl,
            rdata: Vec::new(),
        }
    }

    /// Construct an [`Rrset`] from some record data.
    pub fn with_rdata(
        owner: StoredName,
        rtype: Rtype,
        class: Class,
        ttl: Ttl,
        rdata: impl IntoIterator<Item = Rdata>,
    ) -> Self {
        let mut rdata: Vec<_> = rdata.into_iter().collect();
        rdata.sort_unstable();
        rdata.dedup();
        Self {
            owner,
            rtype,
            class,
            ttl,
            rdata,
        }
    }

    /// Construct an empty [`Rrset`] with the same key and TTL as this one.
    pub fn empty_like(&self) -> Self {
        Self::new(self.owner.clone(), self.rtype, self.class, self.ttl)
    }
}

impl Rrset {
    /// The owner name.
    pub const fn owner(&self) -> &StoredName {
        &self.owner
    }

    /// The record type.
    pub const fn rtype(&self) -> Rtype {
        self.rtype
    }

    /// The record class.
    pub const fn class(&self) -> Class {
        self.class
    }

    /// The TTL.
    pub const fn ttl(&self) -> Ttl {
        self.ttl
    }

    /// Change the TTL.
    pub fn set_ttl(&mut self, ttl: Ttl) {
        self.ttl = ttl;
    }

    /// The record data, in canonical order.
    pub fn rdata(&self) -> &[Rdata] {
        &self.rdata
    }

    /// The number of records.
    pub fn len(&self) -> usize {
        self.rdata.len()
    }

    /// Whether there are no records.
    pub fn is_empty(&self) -> bool {
        self.rdata.is_empty()
    }

    /// Whether this and another RRset have the same owner, type and class.
    pub fn same_set(&self, other: &Self) -> bool {
        self.rtype == other.rtype && self.class == other.class && names_eq(&self.owner, &other.owner)
    }

    /// Whether a record is present.
    pub fn contains(&self, rdata: &Rdata) -> bool {
        self.rdata.binary_search(rdata).is_ok()
    }

    /// Add a record.
    ///
    /// Returns whether the record was not already present.
    pub fn push(&mut self, rdata: Rdata) -> bool {
        match self.rdata.binary_search(&rdata) {
            Ok(_) => false,
            Err(index) => {
                self.rdata.insert(index, rdata);
                true
            }
        }
    }

    /// Remove a record.
    ///
    /// Returns whether the record was present.
    pub fn remove(&mut self, rdata: &Rdata) -> bool {
        match self.rdata.binary_search(rdata) {
            Ok(index) => {
                self.rdata.remove(index);
                true
            }
            Err(_) => false,
        }
    }

    /// Add all the records of another RRset.
    ///
    /// Returns the number of records that were not already present.
    pub fn union(&mut self, other: &Self) -> usize {
        let ours = std::mem::take(&mut self.rdata);
        let mut rdata = Vec::with_capacity(ours.len() + other.rdata.len());
        let mut added = 0;
        for [ours, theirs] in crate::merge([ours, other.rdata.clone()]) {
            match [ours, theirs] {
                [Some(r), _] => rdata.push(r),
                [None, Some(r)] => {
                    added += 1;
                    rdata.push(r);
                }
                [None, None] => unreachable!(),
            }
        }
        self.rdata = rdata;
        added
    }

    /// Remove all the records of another RRset.
    ///
    /// Returns the number of records that were present and removed.
    pub fn subtract(&mut self, other: &Self) -> usize {
        let before = self.rdata.len();
        self.rdata.retain(|r| !other.contains(r));
        before - self.rdata.len()
    }

    /// Whether every record of another RRset is present in this one.
    pub fn contains_all(&self, other: &Self) -> bool {
        other.rdata.iter().all(|r| self.contains(r))
    }

    /// Iterate over single-record RRsets, one per record.
    pub fn split(&self) -> impl Iterator<Item = Rrset> + '_ {
        self.rdata.iter().map(|r| {
            let mut single = self.empty_like();
            single.rdata.push(r.clone());
            single
        })
    }
}

impl PartialEq for Rrset {
    fn eq(&self, other: &Self) -> bool {
        self.same_set(other) && self.rdata == other.rdata
    }
}

impl Eq for Rrset {}

impl fmt::Debug for Rrset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rrset")
            .field("owner", &format_args!("{}", self.owner))
            .field("rtype", &self.rtype)
            .field("class", &self.class)
            .field("ttl", &self.ttl.as_secs())
            .field("rdata", &self.rdata)
            .finish()
    }
}

//============ Tests ===========================================================
