//! Weir
//!
//! Transactional dynamic updates (RFC 2136) for authoritative DNS zones.
//!
//! Update requests are queued per zone and processed in batches. A batch is
//! checked and applied to a single [`ZoneUpdate`](zonedata::ZoneUpdate)
//! transaction, whose changeset is used to build a new version of the zone.
//! Signed zones are re-signed, the final changeset is journaled, and only then
//! is the new version published to readers. Zones with a primary server have
//! their updates forwarded instead.

pub use weir_cfg as cfg;
pub use weir_zonedata as zonedata;

pub mod center;
pub mod events;
pub mod log;
pub mod signer;
pub mod update;
pub mod zone;

#[cfg(test)]
mod tests;
