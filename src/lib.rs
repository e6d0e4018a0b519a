//! Warden - Community Integrity Protection Engine
//!
//! An always-on guardian for a chat community: it reverses destructive
//! administrative actions in real time, defends against join surges and
//! message floods, keeps full structural snapshots for disaster
//! recovery, and supervises a protected voice room.
//!
//! Key principles:
//! - The remote platform is the system of record; the engine observes
//!   events and remediates, it never assumes its own writes stuck
//! - Trusted principals (and the owner) are exempt from enforcement
//! - No remote error escapes a handler; remediation is best-effort and
//!   every failure is logged and, when critical, reported to the owner

pub mod alert;
pub mod dispatcher;
pub mod engine;
pub mod influx;
pub mod integrity;
pub mod journal;
pub mod platform;
pub mod sentinel;
pub mod snapshot;
pub mod trust;
