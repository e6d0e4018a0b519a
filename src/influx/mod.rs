//! Join-surge defense: raid state machine, suspicion heuristics, siege
//! mode, and per-author message-flood control.

pub mod guard;

pub use guard::{InfluxGuard, RaidPhase, SuspiciousJoin};
