//! Anti-sabotage enforcement: ledger correlation, burst tracking, and
//! remediation of destructive administrative actions.

pub mod cooldown;
pub mod monitor;

pub use cooldown::{CooldownTracker, MASS_DELETE_THRESHOLD, WINDOW};
pub use monitor::IntegrityMonitor;
