//! Platform boundary: types, events, client trait, retry, and the mock
//! used throughout the test suite.

pub mod events;
pub mod mock;
pub mod retry;
pub mod traits;
pub mod types;

pub use events::{ActionEvent, ActionKind, LedgerEntry, LedgerTarget, PlatformEvent, LEDGER_LOOKBACK};
pub use traits::{PlatformClient, PlatformError, PlatformResult};
