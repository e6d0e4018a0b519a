//! Trust state: the durable allow-list and the identity fingerprint table.

pub mod fingerprint;
pub mod registry;

pub use fingerprint::{FingerprintCheck, FingerprintTable};
pub use registry::{TrustError, TrustRegistry, TrustedPrincipal};
