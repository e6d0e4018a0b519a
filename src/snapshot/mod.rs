//! Disaster recovery: manifest capture and ordered community restore.

pub mod engine;
pub mod manifest;

pub use engine::{RestoreReport, SnapshotEngine, SnapshotError, UnresolvedOverwrite};
pub use manifest::{Manifest, ManifestError, MANIFEST_VERSION};
