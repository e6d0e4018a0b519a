//! Durable allow-list of principals exempt from enforcement.
//!
//! The registry is loaded once at startup and kept resident; every
//! successful mutation is persisted before the call returns, so a crash
//! after return implies the change survived. The designated owner is
//! always present and can never be removed.

use crate::platform::types::PrincipalId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

/// Registry errors.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    /// Only the owner may mutate the registry.
    #[error("requester {0} is not authorized to modify the trust registry")]
    Unauthorized(PrincipalId),

    /// The owner entry can never be removed.
    #[error("principal {0} is protected and cannot be removed")]
    Protected(PrincipalId),

    #[error("registry persistence failed: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("registry file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// One allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedPrincipal {
    pub id: PrincipalId,
    pub added_by: PrincipalId,
    pub added_at: SystemTime,
}

#[derive(Serialize, Deserialize)]
struct RegistryFile {
    version: u32,
    entries: Vec<TrustedPrincipal>,
}

/// Resident allow-list with synchronous file persistence.
pub struct TrustRegistry {
    owner: PrincipalId,
    path: PathBuf,
    entries: RwLock<BTreeMap<PrincipalId, TrustedPrincipal>>,
}

impl TrustRegistry {
    /// Load the registry from `path`, creating it if absent. The owner is
    /// inserted if the stored file lacks it.
    pub fn load(path: impl Into<PathBuf>, owner: PrincipalId) -> Result<Self, TrustError> {
        let path = path.into();
        let mut entries = BTreeMap::new();

        if path.exists() {
            let data = fs::read_to_string(&path)?;
            let file: RegistryFile = serde_json::from_str(&data)?;
            for entry in file.entries {
                entries.insert(entry.id, entry);
            }
        }

        entries.entry(owner).or_insert_with(|| TrustedPrincipal {
            id: owner,
            added_by: owner,
            added_at: SystemTime::now(),
        });

        let registry = Self {
            owner,
            path,
            entries: RwLock::new(entries),
        };
        registry.persist()?;
        Ok(registry)
    }

    pub fn owner(&self) -> PrincipalId {
        self.owner
    }

    pub fn contains(&self, id: PrincipalId) -> bool {
        self.entries.read().unwrap().contains_key(&id)
    }

    /// Add a principal. Only the owner may do this. Persists before
    /// returning; adding an already-present principal is a no-op.
    pub fn add(&self, id: PrincipalId, requester: PrincipalId) -> Result<(), TrustError> {
        if requester != self.owner {
            return Err(TrustError::Unauthorized(requester));
        }

        {
            let mut entries = self.entries.write().unwrap();
            if entries.contains_key(&id) {
                return Ok(());
            }
            entries.insert(
                id,
                TrustedPrincipal {
                    id,
                    added_by: requester,
                    added_at: SystemTime::now(),
                },
            );
        }
        self.persist()?;
        tracing::info!(target: "warden::trust", principal = %id, by = %requester, "trusted principal added");
        Ok(())
    }

    /// Remove a principal. Only the owner may do this; the owner entry
    /// itself is protected.
    pub fn remove(&self, id: PrincipalId, requester: PrincipalId) -> Result<(), TrustError> {
        if requester != self.owner {
            return Err(TrustError::Unauthorized(requester));
        }
        if id == self.owner {
            return Err(TrustError::Protected(id));
        }

        {
            let mut entries = self.entries.write().unwrap();
            entries.remove(&id);
        }
        self.persist()?;
        tracing::info!(target: "warden::trust", principal = %id, by = %requester, "trusted principal removed");
        Ok(())
    }

    /// Re-read the registry from disk. Explicit operation, never automatic.
    pub fn reload(&self) -> Result<(), TrustError> {
        let data = fs::read_to_string(&self.path)?;
        let file: RegistryFile = serde_json::from_str(&data)?;

        let mut entries = self.entries.write().unwrap();
        entries.clear();
        for entry in file.entries {
            entries.insert(entry.id, entry);
        }
        entries.entry(self.owner).or_insert_with(|| TrustedPrincipal {
            id: self.owner,
            added_by: self.owner,
            added_at: SystemTime::now(),
        });
        Ok(())
    }

    /// Snapshot of all entries, for manifests.
    pub fn snapshot(&self) -> Vec<TrustedPrincipal> {
        self.entries.read().unwrap().values().cloned().collect()
    }

    /// Replace the registry contents from a manifest. The owner entry is
    /// preserved regardless of the incoming set.
    pub fn replace(&self, incoming: Vec<TrustedPrincipal>) -> Result<(), TrustError> {
        {
            let mut entries = self.entries.write().unwrap();
            let owner_entry = entries
                .get(&self.owner)
                .cloned()
                .unwrap_or_else(|| TrustedPrincipal {
                    id: self.owner,
                    added_by: self.owner,
                    added_at: SystemTime::now(),
                });
            entries.clear();
            for entry in incoming {
                entries.insert(entry.id, entry);
            }
            entries.insert(self.owner, owner_entry);
        }
        self.persist()
    }

    /// Write the registry to disk: previous file copied to a `.bak`
    /// sibling, new content written to a temp file and renamed in place.
    fn persist(&self) -> Result<(), TrustError> {
        let file = {
            let entries = self.entries.read().unwrap();
            RegistryFile {
                version: 1,
                entries: entries.values().cloned().collect(),
            }
        };

        if self.path.exists() {
            let _ = fs::copy(&self.path, backup_path(&self.path));
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&file)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn backup_path(path: &Path) -> PathBuf {
    path.with_extension("json.bak")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const OWNER: PrincipalId = PrincipalId(1);
    const MOD: PrincipalId = PrincipalId(2);
    const STRANGER: PrincipalId = PrincipalId(3);

    fn registry(dir: &tempfile::TempDir) -> TrustRegistry {
        TrustRegistry::load(dir.path().join("trust.json"), OWNER).unwrap()
    }

    #[test]
    fn test_owner_always_present() {
        let dir = tempdir().unwrap();
        let registry = registry(&dir);
        assert!(registry.contains(OWNER));
    }

    #[test]
    fn test_add_requires_owner() {
        let dir = tempdir().unwrap();
        let registry = registry(&dir);

        let err = registry.add(STRANGER, MOD).unwrap_err();
        assert!(matches!(err, TrustError::Unauthorized(id) if id == MOD));

        registry.add(MOD, OWNER).unwrap();
        assert!(registry.contains(MOD));
    }

    #[test]
    fn test_owner_cannot_be_removed() {
        let dir = tempdir().unwrap();
        let registry = registry(&dir);

        let err = registry.remove(OWNER, OWNER).unwrap_err();
        assert!(matches!(err, TrustError::Protected(id) if id == OWNER));
        assert!(registry.contains(OWNER));
    }

    #[test]
    fn test_remove_requires_owner() {
        let dir = tempdir().unwrap();
        let registry = registry(&dir);
        registry.add(MOD, OWNER).unwrap();

        let err = registry.remove(MOD, STRANGER).unwrap_err();
        assert!(matches!(err, TrustError::Unauthorized(_)));
        assert!(registry.contains(MOD));
    }

    #[test]
    fn test_mutations_survive_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trust.json");

        {
            let registry = TrustRegistry::load(&path, OWNER).unwrap();
            registry.add(MOD, OWNER).unwrap();
        }

        let reloaded = TrustRegistry::load(&path, OWNER).unwrap();
        assert!(reloaded.contains(MOD));
        assert!(reloaded.contains(OWNER));
    }

    #[test]
    fn test_owner_reinserted_when_file_lacks_it() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trust.json");
        fs::write(&path, r#"{"version":1,"entries":[]}"#).unwrap();

        let registry = TrustRegistry::load(&path, OWNER).unwrap();
        assert!(registry.contains(OWNER));
    }

    #[test]
    fn test_replace_preserves_owner() {
        let dir = tempdir().unwrap();
        let registry = registry(&dir);
        registry.add(MOD, OWNER).unwrap();

        registry
            .replace(vec![TrustedPrincipal {
                id: STRANGER,
                added_by: OWNER,
                added_at: SystemTime::now(),
            }])
            .unwrap();

        assert!(registry.contains(OWNER));
        assert!(registry.contains(STRANGER));
        assert!(!registry.contains(MOD));
    }

    #[test]
    fn test_backup_written_on_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trust.json");
        let registry = TrustRegistry::load(&path, OWNER).unwrap();

        registry.add(MOD, OWNER).unwrap();
        assert!(backup_path(&path).exists());
    }
}
