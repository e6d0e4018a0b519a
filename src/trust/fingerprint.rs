//! Per-identity fingerprint table for account-takeover detection.
//!
//! A fingerprint is a SHA-256 over the principal's id, display name, and
//! account creation time. A stored fingerprint that no longer matches the
//! observed identity suggests the account changed hands; the Influx Guard
//! treats such joins as suspicious.

use crate::platform::types::{MemberInfo, PrincipalId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct FingerprintRecord {
    fingerprint: String,
    display_name: String,
    last_seen: SystemTime,
}

/// File-backed fingerprint table. Misses are recorded on first sight.
pub struct FingerprintTable {
    path: PathBuf,
    records: RwLock<HashMap<PrincipalId, FingerprintRecord>>,
}

/// Outcome of checking a member against the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintCheck {
    /// First observation; a record was created.
    New,
    /// Matches the stored record.
    Match,
    /// Differs from the stored record (possible takeover).
    Changed,
}

impl FingerprintTable {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = fs::read_to_string(&path)
            .ok()
            .and_then(|data| serde_json::from_str(&data).ok())
            .unwrap_or_default();
        Self {
            path,
            records: RwLock::new(records),
        }
    }

    /// Check a member against the stored fingerprint, updating the record
    /// to the currently observed identity either way.
    pub fn check(&self, member: &MemberInfo) -> FingerprintCheck {
        let observed = fingerprint_of(member);
        let outcome = {
            let mut records = self.records.write().unwrap();
            let outcome = match records.get(&member.id) {
                None => FingerprintCheck::New,
                Some(record) if record.fingerprint == observed => FingerprintCheck::Match,
                Some(_) => FingerprintCheck::Changed,
            };
            records.insert(
                member.id,
                FingerprintRecord {
                    fingerprint: observed,
                    display_name: member.display_name.clone(),
                    last_seen: SystemTime::now(),
                },
            );
            outcome
        };

        if outcome == FingerprintCheck::Changed {
            tracing::warn!(
                target: "warden::security",
                principal = %member.id,
                name = %member.display_name,
                "identity fingerprint changed, possible account takeover"
            );
        }
        self.persist();
        outcome
    }

    fn persist(&self) {
        let records = self.records.read().unwrap();
        if let Ok(data) = serde_json::to_string_pretty(&*records) {
            if let Err(e) = fs::write(&self.path, data) {
                tracing::error!(target: "warden::system", error = %e, "failed to persist fingerprint table");
            }
        }
    }
}

fn fingerprint_of(member: &MemberInfo) -> String {
    let created_secs = member
        .created_at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut hasher = Sha256::new();
    hasher.update(member.id.0.to_le_bytes());
    hasher.update(member.display_name.as_bytes());
    hasher.update(created_secs.to_le_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn member(id: u64, name: &str) -> MemberInfo {
        MemberInfo {
            id: PrincipalId(id),
            display_name: name.to_string(),
            created_at: UNIX_EPOCH + Duration::from_secs(1_000_000),
            has_avatar: true,
            roles: vec![],
        }
    }

    #[test]
    fn test_first_sighting_is_new() {
        let dir = tempdir().unwrap();
        let table = FingerprintTable::load(dir.path().join("fp.json"));

        assert_eq!(table.check(&member(1, "alice")), FingerprintCheck::New);
        assert_eq!(table.check(&member(1, "alice")), FingerprintCheck::Match);
    }

    #[test]
    fn test_renamed_identity_flags_change() {
        let dir = tempdir().unwrap();
        let table = FingerprintTable::load(dir.path().join("fp.json"));

        table.check(&member(1, "alice"));
        assert_eq!(table.check(&member(1, "eve")), FingerprintCheck::Changed);
        // The record now reflects the observed identity.
        assert_eq!(table.check(&member(1, "eve")), FingerprintCheck::Match);
    }

    #[test]
    fn test_table_survives_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fp.json");

        {
            let table = FingerprintTable::load(&path);
            table.check(&member(1, "alice"));
        }

        let table = FingerprintTable::load(&path);
        assert_eq!(table.check(&member(1, "alice")), FingerprintCheck::Match);
        assert_eq!(table.check(&member(2, "bob")), FingerprintCheck::New);
    }
}
