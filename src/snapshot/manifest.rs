//! Versioned on-disk description of a community's structure.
//!
//! A manifest is everything restore needs to rebuild the community:
//! ordered roles, categories, channels with kind-specific attributes and
//! permission overwrites, emoji inventory, the trust registry, the
//! sentinel target, and community settings. Identifiers are the ones the
//! platform had at capture time; restore treats them as labels and builds
//! a remap table to the freshly assigned ids.

use crate::platform::types::*;
use crate::trust::TrustedPrincipal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::SystemTime;

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("unsupported manifest version {0}")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub community_id: u64,
    pub community_name: String,
    pub owner: PrincipalId,
    pub captured_at: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: RoleId,
    pub name: String,
    pub color: u32,
    pub hoist: bool,
    pub permissions: PermissionSet,
    pub mentionable: bool,
    pub position: u32,
}

impl RoleRecord {
    pub fn from_info(info: &RoleInfo) -> Self {
        Self {
            id: info.id,
            name: info.name.clone(),
            color: info.color,
            hoist: info.hoist,
            permissions: info.permissions,
            mentionable: info.mentionable,
            position: info.position,
        }
    }

    pub fn spec(&self) -> RoleSpec {
        RoleSpec {
            name: self.name.clone(),
            color: self.color,
            hoist: self.hoist,
            permissions: self.permissions,
            mentionable: self.mentionable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: CategoryId,
    pub name: String,
    pub position: u32,
    pub overwrites: Vec<Overwrite>,
}

impl CategoryRecord {
    pub fn from_info(info: &CategoryInfo) -> Self {
        Self {
            id: info.id,
            name: info.name.clone(),
            position: info.position,
            overwrites: info.overwrites.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: ChannelId,
    pub name: String,
    pub position: u32,
    pub category: Option<CategoryId>,
    pub attrs: ChannelAttrs,
    pub overwrites: Vec<Overwrite>,
}

impl ChannelRecord {
    pub fn from_info(info: &ChannelInfo) -> Self {
        Self {
            id: info.id,
            name: info.name.clone(),
            position: info.position,
            category: info.category,
            attrs: info.attrs.clone(),
            overwrites: info.overwrites.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmojiRecord {
    pub id: EmojiId,
    pub name: String,
    pub animated: bool,
}

/// Complete structural snapshot of a community.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub metadata: ManifestMetadata,
    /// Ordered highest position first, matching the platform listing.
    pub roles: Vec<RoleRecord>,
    pub categories: Vec<CategoryRecord>,
    pub channels: Vec<ChannelRecord>,
    pub emojis: Vec<EmojiRecord>,
    pub trusted: Vec<TrustedPrincipal>,
    pub sentinel_target: Option<ChannelId>,
    pub settings: CommunitySettings,
}

impl Manifest {
    /// Persist as pretty JSON: previous file copied to a `.bak` sibling,
    /// new content written to a temp file and renamed in place.
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        if path.exists() {
            let _ = fs::copy(path, path.with_extension("json.bak"));
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let data = fs::read_to_string(path)?;
        let manifest: Manifest = serde_json::from_str(&data)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ManifestError::UnsupportedVersion(manifest.version));
        }
        Ok(manifest)
    }

    pub fn role(&self, id: RoleId) -> Option<&RoleRecord> {
        self.roles.iter().find(|r| r.id == id)
    }

    pub fn category(&self, id: CategoryId) -> Option<&CategoryRecord> {
        self.categories.iter().find(|c| c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Manifest {
        Manifest {
            version: MANIFEST_VERSION,
            metadata: ManifestMetadata {
                community_id: 1,
                community_name: "home".into(),
                owner: PrincipalId(1),
                captured_at: SystemTime::now(),
            },
            roles: vec![RoleRecord {
                id: RoleId(10),
                name: "staff".into(),
                color: 0xff0000,
                hoist: true,
                permissions: PermissionSet(PermissionSet::KICK_MEMBERS),
                mentionable: false,
                position: 3,
            }],
            categories: vec![CategoryRecord {
                id: CategoryId(20),
                name: "general".into(),
                position: 0,
                overwrites: vec![],
            }],
            channels: vec![ChannelRecord {
                id: ChannelId(30),
                name: "lounge".into(),
                position: 0,
                category: Some(CategoryId(20)),
                attrs: ChannelAttrs::Voice {
                    bitrate: 64000,
                    user_limit: 10,
                },
                overwrites: vec![Overwrite {
                    target: OverwriteTarget::Role(RoleId(10)),
                    allow: PermissionSet(PermissionSet::CONNECT),
                    deny: PermissionSet::empty(),
                }],
            }],
            emojis: vec![],
            trusted: vec![],
            sentinel_target: Some(ChannelId(30)),
            settings: CommunitySettings::default(),
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("current.json");
        let manifest = sample();

        manifest.save(&path).unwrap();
        let loaded = Manifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn test_save_keeps_backup_of_previous_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("current.json");
        let manifest = sample();

        manifest.save(&path).unwrap();
        manifest.save(&path).unwrap();
        assert!(path.with_extension("json.bak").exists());
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("current.json");
        let mut manifest = sample();
        manifest.version = 99;
        fs::write(&path, serde_json::to_string(&manifest).unwrap()).unwrap();

        let err = Manifest::load(&path).unwrap_err();
        assert!(matches!(err, ManifestError::UnsupportedVersion(99)));
    }

    #[test]
    fn test_corrupt_file_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("current.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            Manifest::load(&path).unwrap_err(),
            ManifestError::Corrupt(_)
        ));
    }
}
