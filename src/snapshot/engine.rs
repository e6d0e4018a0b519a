//! Community capture and disaster restore.
//!
//! `capture` walks the live community into a `Manifest`. `restore`
//! rebuilds the community from a manifest in a fixed order: an emergency
//! capture is persisted first, then existing channels, categories and
//! non-managed roles are torn down, and everything is recreated with an
//! old-to-new id remap table. The platform assigns fresh ids, so every
//! stored reference (overwrite targets, category parents, settings
//! channels, the sentinel target) goes through the remap. Restore is
//! sequential and best-effort: a failed or unresolvable entry is recorded
//! in the `RestoreReport` and skipped, never fabricated.

use crate::journal::target;
use crate::platform::retry::retry_transient;
use crate::platform::types::*;
use crate::platform::{PlatformClient, PlatformError};
use crate::sentinel::SentinelState;
use crate::trust::TrustRegistry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

use super::manifest::{
    CategoryRecord, ChannelRecord, EmojiRecord, Manifest, ManifestError, ManifestMetadata,
    RoleRecord, MANIFEST_VERSION,
};

/// Delay between consecutive mutating calls during restore, to stay under
/// the platform's rate limits.
pub const RESTORE_PACING: Duration = Duration::from_millis(350);

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("platform call failed: {0}")]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// An overwrite whose target could not be resolved against the manifest
/// or the live community.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedOverwrite {
    pub object: String,
    pub target: OverwriteTarget,
}

/// Outcome of a restore run.
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub roles_restored: usize,
    pub categories_restored: usize,
    pub channels_restored: usize,
    pub unresolved_overwrites: Vec<UnresolvedOverwrite>,
    /// Entities that could not be torn down or recreated.
    pub skipped: Vec<String>,
}

impl RestoreReport {
    pub fn is_clean(&self) -> bool {
        self.unresolved_overwrites.is_empty() && self.skipped.is_empty()
    }
}

/// Captures and restores community structure.
pub struct SnapshotEngine<C: PlatformClient> {
    client: C,
    registry: Arc<TrustRegistry>,
    sentinel: Arc<SentinelState>,
    current_path: PathBuf,
    emergency_path: PathBuf,
    pacing: Duration,
}

impl<C: PlatformClient> SnapshotEngine<C> {
    pub fn new(
        client: C,
        registry: Arc<TrustRegistry>,
        sentinel: Arc<SentinelState>,
        current_path: impl Into<PathBuf>,
        emergency_path: impl Into<PathBuf>,
        pacing: Duration,
    ) -> Self {
        Self {
            client,
            registry,
            sentinel,
            current_path: current_path.into(),
            emergency_path: emergency_path.into(),
            pacing,
        }
    }

    /// Capture the live community into a manifest.
    pub async fn capture(&self) -> Result<Manifest, PlatformError> {
        let community = self.client.community().await?;
        let roles = self.client.roles().await?;
        let categories = self.client.categories().await?;
        let channels = self.client.channels().await?;
        let emojis = self.client.emojis().await?;

        Ok(Manifest {
            version: MANIFEST_VERSION,
            metadata: ManifestMetadata {
                community_id: community.id,
                community_name: community.name.clone(),
                owner: community.owner,
                captured_at: SystemTime::now(),
            },
            // Managed roles belong to integrations; they cannot be
            // recreated and are left out.
            roles: roles
                .iter()
                .filter(|r| !r.managed)
                .map(RoleRecord::from_info)
                .collect(),
            categories: categories.iter().map(CategoryRecord::from_info).collect(),
            channels: channels.iter().map(ChannelRecord::from_info).collect(),
            emojis: emojis
                .iter()
                .map(|e| EmojiRecord {
                    id: e.id,
                    name: e.name.clone(),
                    animated: e.animated,
                })
                .collect(),
            trusted: self.registry.snapshot(),
            sentinel_target: self.sentinel.target(),
            settings: community.settings,
        })
    }

    /// Capture and persist as the current manifest.
    pub async fn create_snapshot(&self) -> Result<Manifest, SnapshotError> {
        let manifest = self.capture().await?;
        manifest.save(&self.current_path)?;
        info!(
            target: target::BACKUP,
            roles = manifest.roles.len(),
            categories = manifest.categories.len(),
            channels = manifest.channels.len(),
            "snapshot captured"
        );
        Ok(manifest)
    }

    /// Load the persisted current manifest.
    pub fn load_current(&self) -> Result<Manifest, ManifestError> {
        Manifest::load(&self.current_path)
    }

    /// Rebuild the community from a manifest. The emergency capture must
    /// succeed before anything is torn down; everything after that is
    /// best-effort and lands in the report.
    pub async fn restore(&self, manifest: &Manifest) -> Result<RestoreReport, SnapshotError> {
        let emergency = self.capture().await?;
        emergency.save(&self.emergency_path)?;
        info!(target: target::BACKUP, "emergency capture persisted, beginning restore");

        let mut report = RestoreReport::default();

        self.tear_down(&mut report).await;

        let role_map = self.restore_roles(manifest, &mut report).await;
        let category_map = self.restore_categories(manifest, &role_map, &mut report).await;
        let channel_map = self
            .restore_channels(manifest, &role_map, &category_map, &mut report)
            .await;

        self.restore_settings(manifest, &channel_map).await;

        if let Err(e) = self.registry.replace(manifest.trusted.clone()) {
            warn!(target: target::BACKUP, error = %e, "trust registry restore failed");
            report.skipped.push("trust registry".to_string());
        }
        self.sentinel
            .set_target(manifest.sentinel_target.and_then(|old| channel_map.get(&old).copied()));

        info!(
            target: target::BACKUP,
            roles = report.roles_restored,
            categories = report.categories_restored,
            channels = report.channels_restored,
            unresolved = report.unresolved_overwrites.len(),
            skipped = report.skipped.len(),
            "restore complete"
        );
        Ok(report)
    }

    // --- restore steps ---

    async fn tear_down(&self, report: &mut RestoreReport) {
        match self.client.channels().await {
            Ok(channels) => {
                for channel in channels {
                    if let Err(e) = retry_transient(|| self.client.delete_channel(channel.id)).await
                    {
                        if !e.is_already_gone() {
                            warn!(target: target::BACKUP, channel = %channel.name, error = %e, "channel teardown failed");
                            report.skipped.push(format!("teardown channel '{}'", channel.name));
                        }
                    }
                    self.pace().await;
                }
            }
            Err(e) => warn!(target: target::BACKUP, error = %e, "channel listing failed"),
        }

        match self.client.categories().await {
            Ok(categories) => {
                for category in categories {
                    if let Err(e) =
                        retry_transient(|| self.client.delete_category(category.id)).await
                    {
                        if !e.is_already_gone() {
                            warn!(target: target::BACKUP, category = %category.name, error = %e, "category teardown failed");
                            report.skipped.push(format!("teardown category '{}'", category.name));
                        }
                    }
                    self.pace().await;
                }
            }
            Err(e) => warn!(target: target::BACKUP, error = %e, "category listing failed"),
        }

        let own_roles = match self.client.member(self.client.self_id()).await {
            Ok(member) => member.roles,
            Err(_) => Vec::new(),
        };
        match self.client.roles().await {
            Ok(roles) => {
                for role in roles {
                    if role.managed || own_roles.contains(&role.id) {
                        continue;
                    }
                    if let Err(e) = retry_transient(|| self.client.delete_role(role.id)).await {
                        if !e.is_already_gone() {
                            warn!(target: target::BACKUP, role = %role.name, error = %e, "role teardown failed");
                            report.skipped.push(format!("teardown role '{}'", role.name));
                        }
                    }
                    self.pace().await;
                }
            }
            Err(e) => warn!(target: target::BACKUP, error = %e, "role listing failed"),
        }
    }

    /// Two passes: create every role first to learn the fresh ids, then
    /// fix positions once the full set exists.
    async fn restore_roles(
        &self,
        manifest: &Manifest,
        report: &mut RestoreReport,
    ) -> HashMap<RoleId, RoleId> {
        let mut role_map = HashMap::new();

        for record in &manifest.roles {
            let spec = record.spec();
            match retry_transient(|| self.client.create_role(&spec)).await {
                Ok(created) => {
                    role_map.insert(record.id, created.id);
                    report.roles_restored += 1;
                }
                Err(e) => {
                    warn!(target: target::BACKUP, role = %record.name, error = %e, "role restore failed");
                    report.skipped.push(format!("role '{}'", record.name));
                }
            }
            self.pace().await;
        }

        for record in &manifest.roles {
            if let Some(new_id) = role_map.get(&record.id) {
                if let Err(e) =
                    retry_transient(|| self.client.edit_role_position(*new_id, record.position))
                        .await
                {
                    warn!(target: target::BACKUP, role = %record.name, error = %e, "role reposition failed");
                }
                self.pace().await;
            }
        }

        role_map
    }

    async fn restore_categories(
        &self,
        manifest: &Manifest,
        role_map: &HashMap<RoleId, RoleId>,
        report: &mut RestoreReport,
    ) -> HashMap<CategoryId, CategoryId> {
        let mut category_map = HashMap::new();

        for record in &manifest.categories {
            let overwrites = self
                .remap_overwrites(
                    &format!("category '{}'", record.name),
                    &record.overwrites,
                    role_map,
                    report,
                )
                .await;
            let spec = CategorySpec {
                name: record.name.clone(),
                position: record.position,
                overwrites,
            };
            match retry_transient(|| self.client.create_category(&spec)).await {
                Ok(created) => {
                    category_map.insert(record.id, created.id);
                    report.categories_restored += 1;
                }
                Err(e) => {
                    warn!(target: target::BACKUP, category = %record.name, error = %e, "category restore failed");
                    report.skipped.push(format!("category '{}'", record.name));
                }
            }
            self.pace().await;
        }

        category_map
    }

    async fn restore_channels(
        &self,
        manifest: &Manifest,
        role_map: &HashMap<RoleId, RoleId>,
        category_map: &HashMap<CategoryId, CategoryId>,
        report: &mut RestoreReport,
    ) -> HashMap<ChannelId, ChannelId> {
        let mut channel_map = HashMap::new();

        for record in &manifest.channels {
            let category = match record.category {
                Some(old) => match category_map.get(&old) {
                    Some(new) => Some(*new),
                    None => {
                        warn!(target: target::BACKUP, channel = %record.name, "parent category unresolved, creating at top level");
                        None
                    }
                },
                None => None,
            };
            let overwrites = self
                .remap_overwrites(
                    &format!("channel '{}'", record.name),
                    &record.overwrites,
                    role_map,
                    report,
                )
                .await;
            let spec = ChannelSpec {
                name: record.name.clone(),
                position: record.position,
                category,
                attrs: record.attrs.clone(),
                overwrites,
            };
            match retry_transient(|| self.client.create_channel(&spec)).await {
                Ok(created) => {
                    channel_map.insert(record.id, created.id);
                    report.channels_restored += 1;
                }
                Err(e) => {
                    warn!(target: target::BACKUP, channel = %record.name, error = %e, "channel restore failed");
                    report.skipped.push(format!("channel '{}'", record.name));
                }
            }
            self.pace().await;
        }

        channel_map
    }

    async fn restore_settings(&self, manifest: &Manifest, channel_map: &HashMap<ChannelId, ChannelId>) {
        let remap = |id: Option<ChannelId>| id.and_then(|old| channel_map.get(&old).copied());
        let settings = CommunitySettings {
            system_channel: remap(manifest.settings.system_channel),
            rules_channel: remap(manifest.settings.rules_channel),
            updates_channel: remap(manifest.settings.updates_channel),
            moderation_level: manifest.settings.moderation_level,
        };
        if let Err(e) = retry_transient(|| self.client.edit_community_settings(&settings)).await {
            warn!(target: target::BACKUP, error = %e, "settings restore failed");
        }
    }

    /// Translate a stored overwrite list to the restored community. Role
    /// targets must appear in the remap table; member targets must still
    /// be present on the platform. Anything unresolvable is recorded and
    /// dropped.
    async fn remap_overwrites(
        &self,
        object: &str,
        overwrites: &[Overwrite],
        role_map: &HashMap<RoleId, RoleId>,
        report: &mut RestoreReport,
    ) -> Vec<Overwrite> {
        let mut remapped = Vec::with_capacity(overwrites.len());
        for overwrite in overwrites {
            let target = match overwrite.target {
                OverwriteTarget::Default => OverwriteTarget::Default,
                OverwriteTarget::Role(old) => match role_map.get(&old) {
                    Some(new) => OverwriteTarget::Role(*new),
                    None => {
                        report.unresolved_overwrites.push(UnresolvedOverwrite {
                            object: object.to_string(),
                            target: overwrite.target,
                        });
                        continue;
                    }
                },
                OverwriteTarget::Member(id) => {
                    if self.client.member(id).await.is_ok() {
                        OverwriteTarget::Member(id)
                    } else {
                        report.unresolved_overwrites.push(UnresolvedOverwrite {
                            object: object.to_string(),
                            target: overwrite.target,
                        });
                        continue;
                    }
                }
            };
            remapped.push(Overwrite {
                target,
                allow: overwrite.allow,
                deny: overwrite.deny,
            });
        }
        remapped
    }

    async fn pace(&self) {
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockPlatform;
    use tempfile::tempdir;

    const OWNER: PrincipalId = PrincipalId(1);
    const ENGINE: PrincipalId = PrincipalId(2);

    struct Fixture {
        platform: MockPlatform,
        engine: SnapshotEngine<MockPlatform>,
        registry: Arc<TrustRegistry>,
        sentinel: Arc<SentinelState>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let registry = Arc::new(
            TrustRegistry::load(dir.path().join("trust.json"), OWNER).unwrap(),
        );
        let sentinel = Arc::new(SentinelState::new(None));
        let platform = MockPlatform::new(OWNER, ENGINE);
        let engine = SnapshotEngine::new(
            platform.clone(),
            registry.clone(),
            sentinel.clone(),
            dir.path().join("current.json"),
            dir.path().join("emergency.json"),
            Duration::ZERO,
        );
        Fixture {
            platform,
            engine,
            registry,
            sentinel,
            _dir: dir,
        }
    }

    fn role_spec(name: &str, permissions: u64) -> RoleSpec {
        RoleSpec {
            name: name.into(),
            color: 0x336699,
            hoist: false,
            permissions: PermissionSet(permissions),
            mentionable: false,
        }
    }

    fn text_channel(name: &str, category: Option<CategoryId>, overwrites: Vec<Overwrite>) -> ChannelSpec {
        ChannelSpec {
            name: name.into(),
            position: 1,
            category,
            attrs: ChannelAttrs::Text {
                topic: Some(format!("{name} topic")),
                slowmode_secs: 0,
            },
            overwrites,
        }
    }

    /// Seed twelve roles, four categories, and twenty channels.
    fn seed_community(f: &Fixture) {
        let mut roles = Vec::new();
        for i in 0..12u32 {
            roles.push(f.platform.seed_role(
                &role_spec(&format!("role-{i}"), PermissionSet::SEND_MESSAGES),
                12 - i,
            ));
        }
        let mut categories = Vec::new();
        for i in 0..4u32 {
            categories.push(f.platform.seed_category(&CategorySpec {
                name: format!("area-{i}"),
                position: i,
                overwrites: vec![],
            }));
        }
        for i in 0..20usize {
            let category = Some(categories[i % 4].id);
            let overwrites = vec![Overwrite {
                target: OverwriteTarget::Role(roles[i % 12].id),
                allow: PermissionSet(PermissionSet::VIEW_CHANNEL),
                deny: PermissionSet::empty(),
            }];
            f.platform
                .seed_channel(&text_channel(&format!("room-{i}"), category, overwrites));
        }
    }

    #[tokio::test]
    async fn test_capture_reflects_graph_and_skips_managed_roles() {
        let f = fixture();
        seed_community(&f);
        f.platform
            .seed_managed_role(&role_spec("integration-bot", PermissionSet::ADMINISTRATOR), 20);
        let room = f.platform.channel_named("room-0").unwrap();
        f.sentinel.set_target(Some(room.id));

        let manifest = f.engine.capture().await.unwrap();

        assert_eq!(manifest.roles.len(), 12);
        assert!(manifest.roles.iter().all(|r| r.name != "integration-bot"));
        assert_eq!(manifest.categories.len(), 4);
        assert_eq!(manifest.channels.len(), 20);
        assert_eq!(manifest.sentinel_target, Some(room.id));
        assert!(manifest.trusted.iter().any(|t| t.id == OWNER));
    }

    #[tokio::test]
    async fn test_create_snapshot_persists_loadable_manifest() {
        let f = fixture();
        seed_community(&f);

        let captured = f.engine.create_snapshot().await.unwrap();
        let loaded = f.engine.load_current().unwrap();

        assert_eq!(loaded, captured);
    }

    #[tokio::test]
    async fn test_capture_idempotent_modulo_timestamp() {
        let f = fixture();
        seed_community(&f);

        let mut first = f.engine.capture().await.unwrap();
        let second = f.engine.capture().await.unwrap();
        first.metadata.captured_at = second.metadata.captured_at;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_restore_rebuilds_structure_isomorphically() {
        let f = fixture();
        seed_community(&f);
        let manifest = f.engine.capture().await.unwrap();

        // Vandalize: drop structure, add junk.
        let vandal = PrincipalId(66);
        for i in 0..10 {
            let room = f.platform.channel_named(&format!("room-{i}")).unwrap();
            f.platform.simulate_channel_delete(vandal, room.id);
        }
        for i in 0..6 {
            let role = f.platform.role_named(&format!("role-{i}")).unwrap();
            f.platform.simulate_role_delete(vandal, role.id);
        }
        f.platform
            .simulate_role_create(vandal, &role_spec("junk", PermissionSet::ADMINISTRATOR));
        f.platform
            .simulate_channel_create(vandal, &text_channel("junk-room", None, vec![]));

        let report = f.engine.restore(&manifest).await.unwrap();

        assert!(report.is_clean(), "report: {report:?}");
        assert_eq!(report.roles_restored, 12);
        assert_eq!(report.categories_restored, 4);
        assert_eq!(report.channels_restored, 20);

        let roles = f.platform.roles().await.unwrap();
        assert_eq!(roles.len(), 12);
        assert!(f.platform.role_named("junk").is_none());
        for record in &manifest.roles {
            let live = f.platform.role_named(&record.name).unwrap();
            assert_eq!(live.permissions, record.permissions);
            assert_eq!(live.position, record.position);
        }

        let channels = f.platform.channels().await.unwrap();
        assert_eq!(channels.len(), 20);
        assert!(f.platform.channel_named("junk-room").is_none());

        // Overwrites point at the remapped roles, verified by name.
        for record in &manifest.channels {
            let live = f.platform.channel_named(&record.name).unwrap();
            assert_eq!(live.overwrites.len(), record.overwrites.len());
            for (live_ow, old_ow) in live.overwrites.iter().zip(&record.overwrites) {
                let OverwriteTarget::Role(old_role) = old_ow.target else {
                    panic!("seeded overwrites target roles");
                };
                let OverwriteTarget::Role(new_role) = live_ow.target else {
                    panic!("restored overwrites target roles");
                };
                let old_name = &manifest.role(old_role).unwrap().name;
                let new_name = f.platform.role(new_role).unwrap().name;
                assert_eq!(&new_name, old_name);
            }
        }
    }

    #[tokio::test]
    async fn test_restore_persists_emergency_capture_first() {
        let f = fixture();
        seed_community(&f);
        let manifest = f.engine.capture().await.unwrap();

        f.platform
            .simulate_channel_create(PrincipalId(66), &text_channel("junk-room", None, vec![]));
        f.engine.restore(&manifest).await.unwrap();

        let emergency = Manifest::load(&f._dir.path().join("emergency.json")).unwrap();
        // The emergency capture reflects the pre-restore state, junk included.
        assert!(emergency.channels.iter().any(|c| c.name == "junk-room"));
    }

    #[tokio::test]
    async fn test_unresolvable_overwrite_reported_and_skipped() {
        let f = fixture();
        seed_community(&f);
        let mut manifest = f.engine.capture().await.unwrap();
        manifest.channels[0].overwrites.push(Overwrite {
            target: OverwriteTarget::Role(RoleId(424242)),
            allow: PermissionSet(PermissionSet::VIEW_CHANNEL),
            deny: PermissionSet::empty(),
        });

        let report = f.engine.restore(&manifest).await.unwrap();

        assert_eq!(report.unresolved_overwrites.len(), 1);
        assert_eq!(
            report.unresolved_overwrites[0].target,
            OverwriteTarget::Role(RoleId(424242))
        );
        // The channel itself was still created, minus the bad overwrite.
        let live = f
            .platform
            .channel_named(&manifest.channels[0].name)
            .unwrap();
        assert_eq!(live.overwrites.len(), manifest.channels[0].overwrites.len() - 1);
    }

    #[tokio::test]
    async fn test_restore_remaps_settings_and_sentinel_target() {
        let f = fixture();
        seed_community(&f);
        let system = f.platform.channel_named("room-3").unwrap();
        f.platform.set_settings(CommunitySettings {
            system_channel: Some(system.id),
            rules_channel: None,
            updates_channel: None,
            moderation_level: 2,
        });
        let sentinel_room = f.platform.channel_named("room-7").unwrap();
        f.sentinel.set_target(Some(sentinel_room.id));
        let manifest = f.engine.capture().await.unwrap();

        f.engine.restore(&manifest).await.unwrap();

        let community = f.platform.community().await.unwrap();
        let new_system = community.settings.system_channel.unwrap();
        assert_ne!(new_system, system.id);
        assert_eq!(
            f.platform.channel_named("room-3").unwrap().id,
            new_system
        );
        assert_eq!(community.settings.moderation_level, 2);

        let new_target = f.sentinel.target().unwrap();
        assert_eq!(f.platform.channel_named("room-7").unwrap().id, new_target);
    }

    #[tokio::test]
    async fn test_restore_replaces_trust_registry() {
        let f = fixture();
        seed_community(&f);
        f.registry.add(PrincipalId(9), OWNER).unwrap();
        let manifest = f.engine.capture().await.unwrap();

        f.registry.remove(PrincipalId(9), OWNER).unwrap();
        f.engine.restore(&manifest).await.unwrap();

        assert!(f.registry.contains(PrincipalId(9)));
        assert!(f.registry.contains(OWNER));
    }

    #[tokio::test]
    async fn test_managed_roles_survive_teardown() {
        let f = fixture();
        seed_community(&f);
        f.platform
            .seed_managed_role(&role_spec("integration-bot", 0), 20);
        let manifest = f.engine.capture().await.unwrap();

        f.engine.restore(&manifest).await.unwrap();

        assert!(f.platform.role_named("integration-bot").is_some());
    }
}
