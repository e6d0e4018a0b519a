//! Mock platform client for testing.
//!
//! Holds a complete in-memory community graph (roles, categories,
//! channels, members, invites, webhooks, bans, voice presence) plus an
//! append-only action ledger, so every engine behavior is testable
//! without the real platform.
//!
//! Tests drive it two ways: `simulate_*` methods mutate the graph as a
//! third-party actor would and append the matching ledger entry, returning
//! the `PlatformEvent` the platform would push; the `PlatformClient` impl
//! mutates it as the engine, attributing ledger entries to the engine's
//! own id.

use super::events::{ActionKind, LedgerEntry, LedgerTarget, PlatformEvent};
use super::traits::{PlatformClient, PlatformError, PlatformResult};
use super::types::*;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// Mock platform client.
#[derive(Clone)]
pub struct MockPlatform {
    state: Arc<Mutex<MockState>>,
    self_id: PrincipalId,
}

#[derive(Default)]
struct MockState {
    community_name: String,
    owner: PrincipalId,
    settings: CommunitySettings,
    roles: HashMap<RoleId, RoleInfo>,
    categories: HashMap<CategoryId, CategoryInfo>,
    channels: HashMap<ChannelId, ChannelInfo>,
    emojis: Vec<EmojiInfo>,
    invites: Vec<InviteInfo>,
    webhooks: HashMap<WebhookId, WebhookInfo>,
    members: HashMap<PrincipalId, MemberInfo>,
    banned: HashSet<PrincipalId>,
    kicked: Vec<PrincipalId>,
    /// Newest entries pushed to the front.
    ledger: Vec<LedgerEntry>,
    direct_messages: Vec<(PrincipalId, String)>,
    channel_messages: Vec<(ChannelId, String)>,
    voice_connections: HashSet<ChannelId>,
    voice_moves: Vec<(PrincipalId, ChannelId)>,
    next_id: u64,
    next_ledger_id: u64,
    /// When set, the next N mutating calls fail with a transient error.
    fail_mutations: u32,
}

impl MockPlatform {
    pub fn new(owner: PrincipalId, self_id: PrincipalId) -> Self {
        let state = MockState {
            community_name: "test community".to_string(),
            owner,
            next_id: 1000,
            next_ledger_id: 1,
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            self_id,
        }
    }

    fn alloc_id(state: &mut MockState) -> u64 {
        let id = state.next_id;
        state.next_id += 1;
        id
    }

    fn record(state: &mut MockState, kind: ActionKind, actor: PrincipalId, target: LedgerTarget) {
        let id = LedgerEntryId(state.next_ledger_id);
        state.next_ledger_id += 1;
        state.ledger.insert(
            0,
            LedgerEntry {
                id,
                kind,
                actor,
                target,
                at: SystemTime::now(),
            },
        );
    }

    fn check_failure(state: &mut MockState) -> PlatformResult<()> {
        if state.fail_mutations > 0 {
            state.fail_mutations -= 1;
            return Err(PlatformError::Transient("injected failure".into()));
        }
        Ok(())
    }

    // --- seeding ---

    pub fn seed_member(&self, member: MemberInfo) {
        self.state.lock().unwrap().members.insert(member.id, member);
    }

    pub fn seed_role(&self, spec: &RoleSpec, position: u32) -> RoleInfo {
        let mut state = self.state.lock().unwrap();
        let id = RoleId(Self::alloc_id(&mut state));
        let info = RoleInfo {
            id,
            name: spec.name.clone(),
            color: spec.color,
            hoist: spec.hoist,
            permissions: spec.permissions,
            mentionable: spec.mentionable,
            position,
            managed: false,
        };
        state.roles.insert(id, info.clone());
        info
    }

    /// Seed a platform-managed (integration) role.
    pub fn seed_managed_role(&self, spec: &RoleSpec, position: u32) -> RoleInfo {
        let mut state = self.state.lock().unwrap();
        let id = RoleId(Self::alloc_id(&mut state));
        let info = RoleInfo {
            id,
            name: spec.name.clone(),
            color: spec.color,
            hoist: spec.hoist,
            permissions: spec.permissions,
            mentionable: spec.mentionable,
            position,
            managed: true,
        };
        state.roles.insert(id, info.clone());
        info
    }

    pub fn seed_category(&self, spec: &CategorySpec) -> CategoryInfo {
        let mut state = self.state.lock().unwrap();
        let id = CategoryId(Self::alloc_id(&mut state));
        let info = CategoryInfo {
            id,
            name: spec.name.clone(),
            position: spec.position,
            overwrites: spec.overwrites.clone(),
        };
        state.categories.insert(id, info.clone());
        info
    }

    pub fn seed_channel(&self, spec: &ChannelSpec) -> ChannelInfo {
        let mut state = self.state.lock().unwrap();
        let id = ChannelId(Self::alloc_id(&mut state));
        let info = ChannelInfo {
            id,
            name: spec.name.clone(),
            position: spec.position,
            category: spec.category,
            attrs: spec.attrs.clone(),
            overwrites: spec.overwrites.clone(),
        };
        state.channels.insert(id, info.clone());
        info
    }

    pub fn seed_emoji(&self, name: &str) -> EmojiInfo {
        let mut state = self.state.lock().unwrap();
        let id = EmojiId(Self::alloc_id(&mut state));
        let info = EmojiInfo {
            id,
            name: name.to_string(),
            animated: false,
        };
        state.emojis.push(info.clone());
        info
    }

    pub fn seed_invite(&self, code: &str, creator: PrincipalId) {
        self.state.lock().unwrap().invites.push(InviteInfo {
            code: code.to_string(),
            creator,
        });
    }

    pub fn set_settings(&self, settings: CommunitySettings) {
        self.state.lock().unwrap().settings = settings;
    }

    /// Inject transient failures into the next `n` mutating calls.
    pub fn fail_next_mutations(&self, n: u32) {
        self.state.lock().unwrap().fail_mutations = n;
    }

    // --- third-party action simulation ---

    pub fn simulate_role_create(&self, actor: PrincipalId, spec: &RoleSpec) -> PlatformEvent {
        let info = self.seed_role(spec, 1);
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, ActionKind::RoleCreate, actor, LedgerTarget::Role(info.id));
        PlatformEvent::RoleCreated(info)
    }

    pub fn simulate_role_delete(&self, actor: PrincipalId, role: RoleId) -> PlatformEvent {
        let mut state = self.state.lock().unwrap();
        let info = state.roles.remove(&role).expect("role to delete");
        Self::record(&mut state, ActionKind::RoleDelete, actor, LedgerTarget::Role(role));
        PlatformEvent::RoleDeleted(info)
    }

    pub fn simulate_role_update(
        &self,
        actor: PrincipalId,
        role: RoleId,
        permissions: PermissionSet,
    ) -> PlatformEvent {
        let mut state = self.state.lock().unwrap();
        let before = state.roles.get(&role).expect("role to update").clone();
        let entry = state.roles.get_mut(&role).expect("role to update");
        entry.permissions = permissions;
        let after = entry.clone();
        Self::record(&mut state, ActionKind::RoleUpdate, actor, LedgerTarget::Role(role));
        PlatformEvent::RoleUpdated { before, after }
    }

    pub fn simulate_role_move(&self, actor: PrincipalId, role: RoleId, position: u32) -> PlatformEvent {
        let mut state = self.state.lock().unwrap();
        let before = state.roles.get(&role).expect("role to move").clone();
        let entry = state.roles.get_mut(&role).expect("role to move");
        entry.position = position;
        let after = entry.clone();
        Self::record(&mut state, ActionKind::RoleMove, actor, LedgerTarget::Role(role));
        PlatformEvent::RoleUpdated { before, after }
    }

    pub fn simulate_channel_delete(&self, actor: PrincipalId, channel: ChannelId) -> PlatformEvent {
        let mut state = self.state.lock().unwrap();
        let info = state.channels.remove(&channel).expect("channel to delete");
        Self::record(
            &mut state,
            ActionKind::ChannelDelete,
            actor,
            LedgerTarget::Channel(channel),
        );
        PlatformEvent::ChannelDeleted(info)
    }

    pub fn simulate_channel_create(&self, actor: PrincipalId, spec: &ChannelSpec) -> PlatformEvent {
        let info = self.seed_channel(spec);
        let mut state = self.state.lock().unwrap();
        Self::record(
            &mut state,
            ActionKind::ChannelCreate,
            actor,
            LedgerTarget::Channel(info.id),
        );
        PlatformEvent::ChannelCreated(info)
    }

    pub fn simulate_ban(&self, actor: PrincipalId, target: PrincipalId) -> PlatformEvent {
        let mut state = self.state.lock().unwrap();
        state.banned.insert(target);
        state.members.remove(&target);
        Self::record(&mut state, ActionKind::Ban, actor, LedgerTarget::Member(target));
        PlatformEvent::MemberBanned(target)
    }

    pub fn simulate_kick(&self, actor: PrincipalId, target: &MemberInfo) -> PlatformEvent {
        let mut state = self.state.lock().unwrap();
        state.members.remove(&target.id);
        Self::record(&mut state, ActionKind::Kick, actor, LedgerTarget::Member(target.id));
        PlatformEvent::MemberRemoved(target.clone())
    }

    pub fn simulate_invite_create(&self, actor: PrincipalId, code: &str) -> PlatformEvent {
        let info = InviteInfo {
            code: code.to_string(),
            creator: actor,
        };
        let mut state = self.state.lock().unwrap();
        state.invites.push(info.clone());
        Self::record(
            &mut state,
            ActionKind::InviteCreate,
            actor,
            LedgerTarget::Invite(code.to_string()),
        );
        PlatformEvent::InviteCreated(info)
    }

    pub fn simulate_webhook_create(&self, actor: PrincipalId, channel: ChannelId) -> PlatformEvent {
        let mut state = self.state.lock().unwrap();
        let id = WebhookId(Self::alloc_id(&mut state));
        let info = WebhookInfo {
            id,
            channel,
            name: "hook".to_string(),
        };
        state.webhooks.insert(id, info.clone());
        Self::record(
            &mut state,
            ActionKind::WebhookCreate,
            actor,
            LedgerTarget::Webhook(id),
        );
        PlatformEvent::WebhookCreated(info)
    }

    pub fn simulate_role_grant(
        &self,
        actor: PrincipalId,
        member: PrincipalId,
        role: RoleId,
    ) -> PlatformEvent {
        let mut state = self.state.lock().unwrap();
        let entry = state.members.get_mut(&member).expect("member for grant");
        entry.roles.push(role);
        let info = entry.clone();
        Self::record(
            &mut state,
            ActionKind::MemberRoleGrant,
            actor,
            LedgerTarget::Member(member),
        );
        PlatformEvent::MemberRolesUpdated {
            member: info,
            added: vec![role],
        }
    }

    pub fn simulate_join(&self, member: MemberInfo) -> PlatformEvent {
        self.seed_member(member.clone());
        PlatformEvent::MemberJoined(member)
    }

    pub fn simulate_message(&self, author: PrincipalId, channel: ChannelId) -> PlatformEvent {
        PlatformEvent::MessageSent {
            author,
            channel,
            sent_at: SystemTime::now(),
        }
    }

    pub fn simulate_voice_join(&self, member: PrincipalId, channel: ChannelId) -> PlatformEvent {
        PlatformEvent::VoiceStateChanged {
            member,
            from: None,
            to: Some(channel),
        }
    }

    // --- assertion accessors ---

    pub fn is_banned(&self, id: PrincipalId) -> bool {
        self.state.lock().unwrap().banned.contains(&id)
    }

    pub fn was_kicked(&self, id: PrincipalId) -> bool {
        self.state.lock().unwrap().kicked.contains(&id)
    }

    pub fn role_named(&self, name: &str) -> Option<RoleInfo> {
        self.state
            .lock()
            .unwrap()
            .roles
            .values()
            .find(|r| r.name == name)
            .cloned()
    }

    pub fn channel_named(&self, name: &str) -> Option<ChannelInfo> {
        self.state
            .lock()
            .unwrap()
            .channels
            .values()
            .find(|c| c.name == name)
            .cloned()
    }

    pub fn role(&self, id: RoleId) -> Option<RoleInfo> {
        self.state.lock().unwrap().roles.get(&id).cloned()
    }

    pub fn invite_count(&self) -> usize {
        self.state.lock().unwrap().invites.len()
    }

    pub fn webhook_count(&self) -> usize {
        self.state.lock().unwrap().webhooks.len()
    }

    pub fn direct_messages_to(&self, id: PrincipalId) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .direct_messages
            .iter()
            .filter(|(to, _)| *to == id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn channel_messages(&self) -> Vec<(ChannelId, String)> {
        self.state.lock().unwrap().channel_messages.clone()
    }

    pub fn voice_moves(&self) -> Vec<(PrincipalId, ChannelId)> {
        self.state.lock().unwrap().voice_moves.clone()
    }

    pub fn engine_voice_connected(&self, channel: ChannelId) -> bool {
        self.state.lock().unwrap().voice_connections.contains(&channel)
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    async fn community(&self) -> PlatformResult<CommunityInfo> {
        let state = self.state.lock().unwrap();
        Ok(CommunityInfo {
            id: 1,
            name: state.community_name.clone(),
            owner: state.owner,
            settings: state.settings.clone(),
        })
    }

    async fn roles(&self) -> PlatformResult<Vec<RoleInfo>> {
        let state = self.state.lock().unwrap();
        let mut roles: Vec<_> = state.roles.values().cloned().collect();
        roles.sort_by(|a, b| b.position.cmp(&a.position).then(a.id.cmp(&b.id)));
        Ok(roles)
    }

    async fn categories(&self) -> PlatformResult<Vec<CategoryInfo>> {
        let state = self.state.lock().unwrap();
        let mut cats: Vec<_> = state.categories.values().cloned().collect();
        cats.sort_by_key(|c| (c.position, c.id));
        Ok(cats)
    }

    async fn channels(&self) -> PlatformResult<Vec<ChannelInfo>> {
        let state = self.state.lock().unwrap();
        let mut channels: Vec<_> = state.channels.values().cloned().collect();
        channels.sort_by_key(|c| (c.position, c.id));
        Ok(channels)
    }

    async fn emojis(&self) -> PlatformResult<Vec<EmojiInfo>> {
        Ok(self.state.lock().unwrap().emojis.clone())
    }

    async fn invites(&self) -> PlatformResult<Vec<InviteInfo>> {
        Ok(self.state.lock().unwrap().invites.clone())
    }

    async fn member(&self, id: PrincipalId) -> PlatformResult<MemberInfo> {
        self.state
            .lock()
            .unwrap()
            .members
            .get(&id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("member {id}")))
    }

    async fn recent_ledger(
        &self,
        kind: ActionKind,
        limit: usize,
    ) -> PlatformResult<Vec<LedgerEntry>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .ledger
            .iter()
            .filter(|e| e.kind == kind)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create_role(&self, spec: &RoleSpec) -> PlatformResult<RoleInfo> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        let id = RoleId(Self::alloc_id(&mut state));
        // Creation order affects default ranking: new roles land at the
        // bottom, mirroring the platform.
        let position = state.roles.len() as u32 + 1;
        let info = RoleInfo {
            id,
            name: spec.name.clone(),
            color: spec.color,
            hoist: spec.hoist,
            permissions: spec.permissions,
            mentionable: spec.mentionable,
            position,
            managed: false,
        };
        state.roles.insert(id, info.clone());
        let actor = self.self_id;
        Self::record(&mut state, ActionKind::RoleCreate, actor, LedgerTarget::Role(id));
        Ok(info)
    }

    async fn delete_role(&self, id: RoleId) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        state
            .roles
            .remove(&id)
            .ok_or_else(|| PlatformError::NotFound(format!("role {id}")))?;
        let actor = self.self_id;
        Self::record(&mut state, ActionKind::RoleDelete, actor, LedgerTarget::Role(id));
        Ok(())
    }

    async fn edit_role_permissions(
        &self,
        id: RoleId,
        permissions: PermissionSet,
    ) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        let role = state
            .roles
            .get_mut(&id)
            .ok_or_else(|| PlatformError::NotFound(format!("role {id}")))?;
        role.permissions = permissions;
        Ok(())
    }

    async fn edit_role_position(&self, id: RoleId, position: u32) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        let role = state
            .roles
            .get_mut(&id)
            .ok_or_else(|| PlatformError::NotFound(format!("role {id}")))?;
        role.position = position;
        Ok(())
    }

    async fn create_category(&self, spec: &CategorySpec) -> PlatformResult<CategoryInfo> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        let id = CategoryId(Self::alloc_id(&mut state));
        let info = CategoryInfo {
            id,
            name: spec.name.clone(),
            position: spec.position,
            overwrites: spec.overwrites.clone(),
        };
        state.categories.insert(id, info.clone());
        Ok(info)
    }

    async fn create_channel(&self, spec: &ChannelSpec) -> PlatformResult<ChannelInfo> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        let id = ChannelId(Self::alloc_id(&mut state));
        let info = ChannelInfo {
            id,
            name: spec.name.clone(),
            position: spec.position,
            category: spec.category,
            attrs: spec.attrs.clone(),
            overwrites: spec.overwrites.clone(),
        };
        state.channels.insert(id, info.clone());
        let actor = self.self_id;
        Self::record(
            &mut state,
            ActionKind::ChannelCreate,
            actor,
            LedgerTarget::Channel(id),
        );
        Ok(info)
    }

    async fn delete_channel(&self, id: ChannelId) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        state
            .channels
            .remove(&id)
            .ok_or_else(|| PlatformError::NotFound(format!("channel {id}")))?;
        let actor = self.self_id;
        Self::record(
            &mut state,
            ActionKind::ChannelDelete,
            actor,
            LedgerTarget::Channel(id),
        );
        Ok(())
    }

    async fn delete_category(&self, id: CategoryId) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        state
            .categories
            .remove(&id)
            .ok_or_else(|| PlatformError::NotFound(format!("category {id}")))?;
        Ok(())
    }

    async fn edit_community_settings(&self, settings: &CommunitySettings) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        state.settings = settings.clone();
        Ok(())
    }

    async fn delete_invite(&self, code: &str) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        let before = state.invites.len();
        state.invites.retain(|i| i.code != code);
        if state.invites.len() == before {
            return Err(PlatformError::NotFound(format!("invite {code}")));
        }
        Ok(())
    }

    async fn delete_webhook(&self, id: WebhookId) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        state
            .webhooks
            .remove(&id)
            .ok_or_else(|| PlatformError::NotFound(format!("webhook {id}")))?;
        Ok(())
    }

    async fn ban(&self, id: PrincipalId, _reason: &str) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        state.banned.insert(id);
        state.members.remove(&id);
        let actor = self.self_id;
        Self::record(&mut state, ActionKind::Ban, actor, LedgerTarget::Member(id));
        Ok(())
    }

    async fn unban(&self, id: PrincipalId, _reason: &str) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        if !state.banned.remove(&id) {
            return Err(PlatformError::NotFound(format!("ban for {id}")));
        }
        Ok(())
    }

    async fn kick(&self, id: PrincipalId, _reason: &str) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        state.members.remove(&id);
        state.kicked.push(id);
        let actor = self.self_id;
        Self::record(&mut state, ActionKind::Kick, actor, LedgerTarget::Member(id));
        Ok(())
    }

    async fn remove_member_role(&self, member: PrincipalId, role: RoleId) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        let entry = state
            .members
            .get_mut(&member)
            .ok_or_else(|| PlatformError::NotFound(format!("member {member}")))?;
        entry.roles.retain(|r| *r != role);
        Ok(())
    }

    async fn move_to_channel(
        &self,
        member: PrincipalId,
        channel: ChannelId,
    ) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        state.voice_moves.push((member, channel));
        Ok(())
    }

    async fn connect_voice(&self, channel: ChannelId) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        if !state.channels.contains_key(&channel) {
            return Err(PlatformError::NotFound(format!("channel {channel}")));
        }
        state.voice_connections.insert(channel);
        Ok(())
    }

    async fn voice_connected(&self, channel: ChannelId) -> PlatformResult<bool> {
        Ok(self.state.lock().unwrap().voice_connections.contains(&channel))
    }

    async fn send_direct(&self, recipient: PrincipalId, text: &str) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        state.direct_messages.push((recipient, text.to_string()));
        Ok(())
    }

    async fn send_to_channel(&self, channel: ChannelId, text: &str) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.channels.contains_key(&channel) {
            return Err(PlatformError::NotFound(format!("channel {channel}")));
        }
        state.channel_messages.push((channel, text.to_string()));
        Ok(())
    }

    fn self_id(&self) -> PrincipalId {
        self.self_id
    }
}
