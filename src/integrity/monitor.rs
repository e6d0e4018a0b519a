//! Real-time remediation of hostile administrative actions.
//!
//! The monitor receives raw platform events, correlates them with the
//! action ledger to find the responsible actor, and reverses anything an
//! untrusted actor did: dangerous roles are deleted or stripped, deleted
//! objects are recreated, illegitimate bans undone, rogue invites and
//! webhooks removed. Once an actor crosses the mass-delete threshold the
//! ban replaces per-object recreation for their further deletions.
//!
//! No remote error escapes a handler. Transient failures retry with
//! backoff, permission failures alert the owner, and a missing target
//! means the goal is already met.

use crate::alert::notify_owner;
use crate::journal::target;
use crate::platform::retry::retry_transient;
use crate::platform::types::*;
use crate::platform::{
    ActionEvent, ActionKind, LedgerTarget, PlatformClient, PlatformError, PlatformEvent,
    LEDGER_LOOKBACK,
};
use crate::trust::TrustRegistry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::cooldown::CooldownTracker;

/// Cap on remembered remediated ledger entries.
const HANDLED_CAP: usize = 1024;

/// Insertion-ordered set of remediated ledger entry ids; the oldest
/// entries are evicted past the cap.
#[derive(Default)]
struct HandledSet {
    seen: HashSet<LedgerEntryId>,
    order: VecDeque<LedgerEntryId>,
}

impl HandledSet {
    /// Returns false when the entry was already present.
    fn insert(&mut self, id: LedgerEntryId) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > HANDLED_CAP {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }
}

/// Reverses destructive actions by untrusted principals.
pub struct IntegrityMonitor<C: PlatformClient> {
    client: C,
    registry: Arc<TrustRegistry>,
    cooldowns: CooldownTracker,
    /// Ledger entries already remediated; a burst of duplicate events for
    /// the same entry must not double-punish.
    handled: Mutex<HandledSet>,
    /// One async lock per offending actor so concurrent events for the
    /// same actor serialize their check-then-act sequences.
    actor_locks: Mutex<HashMap<PrincipalId, Arc<tokio::sync::Mutex<()>>>>,
    lockdown: AtomicBool,
}

impl<C: PlatformClient> IntegrityMonitor<C> {
    pub fn new(client: C, registry: Arc<TrustRegistry>) -> Self {
        Self {
            client,
            registry,
            cooldowns: CooldownTracker::new(),
            handled: Mutex::new(HandledSet::default()),
            actor_locks: Mutex::new(HashMap::new()),
            lockdown: AtomicBool::new(false),
        }
    }

    /// Toggle lockdown. Under lockdown, role and channel creation by
    /// untrusted actors is reversed even without dangerous permissions.
    pub fn toggle_lockdown(&self) -> bool {
        let was = self.lockdown.fetch_xor(true, Ordering::SeqCst);
        let now = !was;
        warn!(target: target::INTEGRITY, enabled = now, "lockdown toggled");
        now
    }

    pub fn lockdown_active(&self) -> bool {
        self.lockdown.load(Ordering::SeqCst)
    }

    /// Drop expired cooldown windows and idle actor locks. Called by the
    /// maintenance task.
    pub fn prune(&self) {
        self.cooldowns.prune(Instant::now());
        let mut locks = self.actor_locks.lock().unwrap();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    #[cfg(test)]
    fn tracked_actor_locks(&self) -> usize {
        self.actor_locks.lock().unwrap().len()
    }

    /// Process one raw platform event. Never returns an error; remote
    /// failures are handled at this boundary.
    pub async fn process(&self, event: &PlatformEvent) {
        match event {
            PlatformEvent::RoleCreated(info) => self.on_role_created(info).await,
            PlatformEvent::RoleDeleted(info) => self.on_role_deleted(info).await,
            PlatformEvent::RoleUpdated { before, after } => {
                self.on_role_updated(before, after).await
            }
            PlatformEvent::ChannelCreated(info) => self.on_channel_created(info).await,
            PlatformEvent::ChannelDeleted(info) => self.on_channel_deleted(info).await,
            PlatformEvent::MemberBanned(id) => self.on_member_banned(*id).await,
            PlatformEvent::MemberRemoved(member) => self.on_member_removed(member).await,
            PlatformEvent::MemberRolesUpdated { member, added } => {
                self.on_roles_granted(member, added).await
            }
            PlatformEvent::InviteCreated(info) => self.on_invite_created(info).await,
            PlatformEvent::WebhookCreated(info) => self.on_webhook_created(info).await,
            // Joins, messages and voice are handled by other components.
            _ => {}
        }
    }

    // --- correlation and gating ---

    /// Resolve the actor behind an event, filtering out actions the
    /// monitor must leave alone. Returns `None` for system-caused events,
    /// trusted actors, the engine itself, and already-handled entries.
    async fn culprit(&self, kind: ActionKind, ledger_target: &LedgerTarget) -> Option<ActionEvent> {
        let entries = match self.client.recent_ledger(kind, LEDGER_LOOKBACK).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(target: target::INTEGRITY, error = %e, ?kind, "ledger lookup failed");
                return None;
            }
        };

        let action = match ActionEvent::correlate(&entries, kind, ledger_target) {
            Some(action) => action,
            None => {
                debug!(target: target::INTEGRITY, ?kind, ?ledger_target, "no ledger actor, system-caused");
                return None;
            }
        };

        if action.actor == self.client.self_id() {
            return None;
        }
        if self.registry.contains(action.actor) {
            info!(
                target: target::INTEGRITY,
                actor = %action.actor,
                ?kind,
                "action by trusted principal, no remediation"
            );
            return None;
        }

        let mut handled = self.handled.lock().unwrap();
        if !handled.insert(action.ledger_id) {
            debug!(target: target::INTEGRITY, ledger_id = %action.ledger_id, "entry already remediated");
            return None;
        }

        Some(action)
    }

    fn actor_lock(&self, actor: PrincipalId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.actor_locks.lock().unwrap();
        locks.entry(actor).or_default().clone()
    }

    // --- handlers ---

    async fn on_role_created(&self, info: &RoleInfo) {
        let dangerous = info.permissions.is_dangerous();
        if !dangerous && !self.lockdown_active() {
            return;
        }
        let Some(action) = self.culprit(ActionKind::RoleCreate, &LedgerTarget::Role(info.id)).await
        else {
            return;
        };
        let lock = self.actor_lock(action.actor);
        let _guard = lock.lock().await;

        if dangerous {
            error!(
                target: target::PERMISSIONS,
                actor = %action.actor,
                role = %info.name,
                permissions = info.permissions.0,
                "dangerous role created by untrusted actor"
            );
        }
        self.apply(
            "delete hostile role",
            retry_transient(|| self.client.delete_role(info.id)),
        )
        .await;
        self.expel(action.actor, "created unauthorized role").await;
        self.alert(&format!(
            "Removed role '{}' created by untrusted actor {} and expelled them.",
            info.name, action.actor
        ))
        .await;
    }

    async fn on_role_deleted(&self, info: &RoleInfo) {
        let Some(action) = self.culprit(ActionKind::RoleDelete, &LedgerTarget::Role(info.id)).await
        else {
            return;
        };
        let lock = self.actor_lock(action.actor);
        let _guard = lock.lock().await;

        if self.record_destruction(action.actor) {
            // Past the mass-delete threshold the ban replaces per-object
            // recreation.
            self.punish(action.actor, true, "mass role deletion").await;
            return;
        }
        warn!(
            target: target::INTEGRITY,
            actor = %action.actor,
            role = %info.name,
            "untrusted role deletion, restoring"
        );

        let spec = RoleSpec::from_info(info);
        let position = info.position;
        if let Some(created) = self
            .apply_value("recreate deleted role", retry_transient(|| self.client.create_role(&spec)))
            .await
        {
            self.apply(
                "restore role position",
                retry_transient(|| self.client.edit_role_position(created.id, position)),
            )
            .await;
        }

        self.punish(action.actor, false, "deleted protected role")
            .await;
        self.alert(&format!(
            "Restored role '{}' deleted by untrusted actor {}.",
            info.name, action.actor
        ))
        .await;
    }

    async fn on_role_updated(&self, before: &RoleInfo, after: &RoleInfo) {
        let escalation = after.permissions.escalated_from(before.permissions);
        if escalation != 0 {
            let Some(action) = self
                .culprit(ActionKind::RoleUpdate, &LedgerTarget::Role(after.id))
                .await
            else {
                return;
            };
            let lock = self.actor_lock(action.actor);
            let _guard = lock.lock().await;

            error!(
                target: target::PERMISSIONS,
                actor = %action.actor,
                role = %after.name,
                bits = escalation,
                "dangerous permission escalation, reverting"
            );
            let restored = before.permissions;
            self.apply(
                "revert escalated permissions",
                retry_transient(|| self.client.edit_role_permissions(after.id, restored)),
            )
            .await;
            self.expel(action.actor, "escalated role permissions").await;
            self.alert(&format!(
                "Reverted permission escalation on role '{}' by untrusted actor {}.",
                after.name, action.actor
            ))
            .await;
            return;
        }

        if after.position != before.position {
            self.on_role_moved(before, after).await;
        }
    }

    async fn on_role_moved(&self, before: &RoleInfo, after: &RoleInfo) {
        let engine_rank = self.engine_rank().await;
        if after.position <= engine_rank {
            return;
        }
        let Some(action) = self.culprit(ActionKind::RoleMove, &LedgerTarget::Role(after.id)).await
        else {
            return;
        };
        let lock = self.actor_lock(action.actor);
        let _guard = lock.lock().await;

        warn!(
            target: target::PERMISSIONS,
            actor = %action.actor,
            role = %after.name,
            from = before.position,
            to = after.position,
            engine_rank,
            "role moved above engine rank, reverting"
        );
        let restored = before.position;
        self.apply(
            "revert role position",
            retry_transient(|| self.client.edit_role_position(after.id, restored)),
        )
        .await;
        self.expel(action.actor, "moved role above engine rank").await;
    }

    async fn on_channel_created(&self, info: &ChannelInfo) {
        if !self.lockdown_active() {
            return;
        }
        let Some(action) = self
            .culprit(ActionKind::ChannelCreate, &LedgerTarget::Channel(info.id))
            .await
        else {
            return;
        };
        let lock = self.actor_lock(action.actor);
        let _guard = lock.lock().await;

        warn!(
            target: target::INTEGRITY,
            actor = %action.actor,
            channel = %info.name,
            "channel created under lockdown, removing"
        );
        self.apply(
            "delete lockdown channel",
            retry_transient(|| self.client.delete_channel(info.id)),
        )
        .await;
        self.expel(action.actor, "created channel under lockdown").await;
    }

    async fn on_channel_deleted(&self, info: &ChannelInfo) {
        let Some(action) = self
            .culprit(ActionKind::ChannelDelete, &LedgerTarget::Channel(info.id))
            .await
        else {
            return;
        };
        let lock = self.actor_lock(action.actor);
        let _guard = lock.lock().await;

        if self.record_destruction(action.actor) {
            self.punish(action.actor, true, "mass channel deletion").await;
            return;
        }
        warn!(
            target: target::INTEGRITY,
            actor = %action.actor,
            channel = %info.name,
            "untrusted channel deletion, restoring"
        );

        let spec = ChannelSpec::from_info(info);
        self.apply_value("recreate deleted channel", retry_transient(|| self.client.create_channel(&spec)))
            .await;

        self.punish(action.actor, false, "deleted protected channel")
            .await;
        self.alert(&format!(
            "Restored channel '{}' deleted by untrusted actor {}.",
            info.name, action.actor
        ))
        .await;
    }

    async fn on_member_banned(&self, member: PrincipalId) {
        let Some(action) = self.culprit(ActionKind::Ban, &LedgerTarget::Member(member)).await
        else {
            return;
        };
        let lock = self.actor_lock(action.actor);
        let _guard = lock.lock().await;

        warn!(
            target: target::INTEGRITY,
            actor = %action.actor,
            victim = %member,
            "unauthorized ban, reverting"
        );
        self.apply(
            "revert unauthorized ban",
            retry_transient(|| self.client.unban(member, "ban by untrusted actor reverted")),
        )
        .await;
        self.expel(action.actor, "banned member without authorization")
            .await;
        self.alert(&format!(
            "Unbanned {} after unauthorized ban by {}.",
            member, action.actor
        ))
        .await;
    }

    async fn on_member_removed(&self, member: &MemberInfo) {
        // Only kicks have a ledger entry; a voluntary leave correlates
        // with nothing and is ignored.
        let Some(action) = self.culprit(ActionKind::Kick, &LedgerTarget::Member(member.id)).await
        else {
            return;
        };
        let lock = self.actor_lock(action.actor);
        let _guard = lock.lock().await;

        warn!(
            target: target::INTEGRITY,
            actor = %action.actor,
            victim = %member.id,
            "unauthorized kick"
        );
        self.expel(action.actor, "kicked member without authorization")
            .await;
    }

    async fn on_roles_granted(&self, member: &MemberInfo, added: &[RoleId]) {
        let dangerous = match self.dangerous_roles(added).await {
            Some(roles) if !roles.is_empty() => roles,
            _ => return,
        };
        let Some(action) = self
            .culprit(ActionKind::MemberRoleGrant, &LedgerTarget::Member(member.id))
            .await
        else {
            return;
        };
        let lock = self.actor_lock(action.actor);
        let _guard = lock.lock().await;

        error!(
            target: target::PERMISSIONS,
            actor = %action.actor,
            member = %member.id,
            roles = dangerous.len(),
            "dangerous role granted by untrusted actor, stripping"
        );
        for role in &dangerous {
            self.apply(
                "strip granted dangerous role",
                retry_transient(|| self.client.remove_member_role(member.id, *role)),
            )
            .await;
        }
        self.expel(action.actor, "granted dangerous role").await;
        self.alert(&format!(
            "Stripped dangerous role grant on {} by untrusted actor {}.",
            member.id, action.actor
        ))
        .await;
    }

    async fn on_invite_created(&self, info: &InviteInfo) {
        let Some(action) = self
            .culprit(ActionKind::InviteCreate, &LedgerTarget::Invite(info.code.clone()))
            .await
        else {
            return;
        };
        let lock = self.actor_lock(action.actor);
        let _guard = lock.lock().await;

        warn!(
            target: target::SECURITY,
            actor = %action.actor,
            code = %info.code,
            "unauthorized invite, revoking"
        );
        self.apply(
            "revoke unauthorized invite",
            retry_transient(|| self.client.delete_invite(&info.code)),
        )
        .await;
        self.expel(action.actor, "created unauthorized invite").await;
    }

    async fn on_webhook_created(&self, info: &WebhookInfo) {
        let Some(action) = self
            .culprit(ActionKind::WebhookCreate, &LedgerTarget::Webhook(info.id))
            .await
        else {
            return;
        };
        let lock = self.actor_lock(action.actor);
        let _guard = lock.lock().await;

        warn!(
            target: target::SECURITY,
            actor = %action.actor,
            webhook = %info.id,
            "unauthorized webhook, removing"
        );
        self.apply(
            "remove unauthorized webhook",
            retry_transient(|| self.client.delete_webhook(info.id)),
        )
        .await;
        self.expel(action.actor, "created unauthorized webhook").await;
    }

    // --- remediation primitives ---

    /// Record a destructive action and report whether the actor crossed
    /// the mass-delete threshold.
    fn record_destruction(&self, actor: PrincipalId) -> bool {
        let now = Instant::now();
        self.cooldowns.record(actor, now);
        self.cooldowns.is_escalated(actor, now)
    }

    /// Kick the offending actor, or ban when the mass-delete window
    /// escalated them.
    async fn punish(&self, actor: PrincipalId, escalated: bool, reason: &str) {
        if escalated {
            error!(
                target: target::INTEGRITY,
                %actor,
                reason,
                "mass-delete threshold crossed, banning actor"
            );
            self.apply(
                "ban escalated actor",
                retry_transient(|| self.client.ban(actor, reason)),
            )
            .await;
            self.alert(&format!(
                "Banned {} for mass deletion ({}).",
                actor, reason
            ))
            .await;
        } else {
            self.expel(actor, reason).await;
        }
    }

    async fn expel(&self, actor: PrincipalId, reason: &str) {
        self.apply(
            "expel offending actor",
            retry_transient(|| self.client.kick(actor, reason)),
        )
        .await;
    }

    async fn alert(&self, text: &str) {
        notify_owner(&self.client, &self.registry, text).await;
    }

    /// Highest role position held by the engine's own principal.
    async fn engine_rank(&self) -> u32 {
        let member = match self.client.member(self.client.self_id()).await {
            Ok(member) => member,
            Err(_) => return 0,
        };
        let roles = match self.client.roles().await {
            Ok(roles) => roles,
            Err(_) => return 0,
        };
        roles
            .iter()
            .filter(|r| member.roles.contains(&r.id))
            .map(|r| r.position)
            .max()
            .unwrap_or(0)
    }

    /// Subset of `ids` whose roles carry dangerous permissions.
    async fn dangerous_roles(&self, ids: &[RoleId]) -> Option<Vec<RoleId>> {
        let roles = match self.client.roles().await {
            Ok(roles) => roles,
            Err(e) => {
                warn!(target: target::INTEGRITY, error = %e, "role listing failed");
                return None;
            }
        };
        Some(
            roles
                .iter()
                .filter(|r| ids.contains(&r.id) && r.permissions.is_dangerous())
                .map(|r| r.id)
                .collect(),
        )
    }

    /// Run a remediation call, classifying the outcome. A missing target
    /// counts as success; a permission failure alerts the owner.
    async fn apply<Fut>(&self, what: &str, operation: Fut)
    where
        Fut: std::future::Future<Output = Result<(), PlatformError>>,
    {
        let _ = self.apply_value(what, operation).await;
    }

    async fn apply_value<Fut, T>(&self, what: &str, operation: Fut) -> Option<T>
    where
        Fut: std::future::Future<Output = Result<T, PlatformError>>,
    {
        match operation.await {
            Ok(value) => Some(value),
            Err(e) if e.is_already_gone() => {
                debug!(target: target::INTEGRITY, what, "target already gone");
                None
            }
            Err(PlatformError::PermissionDenied(msg)) => {
                error!(target: target::INTEGRITY, what, error = %msg, "CRITICAL: missing capability for remediation");
                self.alert(&format!(
                    "Remediation '{what}' failed: the engine lacks the required capability ({msg})."
                ))
                .await;
                None
            }
            Err(e) => {
                warn!(target: target::INTEGRITY, what, error = %e, "remediation call failed");
                None
            }
        }
    }
}
