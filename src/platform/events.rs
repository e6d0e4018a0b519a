//! Inbound platform events and action-ledger correlation.
//!
//! The platform pushes raw entity/membership/message events (at-most-once,
//! no replay). Raw events carry no actor; responsibility is inferred by
//! matching the event against the newest entries of the platform's action
//! ledger. An event with no resolvable actor is system-caused and ignored.

use super::types::*;
use std::time::SystemTime;

/// How many of the most recent ledger entries to inspect when correlating
/// an event with its actor.
pub const LEDGER_LOOKBACK: usize = 5;

/// A raw event pushed by the platform into the ingress queue.
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    RoleCreated(RoleInfo),
    RoleDeleted(RoleInfo),
    RoleUpdated { before: RoleInfo, after: RoleInfo },
    ChannelCreated(ChannelInfo),
    ChannelDeleted(ChannelInfo),
    MemberJoined(MemberInfo),
    /// Covers both voluntary leaves and kicks; the ledger decides which.
    MemberRemoved(MemberInfo),
    MemberBanned(PrincipalId),
    MemberRolesUpdated { member: MemberInfo, added: Vec<RoleId> },
    InviteCreated(InviteInfo),
    WebhookCreated(WebhookInfo),
    MessageSent { author: PrincipalId, channel: ChannelId, sent_at: SystemTime },
    MessageDeleted { author: PrincipalId, channel: ChannelId },
    VoiceStateChanged {
        member: PrincipalId,
        from: Option<ChannelId>,
        to: Option<ChannelId>,
    },
}

/// Administrative action categories recorded in the platform ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    RoleCreate,
    RoleDelete,
    RoleUpdate,
    RoleMove,
    ChannelCreate,
    ChannelDelete,
    MemberRoleGrant,
    Ban,
    Kick,
    InviteCreate,
    WebhookCreate,
}

/// What a ledger entry acted upon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerTarget {
    Role(RoleId),
    Channel(ChannelId),
    Member(PrincipalId),
    Invite(String),
    Webhook(WebhookId),
}

/// One entry of the platform's append-only action ledger.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub kind: ActionKind,
    pub actor: PrincipalId,
    pub target: LedgerTarget,
    pub at: SystemTime,
}

/// A destructive action with responsibility resolved from the ledger.
#[derive(Debug, Clone)]
pub struct ActionEvent {
    pub kind: ActionKind,
    pub actor: PrincipalId,
    pub target: LedgerTarget,
    pub ledger_id: LedgerEntryId,
    pub observed_at: SystemTime,
}

impl ActionEvent {
    /// Correlate a raw event's target with the nearest matching ledger
    /// entry. Returns `None` when no entry matches within the lookback,
    /// which the caller treats as system-caused.
    pub fn correlate(
        entries: &[LedgerEntry],
        kind: ActionKind,
        target: &LedgerTarget,
    ) -> Option<ActionEvent> {
        entries
            .iter()
            .take(LEDGER_LOOKBACK)
            .find(|e| e.kind == kind && e.target == *target)
            .map(|e| ActionEvent {
                kind: e.kind,
                actor: e.actor,
                target: e.target.clone(),
                ledger_id: e.id,
                observed_at: e.at,
            })
    }
}
