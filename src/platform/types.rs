//! Core platform identifiers and structural descriptors.
//!
//! Everything the engine knows about the remote community is expressed in
//! these types. Identifiers are opaque `u64` newtypes; the platform is the
//! system of record and may reassign them (restore builds a remap table).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
            Deserialize,
        )]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(
    /// A member, bot, or other actor on the platform.
    PrincipalId
);
id_newtype!(
    /// A permission group (named, ordered capability bundle).
    RoleId
);
id_newtype!(
    /// A container holding a message stream or a live audio room.
    ChannelId
);
id_newtype!(
    /// A group container organizing channels with shared permission inheritance.
    CategoryId
);
id_newtype!(WebhookId);
id_newtype!(EmojiId);
id_newtype!(
    /// An entry in the platform's append-only action ledger.
    LedgerEntryId
);

/// Permission bitset, mirroring the platform's capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionSet(pub u64);

impl PermissionSet {
    pub const ADMINISTRATOR: u64 = 1 << 0;
    pub const MANAGE_COMMUNITY: u64 = 1 << 1;
    pub const MANAGE_ROLES: u64 = 1 << 2;
    pub const MANAGE_CHANNELS: u64 = 1 << 3;
    pub const MANAGE_MESSAGES: u64 = 1 << 4;
    pub const MANAGE_WEBHOOKS: u64 = 1 << 5;
    pub const MANAGE_EMOJI: u64 = 1 << 6;
    pub const BAN_MEMBERS: u64 = 1 << 7;
    pub const KICK_MEMBERS: u64 = 1 << 8;
    pub const MENTION_EVERYONE: u64 = 1 << 9;
    pub const MOVE_MEMBERS: u64 = 1 << 10;
    pub const MUTE_MEMBERS: u64 = 1 << 11;
    pub const VIEW_AUDIT_LOG: u64 = 1 << 12;
    pub const CREATE_INVITE: u64 = 1 << 13;
    pub const CONNECT: u64 = 1 << 14;
    pub const SPEAK: u64 = 1 << 15;
    pub const VIEW_CHANNEL: u64 = 1 << 16;
    pub const SEND_MESSAGES: u64 = 1 << 17;

    /// Bits that allow destructive administrative action. A role carrying
    /// any of these is treated as dangerous by the Integrity Monitor.
    pub const DANGEROUS: u64 = Self::ADMINISTRATOR
        | Self::MANAGE_COMMUNITY
        | Self::MANAGE_ROLES
        | Self::MANAGE_CHANNELS
        | Self::MANAGE_MESSAGES
        | Self::MANAGE_WEBHOOKS
        | Self::MANAGE_EMOJI
        | Self::BAN_MEMBERS
        | Self::KICK_MEMBERS
        | Self::MENTION_EVERYONE
        | Self::MOVE_MEMBERS
        | Self::MUTE_MEMBERS;

    pub const fn empty() -> Self {
        PermissionSet(0)
    }

    pub const fn contains(&self, bits: u64) -> bool {
        self.0 & bits != 0
    }

    /// True if any dangerous bit is set.
    pub const fn is_dangerous(&self) -> bool {
        self.contains(Self::DANGEROUS)
    }

    /// Dangerous bits present in `self` but absent in `before`.
    pub const fn escalated_from(&self, before: PermissionSet) -> u64 {
        (self.0 & !before.0) & Self::DANGEROUS
    }

    /// Copy with all dangerous bits cleared.
    pub const fn stripped(&self) -> Self {
        PermissionSet(self.0 & !Self::DANGEROUS)
    }
}

/// Target of a permission overwrite: the default (everyone) principal, a
/// role, or an individual member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverwriteTarget {
    Default,
    Role(RoleId),
    Member(PrincipalId),
}

/// Per-channel override of a role's or member's effective capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overwrite {
    pub target: OverwriteTarget,
    pub allow: PermissionSet,
    pub deny: PermissionSet,
}

/// A permission group as observed on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub id: RoleId,
    pub name: String,
    pub color: u32,
    pub hoist: bool,
    pub permissions: PermissionSet,
    pub mentionable: bool,
    pub position: u32,
    /// Platform-managed roles (integration roles) are never deleted or
    /// recreated by the engine.
    pub managed: bool,
}

/// Attributes needed to (re)create a role.
#[derive(Debug, Clone)]
pub struct RoleSpec {
    pub name: String,
    pub color: u32,
    pub hoist: bool,
    pub permissions: PermissionSet,
    pub mentionable: bool,
}

impl RoleSpec {
    pub fn from_info(info: &RoleInfo) -> Self {
        RoleSpec {
            name: info.name.clone(),
            color: info.color,
            hoist: info.hoist,
            permissions: info.permissions,
            mentionable: info.mentionable,
        }
    }
}

/// Channel kind. Text carries a message stream, Voice a live audio room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    Text,
    Voice,
}

/// Kind-specific channel attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelAttrs {
    Text {
        topic: Option<String>,
        slowmode_secs: u32,
    },
    Voice {
        bitrate: u32,
        user_limit: u32,
    },
}

impl ChannelAttrs {
    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelAttrs::Text { .. } => ChannelKind::Text,
            ChannelAttrs::Voice { .. } => ChannelKind::Voice,
        }
    }
}

/// A container as observed on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub position: u32,
    pub category: Option<CategoryId>,
    pub attrs: ChannelAttrs,
    pub overwrites: Vec<Overwrite>,
}

/// Attributes needed to (re)create a channel.
#[derive(Debug, Clone)]
pub struct ChannelSpec {
    pub name: String,
    pub position: u32,
    pub category: Option<CategoryId>,
    pub attrs: ChannelAttrs,
    pub overwrites: Vec<Overwrite>,
}

impl ChannelSpec {
    pub fn from_info(info: &ChannelInfo) -> Self {
        ChannelSpec {
            name: info.name.clone(),
            position: info.position,
            category: info.category,
            attrs: info.attrs.clone(),
            overwrites: info.overwrites.clone(),
        }
    }
}

/// A group container as observed on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryInfo {
    pub id: CategoryId,
    pub name: String,
    pub position: u32,
    pub overwrites: Vec<Overwrite>,
}

/// Attributes needed to (re)create a category.
#[derive(Debug, Clone)]
pub struct CategorySpec {
    pub name: String,
    pub position: u32,
    pub overwrites: Vec<Overwrite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmojiInfo {
    pub id: EmojiId,
    pub name: String,
    pub animated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteInfo {
    pub code: String,
    pub creator: PrincipalId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookInfo {
    pub id: WebhookId,
    pub channel: ChannelId,
    pub name: String,
}

/// A member as observed on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub id: PrincipalId,
    pub display_name: String,
    pub created_at: SystemTime,
    pub has_avatar: bool,
    pub roles: Vec<RoleId>,
}

/// Community-level settings the engine snapshots and restores.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommunitySettings {
    pub system_channel: Option<ChannelId>,
    pub rules_channel: Option<ChannelId>,
    pub updates_channel: Option<ChannelId>,
    /// Platform moderation threshold (verification level analogue).
    pub moderation_level: u8,
}

/// Community metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunityInfo {
    pub id: u64,
    pub name: String,
    pub owner: PrincipalId,
    pub settings: CommunitySettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dangerous_detection() {
        let admin = PermissionSet(PermissionSet::ADMINISTRATOR);
        assert!(admin.is_dangerous());

        let benign = PermissionSet(PermissionSet::VIEW_CHANNEL | PermissionSet::SEND_MESSAGES);
        assert!(!benign.is_dangerous());
    }

    #[test]
    fn test_escalation_diff() {
        let before = PermissionSet(PermissionSet::SEND_MESSAGES);
        let after = PermissionSet(PermissionSet::SEND_MESSAGES | PermissionSet::BAN_MEMBERS);

        let escalated = after.escalated_from(before);
        assert_eq!(escalated, PermissionSet::BAN_MEMBERS);

        // No escalation when bits were already present.
        assert_eq!(after.escalated_from(after), 0);
    }

    #[test]
    fn test_id_newtypes_default_to_zero() {
        assert_eq!(PrincipalId::default(), PrincipalId(0));
        assert_eq!(ChannelId::default(), ChannelId(0));
    }

    #[test]
    fn test_stripped_removes_only_dangerous_bits() {
        let mixed = PermissionSet(
            PermissionSet::ADMINISTRATOR | PermissionSet::MANAGE_ROLES | PermissionSet::CONNECT,
        );
        let stripped = mixed.stripped();
        assert!(!stripped.is_dangerous());
        assert!(stripped.contains(PermissionSet::CONNECT));
    }
}
