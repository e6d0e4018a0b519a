//! Platform client trait abstraction.
//!
//! Every remote interaction goes through `PlatformClient`, which enables
//! full test coverage via `MockPlatform` without touching the real
//! platform. The remote service is the system of record: calls may be
//! rate-limited or partially applied, and the error taxonomy here is the
//! engine's only window into that.

use super::events::{ActionKind, LedgerEntry};
use super::types::*;
use async_trait::async_trait;

/// Result type for platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Platform client errors.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// Rate-limited or network failure. Logged and retried by callers
    /// that opt in; never escapes a handler.
    #[error("transient remote error: {0}")]
    Transient(String),

    /// The engine lacks capability for the attempted action. Logged at
    /// CRITICAL and reported to the owner; never crashes the engine.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Target already absent. Treated as success by remediation paths.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Invalid(String),
}

impl PlatformError {
    /// Transient errors are the only retryable class.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PlatformError::Transient(_))
    }

    /// NotFound means the remediation goal is already met.
    pub fn is_already_gone(&self) -> bool {
        matches!(self, PlatformError::NotFound(_))
    }
}

/// Abstraction over the managed community's platform.
///
/// Implementations must be cheaply cloneable handles (the mock and any
/// real client share state behind `Arc`).
#[async_trait]
pub trait PlatformClient: Clone + Send + Sync + 'static {
    // --- introspection ---

    async fn community(&self) -> PlatformResult<CommunityInfo>;
    async fn roles(&self) -> PlatformResult<Vec<RoleInfo>>;
    async fn categories(&self) -> PlatformResult<Vec<CategoryInfo>>;
    async fn channels(&self) -> PlatformResult<Vec<ChannelInfo>>;
    async fn emojis(&self) -> PlatformResult<Vec<EmojiInfo>>;
    async fn invites(&self) -> PlatformResult<Vec<InviteInfo>>;
    async fn member(&self, id: PrincipalId) -> PlatformResult<MemberInfo>;

    /// Newest-first slice of the action ledger for one action kind.
    async fn recent_ledger(
        &self,
        kind: ActionKind,
        limit: usize,
    ) -> PlatformResult<Vec<LedgerEntry>>;

    // --- structural mutations ---

    async fn create_role(&self, spec: &RoleSpec) -> PlatformResult<RoleInfo>;
    async fn delete_role(&self, id: RoleId) -> PlatformResult<()>;
    async fn edit_role_permissions(
        &self,
        id: RoleId,
        permissions: PermissionSet,
    ) -> PlatformResult<()>;
    async fn edit_role_position(&self, id: RoleId, position: u32) -> PlatformResult<()>;
    async fn create_category(&self, spec: &CategorySpec) -> PlatformResult<CategoryInfo>;
    async fn create_channel(&self, spec: &ChannelSpec) -> PlatformResult<ChannelInfo>;
    async fn delete_channel(&self, id: ChannelId) -> PlatformResult<()>;
    async fn delete_category(&self, id: CategoryId) -> PlatformResult<()>;
    async fn edit_community_settings(&self, settings: &CommunitySettings) -> PlatformResult<()>;
    async fn delete_invite(&self, code: &str) -> PlatformResult<()>;
    async fn delete_webhook(&self, id: WebhookId) -> PlatformResult<()>;

    // --- membership mutations ---

    async fn ban(&self, id: PrincipalId, reason: &str) -> PlatformResult<()>;
    async fn unban(&self, id: PrincipalId, reason: &str) -> PlatformResult<()>;
    async fn kick(&self, id: PrincipalId, reason: &str) -> PlatformResult<()>;
    async fn remove_member_role(&self, member: PrincipalId, role: RoleId) -> PlatformResult<()>;

    // --- voice ---

    async fn move_to_channel(&self, member: PrincipalId, channel: ChannelId)
        -> PlatformResult<()>;
    async fn connect_voice(&self, channel: ChannelId) -> PlatformResult<()>;
    async fn voice_connected(&self, channel: ChannelId) -> PlatformResult<bool>;

    // --- notifications ---

    async fn send_direct(&self, recipient: PrincipalId, text: &str) -> PlatformResult<()>;
    async fn send_to_channel(&self, channel: ChannelId, text: &str) -> PlatformResult<()>;

    /// The engine's own principal id.
    fn self_id(&self) -> PrincipalId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(PlatformError::Transient("rate limited".into()).is_retryable());
        assert!(!PlatformError::PermissionDenied("missing capability".into()).is_retryable());
        assert!(!PlatformError::NotFound("channel 9".into()).is_retryable());
    }

    #[test]
    fn test_not_found_is_success_for_remediation() {
        assert!(PlatformError::NotFound("role 5".into()).is_already_gone());
        assert!(!PlatformError::Transient("timeout".into()).is_already_gone());
    }
}
