//! Best-effort owner alerting.
//!
//! Critical findings are delivered to the owner by direct message. When
//! the DM fails (closed inbox, transient error), the alert falls back to
//! a dedicated log channel, created on demand with a deny-default
//! overwrite so only the engine and trusted principals can read it.
//! Alerting itself never fails the caller.

use crate::platform::types::*;
use crate::platform::{PlatformClient, PlatformError};
use crate::trust::TrustRegistry;
use tracing::{error, warn};

/// Name of the fallback alert channel.
pub const ALERT_CHANNEL: &str = "security-log";

/// Deliver `text` to the community owner, falling back to the alert
/// channel. Errors are logged and swallowed.
pub async fn notify_owner<C: PlatformClient>(client: &C, registry: &TrustRegistry, text: &str) {
    let owner = registry.owner();

    if client.send_direct(owner, text).await.is_ok() {
        return;
    }

    warn!(target: "warden::system", "owner DM failed, falling back to alert channel");
    match alert_channel(client, registry).await {
        Ok(channel) => {
            if let Err(e) = client.send_to_channel(channel, text).await {
                error!(target: "warden::system", error = %e, "alert channel delivery failed");
            }
        }
        Err(e) => {
            error!(target: "warden::system", error = %e, "could not resolve alert channel");
        }
    }
}

/// Find the alert channel, creating it if absent.
async fn alert_channel<C: PlatformClient>(
    client: &C,
    registry: &TrustRegistry,
) -> Result<ChannelId, PlatformError> {
    let channels = client.channels().await?;
    if let Some(existing) = channels.iter().find(|c| c.name == ALERT_CHANNEL) {
        return Ok(existing.id);
    }

    let mut overwrites = vec![Overwrite {
        target: OverwriteTarget::Default,
        allow: PermissionSet::empty(),
        deny: PermissionSet(PermissionSet::VIEW_CHANNEL),
    }];
    for trusted in registry.snapshot() {
        overwrites.push(Overwrite {
            target: OverwriteTarget::Member(trusted.id),
            allow: PermissionSet(PermissionSet::VIEW_CHANNEL),
            deny: PermissionSet::empty(),
        });
    }

    let created = client
        .create_channel(&ChannelSpec {
            name: ALERT_CHANNEL.to_string(),
            position: 0,
            category: None,
            attrs: ChannelAttrs::Text {
                topic: Some("automated security alerts".to_string()),
                slowmode_secs: 0,
            },
            overwrites,
        })
        .await?;
    Ok(created.id)
}
