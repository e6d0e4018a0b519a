//! Protected voice room supervision.
//!
//! The sentinel keeps one designated voice room alive and occupied: a
//! periodic patrol recreates the room if it was destroyed (deny-default
//! connect, allows only for the trust registry and the engine) and keeps
//! the engine connected to it. Untrusted principals who slip into the
//! room are relocated to another voice room and told why by direct
//! message.

use crate::alert::notify_owner;
use crate::journal::target;
use crate::platform::retry::retry_transient;
use crate::platform::types::*;
use crate::platform::{PlatformClient, PlatformError};
use crate::trust::TrustRegistry;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Interval between patrol passes.
pub const PATROL_INTERVAL: Duration = Duration::from_secs(60);

/// Room name used when the target was destroyed before the sentinel ever
/// observed it.
const FALLBACK_ROOM_NAME: &str = "sanctum";

struct TargetState {
    channel: Option<ChannelId>,
    /// Last observed name, used to recreate the room faithfully.
    room_name: String,
    connected: bool,
}

/// Shared sentinel target, mutated by the console and read by restore.
pub struct SentinelState {
    inner: Mutex<TargetState>,
}

impl SentinelState {
    pub fn new(initial: Option<ChannelId>) -> Self {
        Self {
            inner: Mutex::new(TargetState {
                channel: initial,
                room_name: FALLBACK_ROOM_NAME.to_string(),
                connected: false,
            }),
        }
    }

    pub fn target(&self) -> Option<ChannelId> {
        self.inner.lock().unwrap().channel
    }

    pub fn set_target(&self, channel: Option<ChannelId>) {
        let mut state = self.inner.lock().unwrap();
        state.channel = channel;
        state.connected = false;
        info!(target: target::SECURITY, target_room = ?channel, "sentinel target updated");
    }

    pub fn connected(&self) -> bool {
        self.inner.lock().unwrap().connected
    }

    fn observe(&self, channel: ChannelId, name: &str, connected: bool) {
        let mut state = self.inner.lock().unwrap();
        state.channel = Some(channel);
        state.room_name = name.to_string();
        state.connected = connected;
    }

    fn room_name(&self) -> String {
        self.inner.lock().unwrap().room_name.clone()
    }
}

/// Keeps the protected voice room alive and free of intruders.
pub struct Sentinel<C: PlatformClient> {
    client: C,
    registry: Arc<TrustRegistry>,
    state: Arc<SentinelState>,
}

impl<C: PlatformClient> Sentinel<C> {
    pub fn new(client: C, registry: Arc<TrustRegistry>, state: Arc<SentinelState>) -> Self {
        Self {
            client,
            registry,
            state,
        }
    }

    pub fn state(&self) -> &Arc<SentinelState> {
        &self.state
    }

    /// Supervisory loop; spawned by the engine.
    pub async fn run(self: Arc<Self>) {
        loop {
            self.patrol().await;
            tokio::time::sleep(PATROL_INTERVAL).await;
        }
    }

    /// One supervision pass: recreate the room if destroyed, reconnect if
    /// the engine dropped out.
    pub async fn patrol(&self) {
        let Some(target_room) = self.state.target() else {
            return;
        };

        let channels = match self.client.channels().await {
            Ok(channels) => channels,
            Err(e) => {
                warn!(target: target::SECURITY, error = %e, "channel listing failed during patrol");
                return;
            }
        };

        match channels.iter().find(|c| c.id == target_room) {
            None => {
                warn!(
                    target: target::SECURITY,
                    room = %target_room,
                    "protected room missing, recreating"
                );
                self.recreate_room().await;
            }
            Some(room) => {
                let connected = match self.client.voice_connected(room.id).await {
                    Ok(connected) => connected,
                    Err(e) => {
                        warn!(target: target::SECURITY, error = %e, "voice state query failed");
                        return;
                    }
                };
                if !connected {
                    info!(target: target::SECURITY, room = %room.id, "reconnecting to protected room");
                    self.connect(room.id).await;
                }
                self.state.observe(room.id, &room.name, self.state.connected() || connected);
            }
        }
    }

    /// Handle a voice-state change: relocate untrusted principals who
    /// entered the protected room.
    pub async fn on_voice_state(&self, member: PrincipalId, to: Option<ChannelId>) {
        let Some(target_room) = self.state.target() else {
            return;
        };
        if to != Some(target_room) {
            return;
        }
        if member == self.client.self_id() || self.registry.contains(member) {
            debug!(target: target::SECURITY, %member, "authorized presence in protected room");
            return;
        }

        warn!(target: target::SECURITY, %member, room = %target_room, "intruder in protected room");

        let refuge = match self.client.channels().await {
            Ok(channels) => channels
                .into_iter()
                .find(|c| c.attrs.kind() == ChannelKind::Voice && c.id != target_room)
                .map(|c| c.id),
            Err(e) => {
                warn!(target: target::SECURITY, error = %e, "channel listing failed");
                None
            }
        };

        if let Some(refuge) = refuge {
            if let Err(e) = retry_transient(|| self.client.move_to_channel(member, refuge)).await {
                warn!(target: target::SECURITY, %member, error = %e, "intruder relocation failed");
            }
        }

        let _ = self
            .client
            .send_direct(member, "You were moved out of a protected voice room.")
            .await;
    }

    async fn recreate_room(&self) {
        let mut overwrites = vec![Overwrite {
            target: OverwriteTarget::Default,
            allow: PermissionSet::empty(),
            deny: PermissionSet(PermissionSet::CONNECT),
        }];
        for trusted in self.registry.snapshot() {
            overwrites.push(Overwrite {
                target: OverwriteTarget::Member(trusted.id),
                allow: PermissionSet(PermissionSet::CONNECT),
                deny: PermissionSet::empty(),
            });
        }
        overwrites.push(Overwrite {
            target: OverwriteTarget::Member(self.client.self_id()),
            allow: PermissionSet(PermissionSet::CONNECT),
            deny: PermissionSet::empty(),
        });

        let spec = ChannelSpec {
            name: self.state.room_name(),
            position: 0,
            category: None,
            attrs: ChannelAttrs::Voice {
                bitrate: 64000,
                user_limit: 0,
            },
            overwrites,
        };

        match retry_transient(|| self.client.create_channel(&spec)).await {
            Ok(room) => {
                info!(target: target::SECURITY, room = %room.id, "protected room recreated");
                self.state.observe(room.id, &room.name, false);
                self.connect(room.id).await;
            }
            Err(PlatformError::PermissionDenied(msg)) => {
                error!(target: target::SECURITY, error = %msg, "CRITICAL: cannot recreate protected room");
                notify_owner(
                    &self.client,
                    &self.registry,
                    "The protected voice room was destroyed and the engine lacks the capability to recreate it.",
                )
                .await;
            }
            Err(e) => {
                warn!(target: target::SECURITY, error = %e, "protected room recreation failed");
            }
        }
    }

    async fn connect(&self, room: ChannelId) {
        match retry_transient(|| self.client.connect_voice(room)).await {
            Ok(()) => {
                let mut state = self.state.inner.lock().unwrap();
                state.connected = true;
            }
            Err(e) => {
                warn!(target: target::SECURITY, room = %room, error = %e, "voice connect failed");
            }
        }
    }
}
