//! Join-surge and message-flood defense.
//!
//! Joins feed a sliding 10-second window; a burst beyond the threshold
//! flips the guard from `Normal` to `Raid`. Each join is also scored
//! against suspicion heuristics (account age, generic name, missing
//! avatar, fingerprint mismatch); accumulated suspicious joins trigger a
//! ban sweep that consumes the flagged records, or a full raid when the
//! accumulation outpaces sweeping. Raid mode revokes every
//! open invite, bans the flagged accounts, alerts the owner, and arms a
//! 30-minute deactivation deadline that re-triggers extend.
//!
//! Message floods are handled per author: more than ten messages in ten
//! seconds is an immediate ban.

use crate::alert::notify_owner;
use crate::journal::target;
use crate::platform::retry::retry_transient;
use crate::platform::types::{MemberInfo, PrincipalId};
use crate::platform::{PlatformClient, PlatformError};
use crate::trust::{FingerprintCheck, FingerprintTable, TrustRegistry};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Sliding window for join-burst detection.
pub const JOIN_WINDOW: Duration = Duration::from_secs(10);

/// Joins within the window beyond which raid mode activates.
pub const JOIN_THRESHOLD: usize = 7;

/// Accumulated suspicious joins beyond which raid mode activates.
pub const SUSPICIOUS_RAID_THRESHOLD: usize = 5;

/// Accumulated suspicious joins beyond which the flagged accounts are
/// banned without entering raid mode.
pub const SUSPICIOUS_SWEEP_THRESHOLD: usize = 2;

/// Sliding window for per-author message-flood detection.
pub const FLOOD_WINDOW: Duration = Duration::from_secs(10);

/// Messages within the window beyond which the author is banned.
pub const FLOOD_THRESHOLD: usize = 10;

/// How long raid mode stays armed after the last trigger.
pub const RAID_COOLDOWN: Duration = Duration::from_secs(30 * 60);

/// Accounts younger than this are suspicious.
const MIN_ACCOUNT_AGE: Duration = Duration::from_secs(24 * 3600);

/// Throwaway display names raiders tend to use.
const GENERIC_NAMES: &[&str] = &["user", "member", "newuser", "guest", "anon", "test"];

/// Guard state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaidPhase {
    Normal,
    Raid,
}

/// One join flagged by the suspicion heuristics.
#[derive(Debug, Clone)]
pub struct SuspiciousJoin {
    pub member: PrincipalId,
    pub display_name: String,
    pub reasons: Vec<&'static str>,
    pub joined_at: Instant,
}

struct GuardState {
    joins: Vec<Instant>,
    suspicious: Vec<SuspiciousJoin>,
    /// Flagged accounts already banned this episode.
    swept: HashSet<PrincipalId>,
    phase: RaidPhase,
    deactivate_at: Option<tokio::time::Instant>,
    floods: HashMap<PrincipalId, Vec<Instant>>,
}

enum Decision {
    None,
    /// First trigger of the episode. Carries the flagged accounts to ban.
    Activate {
        reason: &'static str,
        flagged: Vec<SuspiciousJoin>,
    },
    /// Re-trigger while raid mode is active; the deadline was extended.
    Extend,
    /// Suspicious accumulation crossed the sweep threshold.
    Sweep(Vec<SuspiciousJoin>),
}

/// Defends the community against coordinated join surges and floods.
pub struct InfluxGuard<C: PlatformClient> {
    client: C,
    registry: Arc<TrustRegistry>,
    fingerprints: Arc<FingerprintTable>,
    state: Mutex<GuardState>,
    siege: AtomicBool,
}

impl<C: PlatformClient> InfluxGuard<C> {
    pub fn new(client: C, registry: Arc<TrustRegistry>, fingerprints: Arc<FingerprintTable>) -> Self {
        Self {
            client,
            registry,
            fingerprints,
            state: Mutex::new(GuardState {
                joins: Vec::new(),
                suspicious: Vec::new(),
                swept: HashSet::new(),
                phase: RaidPhase::Normal,
                deactivate_at: None,
                floods: HashMap::new(),
            }),
            siege: AtomicBool::new(false),
        }
    }

    pub fn phase(&self) -> RaidPhase {
        self.state.lock().unwrap().phase
    }

    pub fn suspicious_count(&self) -> usize {
        self.state.lock().unwrap().suspicious.len()
    }

    /// Toggle siege mode. Under siege every join is banned outright.
    pub fn toggle_siege(&self) -> bool {
        let was = self.siege.fetch_xor(true, Ordering::SeqCst);
        let now = !was;
        warn!(target: target::RAID, enabled = now, "siege toggled");
        now
    }

    pub fn siege_active(&self) -> bool {
        self.siege.load(Ordering::SeqCst)
    }

    /// Process a member join.
    pub async fn on_join(self: &Arc<Self>, member: &MemberInfo, now: Instant) {
        if self.registry.contains(member.id) {
            debug!(target: target::RAID, member = %member.id, "trusted join");
            return;
        }

        if self.siege_active() {
            warn!(target: target::RAID, member = %member.id, "join during siege, banning");
            self.ban(member.id, "community sealed (siege mode)").await;
            return;
        }

        let reasons = self.suspicion_reasons(member);
        if !reasons.is_empty() {
            warn!(
                target: target::RAID,
                member = %member.id,
                name = %member.display_name,
                ?reasons,
                "suspicious join"
            );
        }

        let decision = {
            let mut state = self.state.lock().unwrap();
            state.joins.retain(|t| now.duration_since(*t) < JOIN_WINDOW);
            state.joins.push(now);

            if !reasons.is_empty() {
                state.suspicious.push(SuspiciousJoin {
                    member: member.id,
                    display_name: member.display_name.clone(),
                    reasons,
                    joined_at: now,
                });
            }

            let join_burst = state.joins.len() > JOIN_THRESHOLD;
            let accumulation = state.suspicious.len() > SUSPICIOUS_RAID_THRESHOLD;

            if join_burst || accumulation {
                let deadline = tokio::time::Instant::now() + RAID_COOLDOWN;
                match state.phase {
                    RaidPhase::Normal => {
                        state.phase = RaidPhase::Raid;
                        state.deactivate_at = Some(deadline);
                        let flagged = Self::take_unswept(&mut state);
                        Decision::Activate {
                            reason: if join_burst {
                                "join burst"
                            } else {
                                "suspicious account accumulation"
                            },
                            flagged,
                        }
                    }
                    RaidPhase::Raid => {
                        state.deactivate_at = Some(deadline);
                        Decision::Extend
                    }
                }
            } else if state.suspicious.len() > SUSPICIOUS_SWEEP_THRESHOLD {
                Decision::Sweep(Self::take_unswept(&mut state))
            } else {
                Decision::None
            }
        };

        match decision {
            Decision::None => {}
            Decision::Extend => {
                info!(target: target::RAID, "raid re-triggered, deactivation deadline extended");
            }
            Decision::Sweep(targets) => {
                warn!(
                    target: target::RAID,
                    count = targets.len(),
                    "suspicious accumulation crossed sweep threshold, banning flagged accounts"
                );
                for join in &targets {
                    self.ban(join.member, "flagged as suspicious during influx").await;
                }
                self.alert(&format!(
                    "Banned {} suspicious account(s) that joined in quick succession.",
                    targets.len()
                ))
                .await;
            }
            Decision::Activate { reason, flagged } => {
                self.activate_raid(reason, flagged).await;
            }
        }
    }

    /// Process a sent message for flood control.
    pub async fn on_message(&self, author: PrincipalId, now: Instant) {
        if self.registry.contains(author) || author == self.client.self_id() {
            return;
        }

        let flooding = {
            let mut state = self.state.lock().unwrap();
            let window = state.floods.entry(author).or_default();
            window.retain(|t| now.duration_since(*t) < FLOOD_WINDOW);
            window.push(now);
            if window.len() > FLOOD_THRESHOLD {
                state.floods.remove(&author);
                true
            } else {
                false
            }
        };

        if flooding {
            error!(target: target::RAID, %author, "message flood, banning author");
            self.ban(author, "message flood").await;
            self.alert(&format!("Banned {author} for flooding messages.")).await;
        }
    }

    /// Drop expired flood windows.
    pub fn prune(&self, now: Instant) {
        let mut state = self.state.lock().unwrap();
        state.floods.retain(|_, window| {
            window.retain(|t| now.duration_since(*t) < FLOOD_WINDOW);
            !window.is_empty()
        });
    }

    // --- internals ---

    fn suspicion_reasons(&self, member: &MemberInfo) -> Vec<&'static str> {
        let mut reasons = Vec::new();

        let age = member.created_at.elapsed().unwrap_or(Duration::ZERO);
        if age < MIN_ACCOUNT_AGE {
            reasons.push("account younger than one day");
        }

        let name = member.display_name.to_lowercase();
        let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
        if GENERIC_NAMES.contains(&stem) {
            reasons.push("generic display name");
        }

        if !member.has_avatar {
            reasons.push("no avatar");
        }

        if self.fingerprints.check(member) == FingerprintCheck::Changed {
            reasons.push("identity fingerprint changed");
        }

        reasons
    }

    /// Drain the unswept flagged records. Sweeping consumes them, so the
    /// accumulation count restarts from whatever remains unconsumed.
    fn take_unswept(state: &mut GuardState) -> Vec<SuspiciousJoin> {
        let GuardState { suspicious, swept, .. } = state;
        let mut flagged = Vec::new();
        suspicious.retain(|join| {
            if swept.insert(join.member) {
                flagged.push(join.clone());
                false
            } else {
                true
            }
        });
        flagged
    }

    async fn activate_raid(self: &Arc<Self>, reason: &'static str, flagged: Vec<SuspiciousJoin>) {
        error!(
            target: target::RAID,
            reason,
            flagged = flagged.len(),
            "raid detected, entering raid mode"
        );

        self.revoke_invites().await;
        for join in &flagged {
            self.ban(join.member, "raid participant").await;
        }
        self.alert(&format!(
            "Raid detected ({reason}). Revoked all invites, banned {} flagged account(s). \
             Raid mode deactivates in 30 minutes unless re-triggered.",
            flagged.len()
        ))
        .await;

        self.spawn_deactivation();
    }

    /// Single watcher per episode. Wakes at the armed deadline and
    /// re-checks it, so re-triggers only need to move the deadline.
    fn spawn_deactivation(self: &Arc<Self>) {
        let guard = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let deadline = guard.state.lock().unwrap().deactivate_at;
                let Some(deadline) = deadline else { break };
                tokio::time::sleep_until(deadline).await;

                let mut state = guard.state.lock().unwrap();
                match state.deactivate_at {
                    Some(d) if tokio::time::Instant::now() >= d => {
                        state.phase = RaidPhase::Normal;
                        state.deactivate_at = None;
                        state.suspicious.clear();
                        state.swept.clear();
                        info!(target: target::RAID, "raid mode deactivated");
                        break;
                    }
                    Some(_) => continue,
                    None => break,
                }
            }
        });
    }

    async fn revoke_invites(&self) {
        let invites = match self.client.invites().await {
            Ok(invites) => invites,
            Err(e) => {
                warn!(target: target::RAID, error = %e, "invite listing failed");
                return;
            }
        };
        for invite in &invites {
            if let Err(e) = retry_transient(|| self.client.delete_invite(&invite.code)).await {
                if !e.is_already_gone() {
                    warn!(target: target::RAID, code = %invite.code, error = %e, "invite revocation failed");
                }
            }
        }
        info!(target: target::RAID, count = invites.len(), "open invites revoked");
    }

    async fn ban(&self, member: PrincipalId, reason: &str) {
        match retry_transient(|| self.client.ban(member, reason)).await {
            Ok(()) => {}
            Err(e) if e.is_already_gone() => {}
            Err(PlatformError::PermissionDenied(msg)) => {
                error!(target: target::RAID, %member, error = %msg, "CRITICAL: missing capability to ban");
                self.alert(&format!(
                    "Could not ban {member}: the engine lacks the required capability."
                ))
                .await;
            }
            Err(e) => {
                warn!(target: target::RAID, %member, error = %e, "ban failed");
            }
        }
    }

    async fn alert(&self, text: &str) {
        notify_owner(&self.client, &self.registry, text).await;
    }
}
