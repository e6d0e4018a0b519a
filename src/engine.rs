//! Service wiring and the operator surface.
//!
//! `Warden` constructs every component once at startup, hands out the
//! event ingress sender, and exposes the console operations: snapshot,
//! restore, trust mutations, sentinel retargeting, and the lockdown and
//! siege toggles.

use crate::dispatcher::{ingress_channel, Dispatcher};
use crate::influx::{InfluxGuard, RaidPhase};
use crate::integrity::IntegrityMonitor;
use crate::journal::{target, Journal, TRIM_INTERVAL};
use crate::platform::types::{ChannelId, PrincipalId};
use crate::platform::{PlatformClient, PlatformEvent};
use crate::sentinel::{Sentinel, SentinelState};
use crate::snapshot::engine::RESTORE_PACING;
use crate::snapshot::{Manifest, ManifestError, RestoreReport, SnapshotEngine, SnapshotError};
use crate::trust::{FingerprintTable, TrustError, TrustRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing::info;

/// Construction parameters for the engine.
pub struct WardenOptions {
    pub owner: PrincipalId,
    pub data_dir: PathBuf,
    pub sentinel_target: Option<ChannelId>,
    /// Delay between mutating calls during restore.
    pub restore_pacing: Duration,
}

impl WardenOptions {
    pub fn new(owner: PrincipalId, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            owner,
            data_dir: data_dir.into(),
            sentinel_target: None,
            restore_pacing: RESTORE_PACING,
        }
    }
}

/// Point-in-time view of the engine for the operator.
#[derive(Debug, Clone)]
pub struct WardenStatus {
    pub raid_phase: RaidPhase,
    pub lockdown: bool,
    pub siege: bool,
    pub trusted_count: usize,
    pub sentinel_target: Option<ChannelId>,
    pub sentinel_connected: bool,
}

/// The assembled protection engine.
pub struct Warden<C: PlatformClient> {
    registry: Arc<TrustRegistry>,
    monitor: Arc<IntegrityMonitor<C>>,
    guard: Arc<InfluxGuard<C>>,
    sentinel: Arc<Sentinel<C>>,
    sentinel_state: Arc<SentinelState>,
    snapshots: Arc<SnapshotEngine<C>>,
    journal: Arc<Journal>,
    dispatcher: Arc<Dispatcher<C>>,
}

impl<C: PlatformClient> Warden<C> {
    pub fn new(client: C, options: WardenOptions) -> Result<Self, TrustError> {
        let data_dir = &options.data_dir;
        let registry = Arc::new(TrustRegistry::load(data_dir.join("trust.json"), options.owner)?);
        let fingerprints = Arc::new(FingerprintTable::load(data_dir.join("fingerprints.json")));

        let monitor = Arc::new(IntegrityMonitor::new(client.clone(), registry.clone()));
        let guard = Arc::new(InfluxGuard::new(
            client.clone(),
            registry.clone(),
            fingerprints,
        ));
        let sentinel_state = Arc::new(SentinelState::new(options.sentinel_target));
        let sentinel = Arc::new(Sentinel::new(
            client.clone(),
            registry.clone(),
            sentinel_state.clone(),
        ));
        let snapshots = Arc::new(SnapshotEngine::new(
            client,
            registry.clone(),
            sentinel_state.clone(),
            data_dir.join("current.json"),
            data_dir.join("emergency.json"),
            options.restore_pacing,
        ));
        let journal = Arc::new(Journal::new());
        let dispatcher = Arc::new(Dispatcher::new(
            monitor.clone(),
            guard.clone(),
            sentinel.clone(),
            journal.clone(),
        ));

        Ok(Self {
            registry,
            monitor,
            guard,
            sentinel,
            sentinel_state,
            snapshots,
            journal,
            dispatcher,
        })
    }

    /// Start the dispatcher, the sentinel patrol, and the maintenance
    /// task. Returns the ingress sender the platform connection feeds.
    pub fn spawn(&self) -> mpsc::Sender<PlatformEvent> {
        let (tx, rx) = ingress_channel();

        tokio::spawn(self.dispatcher.clone().run(rx));
        tokio::spawn(self.sentinel.clone().run());

        let monitor = self.monitor.clone();
        let guard = self.guard.clone();
        let journal = self.journal.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(TRIM_INTERVAL).await;
                monitor.prune();
                guard.prune(std::time::Instant::now());
                journal.trim(SystemTime::now());
            }
        });

        info!(target: target::SYSTEM, "engine started");
        tx
    }

    // --- console surface ---

    pub async fn create_snapshot(&self) -> Result<Manifest, SnapshotError> {
        self.snapshots.create_snapshot().await
    }

    pub async fn restore(&self, manifest: &Manifest) -> Result<RestoreReport, SnapshotError> {
        self.snapshots.restore(manifest).await
    }

    /// Restore from the persisted current manifest.
    pub async fn restore_current(&self) -> Result<RestoreReport, SnapshotError> {
        let manifest = self.load_current()?;
        self.restore(&manifest).await
    }

    pub fn load_current(&self) -> Result<Manifest, ManifestError> {
        self.snapshots.load_current()
    }

    pub fn add_trusted(&self, id: PrincipalId, requester: PrincipalId) -> Result<(), TrustError> {
        self.registry.add(id, requester)
    }

    pub fn remove_trusted(
        &self,
        id: PrincipalId,
        requester: PrincipalId,
    ) -> Result<(), TrustError> {
        self.registry.remove(id, requester)
    }

    pub fn set_sentinel_target(&self, channel: Option<ChannelId>) {
        self.sentinel_state.set_target(channel);
    }

    pub fn toggle_lockdown(&self) -> bool {
        self.monitor.toggle_lockdown()
    }

    pub fn toggle_siege(&self) -> bool {
        self.guard.toggle_siege()
    }

    pub fn status(&self) -> WardenStatus {
        WardenStatus {
            raid_phase: self.guard.phase(),
            lockdown: self.monitor.lockdown_active(),
            siege: self.guard.siege_active(),
            trusted_count: self.registry.snapshot().len(),
            sentinel_target: self.sentinel_state.target(),
            sentinel_connected: self.sentinel_state.connected(),
        }
    }
}
