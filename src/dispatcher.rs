//! Event ingress and fan-out.
//!
//! The platform connection pushes raw events into a bounded `mpsc`
//! queue; one dispatcher task drains it and routes each event to the
//! component responsible for it. The dispatcher owns no component state,
//! only handles.

use crate::influx::InfluxGuard;
use crate::integrity::IntegrityMonitor;
use crate::journal::{target, Journal};
use crate::platform::{PlatformClient, PlatformEvent};
use crate::sentinel::Sentinel;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::debug;

/// Ingress queue depth. The platform connection applies backpressure
/// once the queue fills.
pub const INGRESS_CAPACITY: usize = 1024;

pub fn ingress_channel() -> (mpsc::Sender<PlatformEvent>, mpsc::Receiver<PlatformEvent>) {
    mpsc::channel(INGRESS_CAPACITY)
}

/// Routes raw platform events to the engine's components.
pub struct Dispatcher<C: PlatformClient> {
    monitor: Arc<IntegrityMonitor<C>>,
    guard: Arc<InfluxGuard<C>>,
    sentinel: Arc<Sentinel<C>>,
    journal: Arc<Journal>,
}

impl<C: PlatformClient> Dispatcher<C> {
    pub fn new(
        monitor: Arc<IntegrityMonitor<C>>,
        guard: Arc<InfluxGuard<C>>,
        sentinel: Arc<Sentinel<C>>,
        journal: Arc<Journal>,
    ) -> Self {
        Self {
            monitor,
            guard,
            sentinel,
            journal,
        }
    }

    /// Drain the ingress queue until the sender side closes.
    pub async fn run(self: Arc<Self>, mut ingress: mpsc::Receiver<PlatformEvent>) {
        while let Some(event) = ingress.recv().await {
            self.dispatch(&event).await;
        }
        debug!(target: target::SYSTEM, "ingress closed, dispatcher stopping");
    }

    /// Route one event.
    pub async fn dispatch(&self, event: &PlatformEvent) {
        match event {
            PlatformEvent::MemberJoined(member) => {
                self.guard.on_join(member, Instant::now()).await;
            }
            PlatformEvent::MessageSent {
                author,
                channel,
                sent_at,
            } => {
                self.journal.record_message(*author, *channel, *sent_at);
                self.guard.on_message(*author, Instant::now()).await;
            }
            PlatformEvent::MessageDeleted { author, channel } => {
                self.journal.record_deletion(*author, *channel);
            }
            PlatformEvent::VoiceStateChanged { member, to, .. } => {
                self.sentinel.on_voice_state(*member, *to).await;
            }
            other => {
                self.monitor.process(other).await;
            }
        }
    }
}
