//! Category-separated structured logging and message activity caches.
//!
//! Log lines are emitted through `tracing` with one target per category,
//! matching the category split of the persisted log files (integrity,
//! raid, trust, backup, actions, security, permissions, messages,
//! system). Operators select categories with the usual env-filter
//! directives, e.g. `warden::raid=debug`.
//!
//! The journal also keeps bounded in-memory caches of recent and deleted
//! message activity for the operator surface; a supervisory task trims
//! entries past retention.

use crate::platform::types::{ChannelId, PrincipalId};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

/// Tracing targets, one per log category.
pub mod target {
    pub const INTEGRITY: &str = "warden::integrity";
    pub const RAID: &str = "warden::raid";
    pub const TRUST: &str = "warden::trust";
    pub const BACKUP: &str = "warden::backup";
    pub const ACTIONS: &str = "warden::actions";
    pub const SECURITY: &str = "warden::security";
    pub const PERMISSIONS: &str = "warden::permissions";
    pub const MESSAGES: &str = "warden::messages";
    pub const SYSTEM: &str = "warden::system";
}

/// Cap on cached recent messages.
const MESSAGE_CACHE_CAP: usize = 5000;

/// Cap on cached deleted messages.
const DELETED_CACHE_CAP: usize = 1000;

/// Retention for cached entries; the trim task prunes older ones.
const RETENTION: Duration = Duration::from_secs(24 * 3600);

/// Interval between trim passes.
pub const TRIM_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub author: PrincipalId,
    pub channel: ChannelId,
    pub at: SystemTime,
}

/// Bounded message-activity caches.
#[derive(Default)]
pub struct Journal {
    recent: Mutex<VecDeque<MessageRecord>>,
    deleted: Mutex<VecDeque<MessageRecord>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_message(&self, author: PrincipalId, channel: ChannelId, at: SystemTime) {
        tracing::debug!(target: target::MESSAGES, %author, %channel, "message sent");
        let mut recent = self.recent.lock().unwrap();
        if recent.len() == MESSAGE_CACHE_CAP {
            recent.pop_front();
        }
        recent.push_back(MessageRecord { author, channel, at });
    }

    pub fn record_deletion(&self, author: PrincipalId, channel: ChannelId) {
        tracing::info!(target: target::MESSAGES, %author, %channel, "message deleted");
        let mut deleted = self.deleted.lock().unwrap();
        if deleted.len() == DELETED_CACHE_CAP {
            deleted.pop_front();
        }
        deleted.push_back(MessageRecord {
            author,
            channel,
            at: SystemTime::now(),
        });
    }

    /// Drop cached entries older than the retention window.
    pub fn trim(&self, now: SystemTime) {
        let cutoff = |record: &MessageRecord| {
            now.duration_since(record.at)
                .map(|age| age < RETENTION)
                .unwrap_or(true)
        };
        self.recent.lock().unwrap().retain(cutoff);
        self.deleted.lock().unwrap().retain(cutoff);
    }

    pub fn recent_count(&self) -> usize {
        self.recent.lock().unwrap().len()
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_cache_bounded() {
        let journal = Journal::new();
        for i in 0..(MESSAGE_CACHE_CAP + 10) {
            journal.record_message(PrincipalId(i as u64), ChannelId(1), SystemTime::now());
        }
        assert_eq!(journal.recent_count(), MESSAGE_CACHE_CAP);
    }

    #[test]
    fn test_trim_drops_expired_entries() {
        let journal = Journal::new();
        let old = SystemTime::now() - RETENTION - Duration::from_secs(60);
        journal.record_message(PrincipalId(1), ChannelId(1), old);
        journal.record_message(PrincipalId(2), ChannelId(1), SystemTime::now());

        journal.trim(SystemTime::now());
        assert_eq!(journal.recent_count(), 1);
    }

    #[test]
    fn test_deleted_cache_bounded() {
        let journal = Journal::new();
        for i in 0..(DELETED_CACHE_CAP + 5) {
            journal.record_deletion(PrincipalId(i as u64), ChannelId(2));
        }
        assert_eq!(journal.deleted_count(), DELETED_CACHE_CAP);
    }
}
