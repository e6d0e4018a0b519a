//! Per-actor sliding windows of destructive-action timestamps.
//!
//! Windows are created lazily on the first offending action, pruned to a
//! fixed 10-second duration, and garbage-collected once empty. An actor
//! whose window exceeds the mass-delete threshold is escalated to a ban
//! instead of per-object remediation.

use crate::platform::types::PrincipalId;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Window length for burst detection.
pub const WINDOW: Duration = Duration::from_secs(10);

/// Deletions within the window beyond which the actor is banned instead
/// of each object being recreated.
pub const MASS_DELETE_THRESHOLD: usize = 2;

/// Tracks recent destructive actions per actor.
#[derive(Default)]
pub struct CooldownTracker {
    windows: Mutex<HashMap<PrincipalId, Vec<Instant>>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a destructive action and return the number of actions the
    /// actor has inside the trailing window, including this one.
    pub fn record(&self, actor: PrincipalId, now: Instant) -> usize {
        let mut windows = self.windows.lock().unwrap();
        let window = windows.entry(actor).or_default();
        window.retain(|t| now.duration_since(*t) < WINDOW);
        window.push(now);
        window.len()
    }

    /// True once the actor crossed the mass-delete threshold and the
    /// escalation path should take priority over per-object remediation.
    pub fn is_escalated(&self, actor: PrincipalId, now: Instant) -> bool {
        let mut windows = self.windows.lock().unwrap();
        match windows.get_mut(&actor) {
            Some(window) => {
                window.retain(|t| now.duration_since(*t) < WINDOW);
                window.len() > MASS_DELETE_THRESHOLD
            }
            None => false,
        }
    }

    /// Drop expired timestamps and remove empty windows.
    pub fn prune(&self, now: Instant) {
        let mut windows = self.windows.lock().unwrap();
        windows.retain(|_, window| {
            window.retain(|t| now.duration_since(*t) < WINDOW);
            !window.is_empty()
        });
    }

    #[cfg(test)]
    fn tracked_actors(&self) -> usize {
        self.windows.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ACTOR: PrincipalId = PrincipalId(7);

    #[test]
    fn test_counts_within_window() {
        let tracker = CooldownTracker::new();
        let start = Instant::now();

        assert_eq!(tracker.record(ACTOR, start), 1);
        assert_eq!(tracker.record(ACTOR, start + Duration::from_secs(1)), 2);
        assert_eq!(tracker.record(ACTOR, start + Duration::from_secs(2)), 3);
    }

    #[test]
    fn test_expired_entries_pruned_on_record() {
        let tracker = CooldownTracker::new();
        let start = Instant::now();

        tracker.record(ACTOR, start);
        tracker.record(ACTOR, start + Duration::from_secs(1));

        // 11 seconds later both earlier entries are outside the window;
        // the one at start+1s is exactly 10s old and already excluded.
        assert_eq!(tracker.record(ACTOR, start + Duration::from_secs(11)), 1);
        assert_eq!(tracker.record(ACTOR, start + Duration::from_secs(12)), 2);
    }

    #[test]
    fn test_two_deletions_do_not_escalate_three_do() {
        let tracker = CooldownTracker::new();
        let start = Instant::now();

        tracker.record(ACTOR, start);
        tracker.record(ACTOR, start + Duration::from_secs(1));
        assert!(!tracker.is_escalated(ACTOR, start + Duration::from_secs(1)));

        tracker.record(ACTOR, start + Duration::from_secs(2));
        assert!(tracker.is_escalated(ACTOR, start + Duration::from_secs(2)));
    }

    #[test]
    fn test_escalation_persists_within_window() {
        let tracker = CooldownTracker::new();
        let start = Instant::now();
        for i in 0..3 {
            tracker.record(ACTOR, start + Duration::from_secs(i));
        }

        // Further events from the same actor inside the window stay on
        // the escalation path.
        assert!(tracker.is_escalated(ACTOR, start + Duration::from_secs(5)));
        assert!(!tracker.is_escalated(ACTOR, start + Duration::from_secs(20)));
    }

    #[test]
    fn test_prune_collects_empty_windows() {
        let tracker = CooldownTracker::new();
        let start = Instant::now();

        tracker.record(ACTOR, start);
        tracker.record(PrincipalId(8), start + Duration::from_secs(9));
        assert_eq!(tracker.tracked_actors(), 2);

        tracker.prune(start + Duration::from_secs(15));
        assert_eq!(tracker.tracked_actors(), 1);

        tracker.prune(start + Duration::from_secs(30));
        assert_eq!(tracker.tracked_actors(), 0);
    }

    #[test]
    fn test_actors_isolated() {
        let tracker = CooldownTracker::new();
        let start = Instant::now();
        for i in 0..3 {
            tracker.record(ACTOR, start + Duration::from_secs(i));
        }

        assert!(!tracker.is_escalated(PrincipalId(8), start + Duration::from_secs(3)));
    }

    proptest! {
        #[test]
        fn prop_count_never_exceeds_events_in_window(offsets in prop::collection::vec(0u64..30, 1..40)) {
            let tracker = CooldownTracker::new();
            let start = Instant::now();
            let mut sorted = offsets.clone();
            sorted.sort_unstable();

            let mut last_count = 0;
            let mut last_now = start;
            for offset in &sorted {
                last_now = start + Duration::from_secs(*offset);
                last_count = tracker.record(ACTOR, last_now);
            }

            let in_window = sorted
                .iter()
                .filter(|o| last_now.duration_since(start + Duration::from_secs(**o)) < WINDOW)
                .count();
            prop_assert_eq!(last_count, in_window);
        }

        #[test]
        fn prop_prune_is_idempotent(offsets in prop::collection::vec(0u64..30, 0..20), at in 0u64..60) {
            let tracker = CooldownTracker::new();
            let start = Instant::now();
            for offset in &offsets {
                tracker.record(ACTOR, start + Duration::from_secs(*offset));
            }

            let now = start + Duration::from_secs(at);
            tracker.prune(now);
            let after_first = tracker.tracked_actors();
            tracker.prune(now);
            prop_assert_eq!(tracker.tracked_actors(), after_first);
        }
    }
}
