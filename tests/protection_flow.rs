// Integration tests for the full protection flow
//
// These tests drive the assembled components through the dispatcher the
// way the live event stream would:
// - A nuke attempt is reversed object by object until the mass-delete
//   threshold bans the actor outright
// - A join wave flips the guard into raid mode and seals the community
// - A vandalized community is rebuilt from its manifest
// - Trusted principals pass through every layer untouched

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tempfile::{tempdir, TempDir};
use warden::dispatcher::Dispatcher;
use warden::influx::{InfluxGuard, RaidPhase};
use warden::integrity::IntegrityMonitor;
use warden::journal::Journal;
use warden::platform::mock::MockPlatform;
use warden::platform::types::*;
use warden::sentinel::{Sentinel, SentinelState};
use warden::snapshot::SnapshotEngine;
use warden::trust::{FingerprintTable, TrustRegistry};

const OWNER: PrincipalId = PrincipalId(1);
const ENGINE: PrincipalId = PrincipalId(2);
const TRUSTED: PrincipalId = PrincipalId(3);
const HOSTILE: PrincipalId = PrincipalId(66);

struct Rig {
    platform: MockPlatform,
    registry: Arc<TrustRegistry>,
    dispatcher: Dispatcher<MockPlatform>,
    guard: Arc<InfluxGuard<MockPlatform>>,
    sentinel_state: Arc<SentinelState>,
    snapshots: SnapshotEngine<MockPlatform>,
    _dir: TempDir,
}

fn rig() -> Rig {
    let dir = tempdir().unwrap();
    let platform = MockPlatform::new(OWNER, ENGINE);
    let registry =
        Arc::new(TrustRegistry::load(dir.path().join("trust.json"), OWNER).unwrap());
    registry.add(TRUSTED, OWNER).unwrap();
    let fingerprints = Arc::new(FingerprintTable::load(dir.path().join("fp.json")));

    let monitor = Arc::new(IntegrityMonitor::new(platform.clone(), registry.clone()));
    let guard = Arc::new(InfluxGuard::new(
        platform.clone(),
        registry.clone(),
        fingerprints,
    ));
    let sentinel_state = Arc::new(SentinelState::new(None));
    let sentinel = Arc::new(Sentinel::new(
        platform.clone(),
        registry.clone(),
        sentinel_state.clone(),
    ));
    let snapshots = SnapshotEngine::new(
        platform.clone(),
        registry.clone(),
        sentinel_state.clone(),
        dir.path().join("current.json"),
        dir.path().join("emergency.json"),
        Duration::ZERO,
    );
    let dispatcher = Dispatcher::new(monitor, guard.clone(), sentinel, Arc::new(Journal::new()));

    Rig {
        platform,
        registry,
        dispatcher,
        guard,
        sentinel_state,
        snapshots,
        _dir: dir,
    }
}

fn text_channel(name: &str) -> ChannelSpec {
    ChannelSpec {
        name: name.into(),
        position: 0,
        category: None,
        attrs: ChannelAttrs::Text {
            topic: None,
            slowmode_secs: 0,
        },
        overwrites: vec![],
    }
}

fn member(id: u64, name: &str, age: Duration, has_avatar: bool) -> MemberInfo {
    MemberInfo {
        id: PrincipalId(id),
        display_name: name.to_string(),
        created_at: SystemTime::now() - age,
        has_avatar,
        roles: vec![],
    }
}

#[tokio::test]
async fn test_nuke_attempt_reversed_and_actor_banned() {
    let rig = rig();
    let channels: Vec<_> = (0..3)
        .map(|i| rig.platform.seed_channel(&text_channel(&format!("room-{i}"))))
        .collect();

    // Burst of three deletions inside the window.
    for channel in &channels {
        let event = rig.platform.simulate_channel_delete(HOSTILE, channel.id);
        rig.dispatcher.dispatch(&event).await;
    }
    // Followed by an attempted privilege grab.
    let event = rig.platform.simulate_role_create(
        HOSTILE,
        &RoleSpec {
            name: "new-owner".into(),
            color: 0,
            hoist: false,
            permissions: PermissionSet(PermissionSet::ADMINISTRATOR),
            mentionable: false,
        },
    );
    rig.dispatcher.dispatch(&event).await;

    // The first two deletions are reverted; the third crossed the
    // mass-delete threshold and earned the ban instead of a recreation.
    assert!(rig.platform.channel_named("room-0").is_some());
    assert!(rig.platform.channel_named("room-1").is_some());
    assert!(rig.platform.channel_named("room-2").is_none());
    assert!(rig.platform.role_named("new-owner").is_none());
    assert!(rig.platform.is_banned(HOSTILE));
    assert!(!rig.platform.direct_messages_to(OWNER).is_empty());
}

#[tokio::test]
async fn test_join_wave_triggers_raid_and_revokes_invites() {
    let rig = rig();
    rig.platform.seed_invite("front-door", TRUSTED);

    for i in 0..8u64 {
        let joiner = member(100 + i, &format!("regular{i}"), Duration::from_secs(90 * 24 * 3600), true);
        let event = rig.platform.simulate_join(joiner);
        rig.dispatcher.dispatch(&event).await;
    }

    assert_eq!(rig.guard.phase(), RaidPhase::Raid);
    assert_eq!(rig.platform.invite_count(), 0);
    assert!(!rig.platform.direct_messages_to(OWNER).is_empty());
}

#[tokio::test]
async fn test_throwaway_accounts_swept_before_raid_threshold() {
    let rig = rig();

    for i in 0..3u64 {
        let joiner = member(200 + i, &format!("user{i}"), Duration::from_secs(600), false);
        let event = rig.platform.simulate_join(joiner);
        rig.dispatcher.dispatch(&event).await;
    }

    assert_eq!(rig.guard.phase(), RaidPhase::Normal);
    for i in 0..3u64 {
        assert!(rig.platform.is_banned(PrincipalId(200 + i)));
    }
}

#[tokio::test]
async fn test_disaster_recovery_rebuilds_vandalized_community() {
    let rig = rig();
    let role = rig.platform.seed_role(
        &RoleSpec {
            name: "regulars".into(),
            color: 0x00ff00,
            hoist: false,
            permissions: PermissionSet(PermissionSet::SEND_MESSAGES),
            mentionable: true,
        },
        1,
    );
    let category = rig.platform.seed_category(&CategorySpec {
        name: "main".into(),
        position: 0,
        overwrites: vec![],
    });
    rig.platform.seed_channel(&ChannelSpec {
        name: "general".into(),
        position: 0,
        category: Some(category.id),
        attrs: ChannelAttrs::Text {
            topic: Some("welcome".into()),
            slowmode_secs: 5,
        },
        overwrites: vec![Overwrite {
            target: OverwriteTarget::Role(role.id),
            allow: PermissionSet(PermissionSet::VIEW_CHANNEL),
            deny: PermissionSet::empty(),
        }],
    });
    let war_room = rig.platform.seed_channel(&ChannelSpec {
        name: "war-room".into(),
        position: 1,
        category: None,
        attrs: ChannelAttrs::Voice {
            bitrate: 64000,
            user_limit: 0,
        },
        overwrites: vec![],
    });
    rig.sentinel_state.set_target(Some(war_room.id));

    let manifest = rig.snapshots.capture().await.unwrap();

    // Total destruction.
    rig.platform.simulate_channel_delete(HOSTILE, war_room.id);
    let general = rig.platform.channel_named("general").unwrap();
    rig.platform.simulate_channel_delete(HOSTILE, general.id);
    rig.platform.simulate_role_delete(HOSTILE, role.id);

    let report = rig.snapshots.restore(&manifest).await.unwrap();
    assert!(report.is_clean(), "report: {report:?}");

    let general = rig.platform.channel_named("general").unwrap();
    assert_eq!(
        general.attrs,
        ChannelAttrs::Text {
            topic: Some("welcome".into()),
            slowmode_secs: 5,
        }
    );
    let restored_role = rig.platform.role_named("regulars").unwrap();
    assert!(general
        .overwrites
        .iter()
        .any(|o| o.target == OverwriteTarget::Role(restored_role.id)));

    // The sentinel now guards the recreated room.
    let new_war_room = rig.platform.channel_named("war-room").unwrap();
    assert_eq!(rig.sentinel_state.target(), Some(new_war_room.id));
    assert!(rig.registry.contains(TRUSTED));
}

#[tokio::test]
async fn test_trusted_principal_passes_every_layer() {
    let rig = rig();
    let channel = rig.platform.seed_channel(&text_channel("general"));

    let event = rig.platform.simulate_channel_delete(TRUSTED, channel.id);
    rig.dispatcher.dispatch(&event).await;
    assert!(rig.platform.channel_named("general").is_none());

    let event = rig.platform.simulate_join(member(
        TRUSTED.0,
        "trusted",
        Duration::from_secs(60),
        false,
    ));
    rig.dispatcher.dispatch(&event).await;

    for _ in 0..20 {
        let event = rig.platform.simulate_message(TRUSTED, ChannelId(10));
        rig.dispatcher.dispatch(&event).await;
    }

    assert!(!rig.platform.is_banned(TRUSTED));
    assert!(!rig.platform.was_kicked(TRUSTED));
}
