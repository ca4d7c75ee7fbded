//! Integration tests for timeout supervision: warnings, grace periods,
//! forfeits, double forfeits, operator overrides, and the heartbeat
//! wiring that ties supervision to round progression.

use std::sync::Arc;

use chess_championship::clock::ManualClock;
use chess_championship::config::EngineConfig;
use chess_championship::heartbeat::Heartbeat;
use chess_championship::notify::{EngineEvent, RecordingNotifier};
use chess_championship::presence::StaticPresence;
use chess_championship::scheduling::MatchSchedulingCoordinator;
use chess_championship::store::{MatchRepository, MemoryStore, TournamentRepository};
use chess_championship::timeout::{MatchTimeoutCoordinator, TimeoutOutcome};
use chess_championship::tournament::{
    FormatConfig, MatchResult, ParticipantId, RoundProgressionCoordinator,
};
use chrono::{DateTime, Duration, TimeZone, Utc};

struct Harness {
    progression: RoundProgressionCoordinator,
    timeout: MatchTimeoutCoordinator,
    store: Arc<MemoryStore>,
    notifier: Arc<RecordingNotifier>,
    presence: Arc<StaticPresence>,
    clock: Arc<ManualClock>,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let presence = Arc::new(StaticPresence::new());
    let clock = Arc::new(ManualClock::new(t0()));
    let config = EngineConfig::default();
    let progression = RoundProgressionCoordinator::new(
        store.clone(),
        notifier.clone(),
        presence.clone(),
        clock.clone(),
        config.clone(),
    );
    let timeout = MatchTimeoutCoordinator::new(
        store.clone(),
        notifier.clone(),
        presence.clone(),
        clock.clone(),
        config,
    );
    Harness {
        progression,
        timeout,
        store,
        notifier,
        presence,
        clock,
    }
}

/// A started two-player tournament whose single match is scheduled at
/// `start`.
async fn scheduled_match(h: &Harness, start: DateTime<Utc>) -> (i64, i64, ParticipantId, ParticipantId) {
    let id = h
        .progression
        .create_tournament("Duel", &FormatConfig::swiss_only(1))
        .await
        .unwrap();
    h.progression.open_registration(id).await.unwrap();
    let a = h.progression.register_participant(id, 1).await.unwrap();
    let b = h.progression.register_participant(id, 2).await.unwrap();
    h.progression.start_tournament(id).await.unwrap();

    let round = h.store.rounds(id).await.unwrap().remove(0);
    let m = h.store.round_matches(round.id).await.unwrap().remove(0);
    h.store.set_schedule(m.id, start).await.unwrap();
    (id, m.id, a, b)
}

#[tokio::test]
async fn forfeit_lands_exactly_at_grace_expiry_not_before() {
    let h = harness();
    let start = t0() + Duration::hours(2);
    let (_, match_id, a, _) = scheduled_match(&h, start).await;
    h.presence.set_online(a); // b never joins

    // One minute before grace expiry: nothing happens.
    h.clock.set(start + Duration::minutes(9));
    let summary = h.timeout.tick().await.unwrap();
    assert_eq!(summary.forfeits, 0);
    let m = h.store.match_by_id(match_id).await.unwrap().unwrap();
    assert!(m.result.is_none());

    // At expiry the present participant wins by forfeit.
    h.clock.set(start + Duration::minutes(10));
    let summary = h.timeout.tick().await.unwrap();
    assert_eq!(summary.forfeits, 1);
    let m = h.store.match_by_id(match_id).await.unwrap().unwrap();
    assert_eq!(m.winner(), Some(a));
}

#[tokio::test]
async fn forfeit_happens_at_most_once_across_repeated_ticks() {
    let h = harness();
    let start = t0() + Duration::hours(2);
    let (_, match_id, a, b) = scheduled_match(&h, start).await;
    h.presence.set_online(a);

    h.clock.set(start + Duration::minutes(30));
    for _ in 0..5 {
        h.timeout.tick().await.unwrap();
    }

    let m = h.store.match_by_id(match_id).await.unwrap().unwrap();
    assert_eq!(m.result, Some(MatchResult::Forfeit { absentee: b }));
    // Exactly one forfeit notification per participant.
    let forfeits = h
        .notifier
        .events()
        .iter()
        .filter(|(_, e)| matches!(e, EngineEvent::MatchForfeited { .. }))
        .count();
    assert_eq!(forfeits, 2);
}

#[tokio::test]
async fn both_absent_is_a_double_forfeit() {
    let h = harness();
    let start = t0() + Duration::hours(2);
    let (_, match_id, _, _) = scheduled_match(&h, start).await;

    h.clock.set(start + Duration::minutes(10));
    h.timeout.tick().await.unwrap();

    let m = h.store.match_by_id(match_id).await.unwrap().unwrap();
    assert_eq!(m.result, Some(MatchResult::DoubleForfeit));
}

#[tokio::test]
async fn both_present_leaves_the_match_to_live_play() {
    let h = harness();
    let start = t0() + Duration::hours(2);
    let (_, match_id, a, b) = scheduled_match(&h, start).await;
    h.presence.set_online(a);
    h.presence.set_online(b);

    h.clock.set(start + Duration::hours(1));
    let summary = h.timeout.tick().await.unwrap();
    assert_eq!(summary.forfeits, 0);
    let m = h.store.match_by_id(match_id).await.unwrap().unwrap();
    assert!(m.result.is_none());
}

#[tokio::test]
async fn starting_soon_warning_fires_once_inside_lead_window() {
    let h = harness();
    let start = t0() + Duration::hours(2);
    scheduled_match(&h, start).await;

    // Before the lead window: no warning.
    h.clock.set(start - Duration::minutes(6));
    let summary = h.timeout.tick().await.unwrap();
    assert_eq!(summary.warnings_sent, 0);

    // Inside it: one warning, both participants notified.
    h.clock.set(start - Duration::minutes(5));
    let summary = h.timeout.tick().await.unwrap();
    assert_eq!(summary.warnings_sent, 1);
    let warnings = h
        .notifier
        .events()
        .iter()
        .filter(|(_, e)| matches!(e, EngineEvent::MatchStartingSoon { .. }))
        .count();
    assert_eq!(warnings, 2);

    // Re-ticking does not repeat it.
    let summary = h.timeout.tick().await.unwrap();
    assert_eq!(summary.warnings_sent, 0);
}

#[tokio::test]
async fn unscheduled_match_forfeits_when_play_window_closes() {
    let h = harness();
    let id = h
        .progression
        .create_tournament("Duel", &FormatConfig::swiss_only(1))
        .await
        .unwrap();
    h.progression.open_registration(id).await.unwrap();
    h.progression.register_participant(id, 1).await.unwrap();
    h.progression.register_participant(id, 2).await.unwrap();
    h.progression.start_tournament(id).await.unwrap();

    let round = h.store.rounds(id).await.unwrap().remove(0);
    let m = h.store.round_matches(round.id).await.unwrap().remove(0);
    assert!(m.scheduled_start.is_none());
    let deadline = m.deadline.unwrap();

    h.clock.set(deadline - Duration::minutes(1));
    h.timeout.tick().await.unwrap();
    assert!(
        h.store
            .match_by_id(m.id)
            .await
            .unwrap()
            .unwrap()
            .result
            .is_none()
    );

    h.clock.set(deadline + Duration::minutes(1));
    h.timeout.tick().await.unwrap();
    let m = h.store.match_by_id(m.id).await.unwrap().unwrap();
    assert_eq!(m.result, Some(MatchResult::DoubleForfeit));
}

#[tokio::test]
async fn force_timeout_resolves_ahead_of_grace() {
    let h = harness();
    let start = t0() + Duration::hours(2);
    let (_, match_id, a, b) = scheduled_match(&h, start).await;
    h.presence.set_online(a);

    // Well before the grace period runs out.
    h.clock.set(start + Duration::minutes(1));
    let outcome = h.timeout.force_timeout(match_id).await.unwrap();
    assert_eq!(
        outcome,
        TimeoutOutcome::Resolved(MatchResult::Forfeit { absentee: b })
    );

    // Forcing again reports the existing resolution.
    let outcome = h.timeout.force_timeout(match_id).await.unwrap();
    assert_eq!(outcome, TimeoutOutcome::AlreadyResolved);
}

#[tokio::test]
async fn paused_tournaments_are_skipped_by_the_scan() {
    let h = harness();
    let start = t0() + Duration::hours(2);
    let (id, match_id, a, _) = scheduled_match(&h, start).await;
    h.presence.set_online(a);
    h.progression.pause_tournament(id).await.unwrap();

    h.clock.set(start + Duration::hours(1));
    let summary = h.timeout.tick().await.unwrap();
    assert_eq!(summary.forfeits, 0);
    let m = h.store.match_by_id(match_id).await.unwrap().unwrap();
    assert!(m.result.is_none());

    h.progression.resume_tournament(id).await.unwrap();
    let summary = h.timeout.tick().await.unwrap();
    assert_eq!(summary.forfeits, 1);
}

#[tokio::test]
async fn heartbeat_tick_forfeits_and_advances_in_one_pass() {
    let h = harness();
    let start = t0() + Duration::hours(2);
    let (id, _, a, _) = scheduled_match(&h, start).await;
    h.presence.set_online(a);

    let store: Arc<MemoryStore> = h.store.clone();
    let scheduling = Arc::new(MatchSchedulingCoordinator::new(
        store.clone(),
        h.notifier.clone(),
        h.presence.clone(),
        h.clock.clone(),
        EngineConfig::default(),
    ));
    let heartbeat = Heartbeat::new(
        store.clone(),
        Arc::new(RoundProgressionCoordinator::new(
            store.clone(),
            h.notifier.clone(),
            h.presence.clone(),
            h.clock.clone(),
            EngineConfig::default(),
        )),
        Arc::new(MatchTimeoutCoordinator::new(
            store.clone(),
            h.notifier.clone(),
            h.presence.clone(),
            h.clock.clone(),
            EngineConfig::default(),
        )),
        scheduling,
        60,
    );

    h.clock.set(start + Duration::hours(1));
    // First pass forfeits the no-show; second pass sees the round
    // complete and finishes the single-round tournament.
    heartbeat.tick().await;
    heartbeat.tick().await;

    let t = h.store.tournament(id).await.unwrap().unwrap();
    assert_eq!(
        t.lifecycle,
        chess_championship::tournament::TournamentLifecycle::Completed
    );
}
