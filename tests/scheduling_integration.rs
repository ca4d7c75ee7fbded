//! Integration tests for schedule negotiation: the full propose, counter,
//! confirm flow, validation failures, the instant-start fast path, and
//! proposal expiry.

use std::sync::Arc;

use chess_championship::clock::{Clock, ManualClock};
use chess_championship::config::EngineConfig;
use chess_championship::notify::{EngineEvent, RecordingNotifier};
use chess_championship::presence::StaticPresence;
use chess_championship::scheduling::{
    MatchSchedulingCoordinator, ProposalStatus, SchedulingError,
};
use chess_championship::store::{
    MatchRepository, MemoryStore, ProposalRepository, TournamentRepository,
};
use chess_championship::tournament::{FormatConfig, NewMatch, RoundKind};
use chrono::{DateTime, Duration, TimeZone, Utc};

struct Harness {
    coordinator: MatchSchedulingCoordinator,
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
    let coordinator = MatchSchedulingCoordinator::new(
        store.clone(),
        notifier.clone(),
        presence.clone(),
        clock.clone(),
        EngineConfig::default(),
    );
    Harness {
        coordinator,
        store,
        notifier,
        presence,
        clock,
    }
}

/// One unscheduled match between two participants, deadline 72h out.
async fn match_between(h: &Harness) -> (i64, i64, i64) {
    let tid = h
        .store
        .insert_tournament("Open", &FormatConfig::swiss_only(1))
        .await
        .unwrap();
    let a = h.store.insert_participant(tid, 1).await.unwrap();
    let b = h.store.insert_participant(tid, 2).await.unwrap();
    let round_id = h
        .store
        .insert_round(
            tid,
            1,
            RoundKind::Swiss,
            vec![NewMatch::pairing(a, b, t0() + Duration::hours(72))],
        )
        .await
        .unwrap();
    let m = h.store.round_matches(round_id).await.unwrap().remove(0);
    (m.id, a, b)
}

#[tokio::test]
async fn propose_and_accept_confirms_the_schedule() {
    let h = harness();
    let (match_id, a, b) = match_between(&h).await;
    let time = t0() + Duration::hours(24);

    let proposal = h
        .coordinator
        .propose(match_id, a, time, Some("evening game?".into()))
        .await
        .unwrap();
    assert_eq!(proposal.status, ProposalStatus::Proposed);
    assert!(h.notifier.events().iter().any(|(p, e)| {
        *p == b && matches!(e, EngineEvent::ScheduleProposed { .. })
    }));

    let confirmed = h.coordinator.accept(proposal.id, b).await.unwrap();
    assert_eq!(confirmed, time);

    let stored = h.store.proposal(proposal.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ProposalStatus::Confirmed);
    let m = h.store.match_by_id(match_id).await.unwrap().unwrap();
    assert_eq!(m.scheduled_start, Some(time));

    // Both sides hear about the confirmation.
    let confirmations = h
        .notifier
        .events()
        .iter()
        .filter(|(_, e)| matches!(e, EngineEvent::ScheduleConfirmed { .. }))
        .count();
    assert_eq!(confirmations, 2);
}

#[tokio::test]
async fn alternative_flow_needs_the_original_proposer_to_accept() {
    let h = harness();
    let (match_id, a, b) = match_between(&h).await;
    let time = t0() + Duration::hours(24);
    let alt = t0() + Duration::hours(30);

    let proposal = h.coordinator.propose(match_id, a, time, None).await.unwrap();
    h.coordinator
        .propose_alternative(proposal.id, b, alt)
        .await
        .unwrap();

    // The responder cannot accept their own counter.
    let err = h.coordinator.accept(proposal.id, b).await.unwrap_err();
    assert!(matches!(err, SchedulingError::SelfAcceptanceNotAllowed));

    let confirmed = h.coordinator.accept(proposal.id, a).await.unwrap();
    assert_eq!(confirmed, alt);
    let m = h.store.match_by_id(match_id).await.unwrap().unwrap();
    assert_eq!(m.scheduled_start, Some(alt));
}

#[tokio::test]
async fn validation_failures() {
    let h = harness();
    let (match_id, a, b) = match_between(&h).await;
    let time = t0() + Duration::hours(24);

    // Outsiders cannot propose.
    let err = h.coordinator.propose(match_id, 999, time, None).await.unwrap_err();
    assert!(matches!(err, SchedulingError::NotAParticipant { .. }));

    // Past times are rejected.
    let err = h
        .coordinator
        .propose(match_id, a, t0() - Duration::hours(1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulingError::TimeInPast(_)));

    // Times past the round deadline are rejected.
    let err = h
        .coordinator
        .propose(match_id, a, t0() + Duration::hours(100), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulingError::DeadlineExceeded { .. }));

    // Only one pending proposal per match.
    let proposal = h.coordinator.propose(match_id, a, time, None).await.unwrap();
    let err = h.coordinator.propose(match_id, b, time, None).await.unwrap_err();
    assert!(matches!(err, SchedulingError::ProposalAlreadyPending(_)));

    // The proposer cannot accept their own proposal.
    let err = h.coordinator.accept(proposal.id, a).await.unwrap_err();
    assert!(matches!(err, SchedulingError::SelfAcceptanceNotAllowed));
}

#[tokio::test]
async fn overlapping_confirmed_schedule_is_a_conflict() {
    let h = harness();
    let (first, a, b) = match_between(&h).await;
    let time = t0() + Duration::hours(24);

    let proposal = h.coordinator.propose(first, a, time, None).await.unwrap();
    h.coordinator.accept(proposal.id, b).await.unwrap();

    // A second match for the same pair in another tournament.
    let (second, _, _) = {
        let tid = h
            .store
            .insert_tournament("Other", &FormatConfig::swiss_only(1))
            .await
            .unwrap();
        let round_id = h
            .store
            .insert_round(
                tid,
                1,
                RoundKind::Swiss,
                vec![NewMatch::pairing(a, b, t0() + Duration::hours(72))],
            )
            .await
            .unwrap();
        let m = h.store.round_matches(round_id).await.unwrap().remove(0);
        (m.id, a, b)
    };

    // Within the conflict window of the confirmed slot: rejected.
    let err = h
        .coordinator
        .propose(second, a, time + Duration::minutes(30), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulingError::SchedulingConflict(_)));

    // Far enough away: accepted.
    h.coordinator
        .propose(second, a, time + Duration::hours(6), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn cancel_releases_the_match_for_new_proposals() {
    let h = harness();
    let (match_id, a, b) = match_between(&h).await;
    let time = t0() + Duration::hours(24);

    let proposal = h.coordinator.propose(match_id, a, time, None).await.unwrap();
    h.coordinator.cancel(proposal.id, b).await.unwrap();

    let stored = h.store.proposal(proposal.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ProposalStatus::Cancelled);
    assert!(h.notifier.events().iter().any(|(p, e)| {
        *p == a && matches!(e, EngineEvent::ScheduleCancelled { .. })
    }));

    // A cancelled proposal cannot be accepted.
    let err = h.coordinator.accept(proposal.id, b).await.unwrap_err();
    assert!(matches!(err, SchedulingError::StateConflict));

    // The match is free again.
    h.coordinator.propose(match_id, b, time, None).await.unwrap();
}

#[tokio::test]
async fn instant_start_requires_both_online() {
    let h = harness();
    let (match_id, a, b) = match_between(&h).await;

    let err = h.coordinator.instant_start(match_id, a).await.unwrap_err();
    assert!(matches!(err, SchedulingError::ParticipantsOffline(_)));

    h.presence.set_online(a);
    h.presence.set_online(b);
    let start = h.coordinator.instant_start(match_id, a).await.unwrap();
    assert_eq!(start, h.clock.now());

    let m = h.store.match_by_id(match_id).await.unwrap().unwrap();
    assert_eq!(m.scheduled_start, Some(start));
    let ready = h
        .notifier
        .events()
        .iter()
        .filter(|(_, e)| matches!(e, EngineEvent::GameReady { .. }))
        .count();
    assert_eq!(ready, 2);
}

#[tokio::test]
async fn unconfirmed_proposals_expire_after_their_time_passes() {
    let h = harness();
    let (match_id, a, _) = match_between(&h).await;
    let time = t0() + Duration::hours(24);

    let proposal = h.coordinator.propose(match_id, a, time, None).await.unwrap();

    assert_eq!(h.coordinator.expire_stale().await.unwrap(), 0);
    h.clock.advance(Duration::hours(25));
    assert_eq!(h.coordinator.expire_stale().await.unwrap(), 1);

    let stored = h.store.proposal(proposal.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ProposalStatus::Expired);

    // Idempotent.
    assert_eq!(h.coordinator.expire_stale().await.unwrap(), 0);
}
