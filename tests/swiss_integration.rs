//! Integration tests for the Swiss phase: round generation, byes,
//! standings, and repeat avoidance across a whole event.

use std::sync::Arc;

use chess_championship::clock::ManualClock;
use chess_championship::config::EngineConfig;
use chess_championship::notify::RecordingNotifier;
use chess_championship::presence::StaticPresence;
use chess_championship::store::{MatchRepository, MemoryStore, TournamentRepository};
use chess_championship::tournament::{
    FormatConfig, MatchResult, ParticipantId, RoundProgressionCoordinator,
};
use chrono::{TimeZone, Utc};

struct Harness {
    coordinator: RoundProgressionCoordinator,
    store: Arc<MemoryStore>,
    #[allow(dead_code)]
    notifier: Arc<RecordingNotifier>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
    ));
    let coordinator = RoundProgressionCoordinator::new(
        store.clone(),
        notifier.clone(),
        Arc::new(StaticPresence::new()),
        clock,
        EngineConfig::default(),
    );
    Harness {
        coordinator,
        store,
        notifier,
    }
}

async fn started_tournament(
    h: &Harness,
    format: FormatConfig,
    entrants: u32,
) -> (i64, Vec<ParticipantId>) {
    let id = h
        .coordinator
        .create_tournament("Club Swiss", &format)
        .await
        .unwrap();
    h.coordinator.open_registration(id).await.unwrap();
    let mut participants = Vec::new();
    for seed in 1..=entrants {
        participants.push(h.coordinator.register_participant(id, seed).await.unwrap());
    }
    h.coordinator.start_tournament(id).await.unwrap();
    (id, participants)
}

/// Let the higher-seeded (lower participant id) side win everything.
async fn play_out_current_round(h: &Harness, tournament_id: i64) {
    let rounds = h.store.rounds(tournament_id).await.unwrap();
    let current = rounds
        .iter()
        .rev()
        .find(|r| r.kind == chess_championship::tournament::RoundKind::Swiss)
        .unwrap();
    for m in h.store.round_matches(current.id).await.unwrap() {
        if m.bye || m.is_resolved() {
            continue;
        }
        let (a, b) = m.participants().unwrap();
        let winner = a.min(b);
        h.coordinator
            .report_result(m.id, MatchResult::Decisive { winner })
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn five_player_round_has_two_matches_and_a_bye_scoring_one_point() -> anyhow::Result<()> {
    let h = harness();
    let (id, participants) = started_tournament(&h, FormatConfig::swiss_only(3), 5).await;

    let rounds = h.store.rounds(id).await?;
    assert_eq!(rounds.len(), 1);
    let matches = h.store.round_matches(rounds[0].id).await?;

    let byes: Vec<_> = matches.iter().filter(|m| m.bye).collect();
    assert_eq!(matches.len() - byes.len(), 2);
    assert_eq!(byes.len(), 1);
    let bye_recipient = byes[0].slots[0].participant().unwrap();
    // Seed 5 registered last and sits out first.
    assert_eq!(bye_recipient, participants[4]);

    play_out_current_round(&h, id).await;
    h.coordinator.evaluate(id).await?;

    let standings = h.store.standings(id).await?;
    let bye_row = standings
        .iter()
        .find(|s| s.participant_id == bye_recipient)
        .unwrap();
    assert_eq!(bye_row.points_f64(), 1.0);
    assert_eq!(bye_row.wins, 1);
    assert_eq!(bye_row.buchholz, 0);
    assert_eq!(bye_row.sonnenborn_berger, 0);
    Ok(())
}

#[tokio::test]
async fn no_pairing_repeats_across_a_six_player_event() {
    let h = harness();
    let (id, _) = started_tournament(&h, FormatConfig::swiss_only(3), 6).await;

    let mut seen_pairs = std::collections::HashSet::new();
    for round_number in 1..=3u32 {
        let rounds = h.store.rounds(id).await.unwrap();
        let current = rounds.iter().find(|r| r.number == round_number).unwrap();
        for m in h.store.round_matches(current.id).await.unwrap() {
            if m.bye {
                continue;
            }
            let (a, b) = m.participants().unwrap();
            let fresh = seen_pairs.insert((a.min(b), a.max(b)));
            assert!(fresh, "round {round_number} repeated pairing {a} vs {b}");
        }
        play_out_current_round(&h, id).await;
        h.coordinator.evaluate(id).await.unwrap();
    }
}

#[tokio::test]
async fn points_are_conserved_every_round() {
    let h = harness();
    let (id, _) = started_tournament(&h, FormatConfig::swiss_only(3), 5).await;

    for _ in 0..3 {
        play_out_current_round(&h, id).await;
        h.coordinator.evaluate(id).await.unwrap();

        let rounds = h.store.rounds(id).await.unwrap();
        let mut decided = 0u32;
        for r in &rounds {
            for m in h.store.round_matches(r.id).await.unwrap() {
                if m.result.is_some() {
                    decided += 1;
                }
            }
        }
        let standings = h.store.standings(id).await.unwrap();
        let total: u32 = standings.iter().map(|s| s.points).sum();
        // Every decided match (byes included) hands out exactly one
        // point, i.e. two half-points.
        assert_eq!(total, 2 * decided);
    }
}

#[tokio::test]
async fn byes_rotate_through_the_field() {
    let h = harness();
    let (id, _) = started_tournament(&h, FormatConfig::swiss_only(3), 5).await;

    let mut recipients = Vec::new();
    for _ in 0..3 {
        let rounds = h.store.rounds(id).await.unwrap();
        let current = rounds.last().unwrap();
        for m in h.store.round_matches(current.id).await.unwrap() {
            if m.bye {
                recipients.push(m.slots[0].participant().unwrap());
            }
        }
        play_out_current_round(&h, id).await;
        h.coordinator.evaluate(id).await.unwrap();
    }

    assert_eq!(recipients.len(), 3);
    let unique: std::collections::HashSet<_> = recipients.iter().collect();
    assert_eq!(unique.len(), 3, "bye went to the same participant twice");
}

#[tokio::test]
async fn withdrawn_participant_is_not_paired_in_later_rounds() {
    let h = harness();
    let (id, participants) = started_tournament(&h, FormatConfig::swiss_only(3), 6).await;

    play_out_current_round(&h, id).await;
    let quitter = participants[5];
    h.coordinator
        .withdraw_participant(id, quitter)
        .await
        .unwrap();
    h.coordinator.evaluate(id).await.unwrap();

    let rounds = h.store.rounds(id).await.unwrap();
    let round_two = rounds.iter().find(|r| r.number == 2).unwrap();
    let matches = h.store.round_matches(round_two.id).await.unwrap();
    for m in &matches {
        assert!(!m.has_participant(quitter));
    }
    // Five remaining players: two pairings plus a bye.
    assert_eq!(matches.iter().filter(|m| m.bye).count(), 1);
}
