//! PostgreSQL store backend.
//!
//! Runtime sqlx queries with manual row mapping. Slots and results are
//! stored as JSONB so the tagged enums round-trip without a parallel
//! column scheme; the advancement claim is a nullable column flipped
//! under a conditional UPDATE.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::repository::{MatchRepository, ProposalRepository, TournamentRepository};
use super::{StoreError, StoreResult};
use crate::scheduling::models::{ProposalStatus, ScheduleProposal};
use crate::tournament::models::{
    FormatConfig, Match, MatchId, MatchResult, MatchSlot, NewMatch, Participant, ParticipantId,
    Round, RoundId, RoundKind, Standing, Tournament, TournamentId, TournamentLifecycle,
    TournamentPhase,
};

/// PostgreSQL implementation of all repository traits.
#[derive(Clone)]
pub struct PgChampionshipStore {
    pool: PgPool,
}

impl PgChampionshipStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the schema if it does not exist yet.
    pub async fn migrate(&self) -> StoreResult<()> {
        // Multiple statements, so this goes through the simple query
        // protocol rather than a prepared statement.
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tournaments (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    format JSONB NOT NULL,
    lifecycle TEXT NOT NULL DEFAULT 'upcoming',
    phase TEXT NOT NULL DEFAULT 'swiss',
    current_round INT NOT NULL DEFAULT 0,
    advancing_round INT,
    created_at TIMESTAMP NOT NULL DEFAULT NOW()
);
CREATE TABLE IF NOT EXISTS participants (
    id BIGSERIAL PRIMARY KEY,
    tournament_id BIGINT NOT NULL REFERENCES tournaments(id),
    seed INT NOT NULL,
    withdrawn BOOLEAN NOT NULL DEFAULT FALSE
);
CREATE TABLE IF NOT EXISTS rounds (
    id BIGSERIAL PRIMARY KEY,
    tournament_id BIGINT NOT NULL REFERENCES tournaments(id),
    number INT NOT NULL,
    kind TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS matches (
    id BIGSERIAL PRIMARY KEY,
    round_id BIGINT NOT NULL REFERENCES rounds(id),
    slot_a JSONB NOT NULL,
    slot_b JSONB NOT NULL,
    bye BOOLEAN NOT NULL DEFAULT FALSE,
    scheduled_start TIMESTAMP,
    deadline TIMESTAMP,
    warning_sent BOOLEAN NOT NULL DEFAULT FALSE,
    auto_generated BOOLEAN NOT NULL DEFAULT TRUE,
    result JSONB
);
CREATE TABLE IF NOT EXISTS standings (
    tournament_id BIGINT NOT NULL REFERENCES tournaments(id),
    participant_id BIGINT NOT NULL,
    points INT NOT NULL,
    wins INT NOT NULL,
    losses INT NOT NULL,
    draws INT NOT NULL,
    buchholz INT NOT NULL,
    sonnenborn_berger INT NOT NULL,
    rank INT NOT NULL,
    PRIMARY KEY (tournament_id, participant_id)
);
CREATE TABLE IF NOT EXISTS schedule_proposals (
    id UUID PRIMARY KEY,
    match_id BIGINT NOT NULL REFERENCES matches(id),
    proposer BIGINT NOT NULL,
    responder BIGINT NOT NULL,
    proposed_time TIMESTAMP NOT NULL,
    alternative_time TIMESTAMP,
    status TEXT NOT NULL,
    message TEXT
)
"#;

fn lifecycle_to_str(lifecycle: TournamentLifecycle) -> &'static str {
    match lifecycle {
        TournamentLifecycle::Upcoming => "upcoming",
        TournamentLifecycle::RegistrationOpen => "registration_open",
        TournamentLifecycle::InProgress => "in_progress",
        TournamentLifecycle::Paused => "paused",
        TournamentLifecycle::Completed => "completed",
        TournamentLifecycle::Cancelled => "cancelled",
    }
}

fn lifecycle_from_str(raw: &str) -> TournamentLifecycle {
    match raw {
        "registration_open" => TournamentLifecycle::RegistrationOpen,
        "in_progress" => TournamentLifecycle::InProgress,
        "paused" => TournamentLifecycle::Paused,
        "completed" => TournamentLifecycle::Completed,
        "cancelled" => TournamentLifecycle::Cancelled,
        _ => TournamentLifecycle::Upcoming,
    }
}

fn phase_to_str(phase: TournamentPhase) -> &'static str {
    match phase {
        TournamentPhase::Swiss => "swiss",
        TournamentPhase::Elimination => "elimination",
    }
}

fn kind_to_str(kind: RoundKind) -> &'static str {
    match kind {
        RoundKind::Swiss => "swiss",
        RoundKind::Elimination => "elimination",
        RoundKind::ThirdPlace => "third_place",
        RoundKind::Final => "final",
    }
}

fn kind_from_str(raw: &str) -> RoundKind {
    match raw {
        "elimination" => RoundKind::Elimination,
        "third_place" => RoundKind::ThirdPlace,
        "final" => RoundKind::Final,
        _ => RoundKind::Swiss,
    }
}

fn status_to_str(status: ProposalStatus) -> &'static str {
    match status {
        ProposalStatus::Proposed => "proposed",
        ProposalStatus::Accepted => "accepted",
        ProposalStatus::AlternativeProposed => "alternative_proposed",
        ProposalStatus::Confirmed => "confirmed",
        ProposalStatus::Cancelled => "cancelled",
        ProposalStatus::Expired => "expired",
    }
}

fn status_from_str(raw: &str) -> ProposalStatus {
    match raw {
        "accepted" => ProposalStatus::Accepted,
        "alternative_proposed" => ProposalStatus::AlternativeProposed,
        "confirmed" => ProposalStatus::Confirmed,
        "cancelled" => ProposalStatus::Cancelled,
        "expired" => ProposalStatus::Expired,
        _ => ProposalStatus::Proposed,
    }
}

fn row_to_tournament(row: &PgRow) -> StoreResult<Tournament> {
    let lifecycle: String = row.get("lifecycle");
    let phase: String = row.get("phase");
    let format: FormatConfig = serde_json::from_value(row.get("format"))?;
    Ok(Tournament {
        id: row.get("id"),
        name: row.get("name"),
        format,
        lifecycle: lifecycle_from_str(&lifecycle),
        phase: match phase.as_str() {
            "elimination" => TournamentPhase::Elimination,
            _ => TournamentPhase::Swiss,
        },
        current_round: row.get::<i32, _>("current_round") as u32,
    })
}

fn row_to_match(row: &PgRow) -> StoreResult<Match> {
    let slot_a: MatchSlot = serde_json::from_value(row.get("slot_a"))?;
    let slot_b: MatchSlot = serde_json::from_value(row.get("slot_b"))?;
    let result: Option<MatchResult> = row
        .get::<Option<serde_json::Value>, _>("result")
        .map(serde_json::from_value)
        .transpose()?;
    Ok(Match {
        id: row.get("id"),
        round_id: row.get("round_id"),
        slots: [slot_a, slot_b],
        bye: row.get("bye"),
        scheduled_start: row
            .get::<Option<NaiveDateTime>, _>("scheduled_start")
            .map(|dt| dt.and_utc()),
        deadline: row
            .get::<Option<NaiveDateTime>, _>("deadline")
            .map(|dt| dt.and_utc()),
        warning_sent: row.get("warning_sent"),
        auto_generated: row.get("auto_generated"),
        result,
    })
}

fn row_to_round(row: &PgRow) -> Round {
    let kind: String = row.get("kind");
    Round {
        id: row.get("id"),
        tournament_id: row.get("tournament_id"),
        number: row.get::<i32, _>("number") as u32,
        kind: kind_from_str(&kind),
    }
}

fn row_to_proposal(row: &PgRow) -> ScheduleProposal {
    let status: String = row.get("status");
    ScheduleProposal {
        id: row.get("id"),
        match_id: row.get("match_id"),
        proposer: row.get("proposer"),
        responder: row.get("responder"),
        proposed_time: row.get::<NaiveDateTime, _>("proposed_time").and_utc(),
        alternative_time: row
            .get::<Option<NaiveDateTime>, _>("alternative_time")
            .map(|dt| dt.and_utc()),
        status: status_from_str(&status),
        message: row.get("message"),
    }
}

#[async_trait]
impl TournamentRepository for PgChampionshipStore {
    async fn insert_tournament(
        &self,
        name: &str,
        format: &FormatConfig,
    ) -> StoreResult<TournamentId> {
        let row = sqlx::query(
            "INSERT INTO tournaments (name, format, lifecycle) VALUES ($1, $2, 'upcoming') RETURNING id",
        )
        .bind(name)
        .bind(serde_json::to_value(format)?)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("id"))
    }

    async fn tournament(&self, id: TournamentId) -> StoreResult<Option<Tournament>> {
        let row = sqlx::query(
            "SELECT id, name, format, lifecycle, phase, current_round FROM tournaments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_tournament).transpose()
    }

    async fn set_lifecycle(
        &self,
        id: TournamentId,
        lifecycle: TournamentLifecycle,
    ) -> StoreResult<()> {
        let result = sqlx::query("UPDATE tournaments SET lifecycle = $1 WHERE id = $2")
            .bind(lifecycle_to_str(lifecycle))
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "tournament",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn set_phase(
        &self,
        id: TournamentId,
        phase: TournamentPhase,
        current_round: u32,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE tournaments SET phase = $1, current_round = $2 WHERE id = $3")
            .bind(phase_to_str(phase))
            .bind(current_round as i32)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn in_progress_tournaments(&self) -> StoreResult<Vec<Tournament>> {
        let rows = sqlx::query(
            "SELECT id, name, format, lifecycle, phase, current_round
             FROM tournaments WHERE lifecycle = 'in_progress' ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_tournament).collect()
    }

    async fn insert_participant(
        &self,
        tournament_id: TournamentId,
        seed: u32,
    ) -> StoreResult<ParticipantId> {
        let row = sqlx::query(
            "INSERT INTO participants (tournament_id, seed) VALUES ($1, $2) RETURNING id",
        )
        .bind(tournament_id)
        .bind(seed as i32)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("id"))
    }

    async fn participants(&self, tournament_id: TournamentId) -> StoreResult<Vec<Participant>> {
        let rows = sqlx::query(
            "SELECT id, seed, withdrawn FROM participants WHERE tournament_id = $1 ORDER BY id",
        )
        .bind(tournament_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| Participant {
                id: row.get("id"),
                seed: row.get::<i32, _>("seed") as u32,
                withdrawn: row.get("withdrawn"),
            })
            .collect())
    }

    async fn set_withdrawn(
        &self,
        tournament_id: TournamentId,
        participant_id: ParticipantId,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE participants SET withdrawn = TRUE WHERE tournament_id = $1 AND id = $2",
        )
        .bind(tournament_id)
        .bind(participant_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "participant",
                id: participant_id.to_string(),
            });
        }
        Ok(())
    }

    async fn claim_advancement(&self, id: TournamentId, round: u32) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE tournaments SET advancing_round = $2
             WHERE id = $1 AND current_round = $2 AND advancing_round IS NULL",
        )
        .bind(id)
        .bind(round as i32)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_advancement(&self, id: TournamentId) -> StoreResult<()> {
        sqlx::query("UPDATE tournaments SET advancing_round = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn replace_standings(
        &self,
        id: TournamentId,
        standings: &[Standing],
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM standings WHERE tournament_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for s in standings {
            sqlx::query(
                "INSERT INTO standings
                 (tournament_id, participant_id, points, wins, losses, draws, buchholz, sonnenborn_berger, rank)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(id)
            .bind(s.participant_id)
            .bind(s.points as i32)
            .bind(s.wins as i32)
            .bind(s.losses as i32)
            .bind(s.draws as i32)
            .bind(s.buchholz as i32)
            .bind(s.sonnenborn_berger as i32)
            .bind(s.rank as i32)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn standings(&self, id: TournamentId) -> StoreResult<Vec<Standing>> {
        let rows = sqlx::query(
            "SELECT participant_id, points, wins, losses, draws, buchholz, sonnenborn_berger, rank
             FROM standings WHERE tournament_id = $1 ORDER BY rank",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| Standing {
                tournament_id: id,
                participant_id: row.get("participant_id"),
                points: row.get::<i32, _>("points") as u32,
                wins: row.get::<i32, _>("wins") as u32,
                losses: row.get::<i32, _>("losses") as u32,
                draws: row.get::<i32, _>("draws") as u32,
                buchholz: row.get::<i32, _>("buchholz") as u32,
                sonnenborn_berger: row.get::<i32, _>("sonnenborn_berger") as u32,
                rank: row.get::<i32, _>("rank") as u32,
            })
            .collect())
    }
}

#[async_trait]
impl MatchRepository for PgChampionshipStore {
    async fn insert_round(
        &self,
        tournament_id: TournamentId,
        number: u32,
        kind: RoundKind,
        matches: Vec<NewMatch>,
    ) -> StoreResult<RoundId> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "INSERT INTO rounds (tournament_id, number, kind) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(tournament_id)
        .bind(number as i32)
        .bind(kind_to_str(kind))
        .fetch_one(&mut *tx)
        .await?;
        let round_id: RoundId = row.get("id");

        for m in matches {
            sqlx::query(
                "INSERT INTO matches (round_id, slot_a, slot_b, bye, deadline, auto_generated, result)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(round_id)
            .bind(serde_json::to_value(m.slots[0])?)
            .bind(serde_json::to_value(m.slots[1])?)
            .bind(m.bye)
            .bind(m.deadline.map(|dt| dt.naive_utc()))
            .bind(m.auto_generated)
            .bind(m.result.map(serde_json::to_value).transpose()?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(round_id)
    }

    async fn rounds(&self, tournament_id: TournamentId) -> StoreResult<Vec<Round>> {
        let rows = sqlx::query(
            "SELECT id, tournament_id, number, kind FROM rounds
             WHERE tournament_id = $1 ORDER BY number",
        )
        .bind(tournament_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_round).collect())
    }

    async fn round(&self, id: RoundId) -> StoreResult<Option<Round>> {
        let row = sqlx::query("SELECT id, tournament_id, number, kind FROM rounds WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_round))
    }

    async fn round_matches(&self, round_id: RoundId) -> StoreResult<Vec<Match>> {
        let rows = sqlx::query(
            "SELECT id, round_id, slot_a, slot_b, bye, scheduled_start, deadline, warning_sent, auto_generated, result
             FROM matches WHERE round_id = $1 ORDER BY id",
        )
        .bind(round_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_match).collect()
    }

    async fn match_by_id(&self, id: MatchId) -> StoreResult<Option<Match>> {
        let row = sqlx::query(
            "SELECT id, round_id, slot_a, slot_b, bye, scheduled_start, deadline, warning_sent, auto_generated, result
             FROM matches WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_match).transpose()
    }

    async fn record_result(&self, id: MatchId, result: &MatchResult) -> StoreResult<bool> {
        let outcome = sqlx::query("UPDATE matches SET result = $2 WHERE id = $1 AND result IS NULL")
            .bind(id)
            .bind(serde_json::to_value(result)?)
            .execute(&self.pool)
            .await?;
        Ok(outcome.rows_affected() == 1)
    }

    async fn set_schedule(&self, id: MatchId, start: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE matches SET scheduled_start = $2 WHERE id = $1")
            .bind(id)
            .bind(start.naive_utc())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_deadline(&self, id: MatchId, deadline: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE matches SET deadline = $2 WHERE id = $1")
            .bind(id)
            .bind(deadline.naive_utc())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_warning_sent(&self, id: MatchId) -> StoreResult<bool> {
        let outcome =
            sqlx::query("UPDATE matches SET warning_sent = TRUE WHERE id = $1 AND warning_sent = FALSE")
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(outcome.rows_affected() == 1)
    }

    async fn set_slots(&self, id: MatchId, slots: &[MatchSlot; 2]) -> StoreResult<()> {
        sqlx::query("UPDATE matches SET slot_a = $2, slot_b = $3 WHERE id = $1")
            .bind(id)
            .bind(serde_json::to_value(slots[0])?)
            .bind(serde_json::to_value(slots[1])?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn unresolved_matches(&self, tournament_id: TournamentId) -> StoreResult<Vec<Match>> {
        let rows = sqlx::query(
            "SELECT m.id, m.round_id, m.slot_a, m.slot_b, m.bye, m.scheduled_start, m.deadline, m.warning_sent, m.auto_generated, m.result
             FROM matches m JOIN rounds r ON r.id = m.round_id
             WHERE r.tournament_id = $1 AND m.result IS NULL ORDER BY m.id",
        )
        .bind(tournament_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_match).collect()
    }

    async fn confirmed_overlap(
        &self,
        participant: ParticipantId,
        start: DateTime<Utc>,
        window: Duration,
    ) -> StoreResult<bool> {
        let slot = serde_json::to_value(MatchSlot::Resolved(participant))?;
        let row = sqlx::query(
            "SELECT EXISTS (
                 SELECT 1 FROM matches
                 WHERE result IS NULL
                   AND scheduled_start IS NOT NULL
                   AND scheduled_start > $1 AND scheduled_start < $2
                   AND (slot_a = $3 OR slot_b = $3)
             ) AS hit",
        )
        .bind((start - window).naive_utc())
        .bind((start + window).naive_utc())
        .bind(slot)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("hit"))
    }
}

#[async_trait]
impl ProposalRepository for PgChampionshipStore {
    async fn insert_proposal(&self, proposal: &ScheduleProposal) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO schedule_proposals
             (id, match_id, proposer, responder, proposed_time, alternative_time, status, message)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(proposal.id)
        .bind(proposal.match_id)
        .bind(proposal.proposer)
        .bind(proposal.responder)
        .bind(proposal.proposed_time.naive_utc())
        .bind(proposal.alternative_time.map(|dt| dt.naive_utc()))
        .bind(status_to_str(proposal.status))
        .bind(&proposal.message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn proposal(&self, id: Uuid) -> StoreResult<Option<ScheduleProposal>> {
        let row = sqlx::query(
            "SELECT id, match_id, proposer, responder, proposed_time, alternative_time, status, message
             FROM schedule_proposals WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_proposal))
    }

    async fn pending_proposal(
        &self,
        match_id: MatchId,
    ) -> StoreResult<Option<ScheduleProposal>> {
        let row = sqlx::query(
            "SELECT id, match_id, proposer, responder, proposed_time, alternative_time, status, message
             FROM schedule_proposals
             WHERE match_id = $1 AND status IN ('proposed', 'accepted', 'alternative_proposed')
             LIMIT 1",
        )
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_proposal))
    }

    async fn transition_status(
        &self,
        id: Uuid,
        expected: ProposalStatus,
        next: ProposalStatus,
    ) -> StoreResult<bool> {
        let outcome =
            sqlx::query("UPDATE schedule_proposals SET status = $3 WHERE id = $1 AND status = $2")
                .bind(id)
                .bind(status_to_str(expected))
                .bind(status_to_str(next))
                .execute(&self.pool)
                .await?;
        Ok(outcome.rows_affected() == 1)
    }

    async fn set_alternative(
        &self,
        id: Uuid,
        alternative: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let outcome = sqlx::query(
            "UPDATE schedule_proposals
             SET status = 'alternative_proposed', alternative_time = $2
             WHERE id = $1 AND status = 'proposed'",
        )
        .bind(id)
        .bind(alternative.naive_utc())
        .execute(&self.pool)
        .await?;
        Ok(outcome.rows_affected() == 1)
    }

    async fn stale_pending_proposals(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<ScheduleProposal>> {
        let rows = sqlx::query(
            "SELECT id, match_id, proposer, responder, proposed_time, alternative_time, status, message
             FROM schedule_proposals
             WHERE status IN ('proposed', 'accepted', 'alternative_proposed')
               AND COALESCE(alternative_time, proposed_time) < $1",
        )
        .bind(now.naive_utc())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_proposal).collect())
    }
}
