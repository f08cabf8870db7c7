//! The authoritative per-room state machine.
//!
//! All mutations go through [`RoomMachine`] while the caller holds the room's
//! serialization lock, so a kill-driven `last_alive` finish and a concurrent
//! timer expiry can never both produce a terminal broadcast.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use rand::Rng;
use tracing::{debug, info};

use crate::dto::ws::{
    AnswerResult, GameOverEvent, GameOverReason, Notice, PlayerSummary, Question, RoomSnapshot,
    ServerEvent, TriggerEvent, TriggerOutcome,
};
use crate::state::questions::{QuestionCard, QuestionPool};

/// Points awarded for a correct answer.
const CORRECT_SCORE_DELTA: u32 = 10;
/// Consecutive correct answers needed to raise the difficulty.
const STREAK_FOR_DIFFICULTY: u32 = 3;
/// Upper bound of the per-player difficulty level.
const MAX_DIFFICULTY: u8 = 5;
/// Flavor text for a survived trigger.
const SURVIVED_MESSAGE: &str = "LUCKY! You survived.";
/// Flavor text for a lethal trigger.
const ELIMINATED_MESSAGE: &str = "YOU DIED.";

/// High-level lifecycle of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    /// Room created, no timer running.
    Waiting,
    /// Timer running, questions flowing.
    Active,
    /// Terminal; never exited.
    Over,
}

/// Per-player state tracked by the room.
#[derive(Debug, Clone)]
struct PlayerState {
    score: u32,
    alive: bool,
    correct_streak: u32,
    difficulty: u8,
    cursor: usize,
    current: Option<QuestionCard>,
}

impl PlayerState {
    fn new() -> Self {
        Self {
            score: 0,
            alive: true,
            correct_streak: 0,
            difficulty: 1,
            cursor: 0,
            current: None,
        }
    }
}

/// Events produced by one room operation.
///
/// `to_player` is delivered only to the submitting/joining connection,
/// `broadcast` to every room member. `round_started` tells the caller to
/// spawn the round timer.
#[derive(Debug, Default)]
pub struct Effects {
    /// Events for the connection that triggered the operation.
    pub to_player: Vec<ServerEvent>,
    /// Events for every member of the room.
    pub broadcast: Vec<ServerEvent>,
    /// True exactly once per round, on the join that activated the room.
    pub round_started: bool,
}

enum SubmitOutcome {
    Correct,
    Survived,
    Killed,
}

/// Authoritative state machine for a single room.
#[derive(Debug)]
pub struct RoomMachine {
    room_id: String,
    duration_secs: u64,
    survival_probability: f64,
    pool: QuestionPool,
    players: IndexMap<String, PlayerState>,
    status: RoomStatus,
    started_at: Option<Instant>,
    started_at_epoch_ms: Option<u64>,
    winner_id: Option<String>,
    end_reason: Option<GameOverReason>,
}

impl RoomMachine {
    /// Create a room in the `waiting` state.
    pub fn new(
        room_id: impl Into<String>,
        duration_secs: u64,
        survival_probability: f64,
        pool: QuestionPool,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            duration_secs,
            survival_probability,
            pool,
            players: IndexMap::new(),
            status: RoomStatus::Waiting,
            started_at: None,
            started_at_epoch_ms: None,
            winner_id: None,
            end_reason: None,
        }
    }

    /// Identifier of this room.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Current lifecycle status.
    pub fn status(&self) -> RoomStatus {
        self.status
    }

    /// Winner, set only once the room is over.
    pub fn winner_id(&self) -> Option<&str> {
        self.winner_id.as_deref()
    }

    /// Why the room ended, if it has.
    pub fn end_reason(&self) -> Option<GameOverReason> {
        self.end_reason
    }

    /// Round length in seconds.
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    /// Discard the roster and timer state, returning the room to `waiting`.
    pub fn reset(&mut self, duration_secs: Option<u64>) {
        self.players.clear();
        self.status = RoomStatus::Waiting;
        self.started_at = None;
        self.started_at_epoch_ms = None;
        self.winner_id = None;
        self.end_reason = None;
        if let Some(duration) = duration_secs {
            self.duration_secs = duration;
        }
        info!(room = %self.room_id, "room reset to waiting");
    }

    /// Register `player_id`, activating the room on the first join.
    ///
    /// Known ids resume: their question and snapshot are re-sent without
    /// touching score or alive state. Joins on an `over` room are an
    /// idempotent read of the final snapshot.
    pub fn join(&mut self, player_id: &str) -> Effects {
        let mut fx = Effects::default();

        if self.status == RoomStatus::Over {
            fx.to_player.push(ServerEvent::Room(self.snapshot()));
            fx.to_player
                .push(ServerEvent::GameOver(self.terminal_event(GameOverReason::Ended)));
            return fx;
        }

        if !self.players.contains_key(player_id) {
            self.players.insert(player_id.to_string(), PlayerState::new());
            if self.status == RoomStatus::Waiting {
                self.status = RoomStatus::Active;
                self.started_at = Some(Instant::now());
                self.started_at_epoch_ms = Some(now_epoch_ms());
                fx.round_started = true;
                info!(room = %self.room_id, player = %player_id, "first join activated room");
            }
        }

        if let Some(question) = self.current_or_issue(player_id) {
            fx.to_player.push(ServerEvent::Question(question));
        }
        fx.broadcast.push(ServerEvent::Room(self.snapshot()));
        fx
    }

    /// Score a submission, resolving a trigger on a wrong answer.
    ///
    /// Stale question ids, unknown or dead players, and waiting rooms are
    /// silently dropped; an `over` room answers with the final snapshot.
    pub fn submit(
        &mut self,
        player_id: &str,
        question_id: &str,
        answer: &str,
        rng: &mut impl Rng,
    ) -> Effects {
        let mut fx = Effects::default();

        match self.status {
            RoomStatus::Waiting => return fx,
            RoomStatus::Over => {
                fx.to_player
                    .push(ServerEvent::GameOver(self.terminal_event(GameOverReason::Ended)));
                return fx;
            }
            RoomStatus::Active => {}
        }

        let survival_probability = self.survival_probability;
        let outcome = {
            let Some(player) = self.players.get_mut(player_id) else {
                return fx;
            };
            if !player.alive {
                return fx;
            }
            let Some(current) = player.current.as_ref() else {
                return fx;
            };
            if current.id != question_id {
                debug!(
                    room = %self.room_id,
                    player = %player_id,
                    stale = %question_id,
                    current = %current.id,
                    "dropping stale submission"
                );
                return fx;
            }

            if current.accepts(answer) {
                player.score += CORRECT_SCORE_DELTA;
                player.correct_streak += 1;
                let mut raised_to = None;
                if player.correct_streak >= STREAK_FOR_DIFFICULTY {
                    if player.difficulty < MAX_DIFFICULTY {
                        player.difficulty += 1;
                        raised_to = Some(player.difficulty);
                    }
                    player.correct_streak = 0;
                }
                fx.to_player.push(ServerEvent::Result(AnswerResult {
                    correct: true,
                    score_delta: CORRECT_SCORE_DELTA,
                    total_score: player.score,
                }));
                if let Some(level) = raised_to {
                    fx.to_player.push(ServerEvent::Notice(Notice {
                        message: format!("Difficulty increased to {level}."),
                    }));
                }
                SubmitOutcome::Correct
            } else {
                player.correct_streak = 0;
                fx.to_player.push(ServerEvent::Result(AnswerResult {
                    correct: false,
                    score_delta: 0,
                    total_score: player.score,
                }));
                let survived = rng.random::<f64>() < survival_probability;
                if survived {
                    fx.to_player.push(ServerEvent::Trigger(TriggerEvent {
                        outcome: TriggerOutcome::Alive,
                        message: SURVIVED_MESSAGE.into(),
                    }));
                    SubmitOutcome::Survived
                } else {
                    player.alive = false;
                    fx.to_player.push(ServerEvent::Trigger(TriggerEvent {
                        outcome: TriggerOutcome::Dead,
                        message: ELIMINATED_MESSAGE.into(),
                    }));
                    SubmitOutcome::Killed
                }
            }
        };

        match outcome {
            SubmitOutcome::Correct | SubmitOutcome::Survived => {
                if let Some(question) = self.issue_question(player_id) {
                    fx.to_player.push(ServerEvent::Question(question));
                }
                fx.broadcast.push(ServerEvent::Room(self.snapshot()));
            }
            SubmitOutcome::Killed => {
                info!(room = %self.room_id, player = %player_id, "player eliminated");
                fx.broadcast.push(ServerEvent::Room(self.snapshot()));
                if let Some(over) = self.maybe_finish_after_kill() {
                    fx.broadcast.push(ServerEvent::GameOver(over));
                }
            }
        }
        fx
    }

    /// Timer expiry: finish with `timeout` if the room is still active.
    ///
    /// Returns the terminal broadcast, or `None` when a kill already ended
    /// the room before the timer fired.
    pub fn expire(&mut self) -> Option<ServerEvent> {
        self.finish(GameOverReason::Timeout)
            .map(ServerEvent::GameOver)
    }

    /// Build the public snapshot of this room.
    pub fn snapshot(&self) -> RoomSnapshot {
        let players: Vec<PlayerSummary> = self
            .players
            .iter()
            .map(|(id, state)| PlayerSummary {
                id: id.clone(),
                score: state.score,
                alive: state.alive,
            })
            .collect();
        let alive_count = players.iter().filter(|entry| entry.alive).count();
        let dead_count = players.len() - alive_count;
        let time_left = match self.started_at {
            None => self.duration_secs,
            Some(started) => self.duration_secs.saturating_sub(started.elapsed().as_secs()),
        };

        RoomSnapshot {
            room_id: self.room_id.clone(),
            players,
            alive_count,
            dead_count,
            time_left,
            duration_seconds: self.duration_secs,
            server_now_ms: now_epoch_ms(),
            started_at_ms: self.started_at_epoch_ms,
        }
    }

    /// Terminal event carrying the stored winner and the given reason.
    fn terminal_event(&self, reason: GameOverReason) -> GameOverEvent {
        GameOverEvent {
            winner_id: self.winner_id.clone(),
            reason,
            room: self.snapshot(),
        }
    }

    /// Transition to `over` exactly once, computing the winner.
    fn finish(&mut self, reason: GameOverReason) -> Option<GameOverEvent> {
        if self.status == RoomStatus::Over {
            return None;
        }
        self.status = RoomStatus::Over;
        self.end_reason = Some(reason);
        self.winner_id = self.compute_winner();
        info!(
            room = %self.room_id,
            reason = ?reason,
            winner = ?self.winner_id,
            "room over"
        );
        Some(self.terminal_event(reason))
    }

    /// Highest score among alive players, ties broken by earliest join.
    fn compute_winner(&self) -> Option<String> {
        let mut best: Option<(&String, u32)> = None;
        for (id, player) in &self.players {
            if !player.alive {
                continue;
            }
            match best {
                Some((_, score)) if player.score <= score => {}
                _ => best = Some((id, player.score)),
            }
        }
        best.map(|(id, _)| id.clone())
    }

    /// Elimination check after a kill: the room ends when nobody is left
    /// alive, or when exactly one of several players is.
    fn maybe_finish_after_kill(&mut self) -> Option<GameOverEvent> {
        let roster = self.players.len();
        let alive = self.players.values().filter(|player| player.alive).count();
        if alive == 0 || (alive == 1 && roster > 1) {
            self.finish(GameOverReason::LastAlive)
        } else {
            None
        }
    }

    /// Re-send the player's current question, issuing one if none is pending.
    fn current_or_issue(&mut self, player_id: &str) -> Option<Question> {
        if let Some(card) = self
            .players
            .get(player_id)
            .and_then(|player| player.current.as_ref())
        {
            return Some(Question::from(card));
        }
        self.issue_question(player_id)
    }

    /// Advance the player's cursor and hand out the next pool question.
    fn issue_question(&mut self, player_id: &str) -> Option<Question> {
        let (cursor, last_id) = {
            let player = self.players.get(player_id)?;
            (
                player.cursor,
                player.current.as_ref().map(|card| card.id.clone()),
            )
        };
        let (card, next_cursor) = self.pool.issue(cursor, last_id.as_deref());
        let card = card.clone();
        let player = self.players.get_mut(player_id)?;
        player.cursor = next_cursor;
        player.current = Some(card.clone());
        Some(Question::from(&card))
    }
}

/// Milliseconds since the Unix epoch, saturating at zero on clock skew.
fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    /// Rng that always yields the same word, making trigger draws deterministic.
    struct ConstRng(u64);

    impl RngCore for ConstRng {
        fn next_u32(&mut self) -> u32 {
            self.0 as u32
        }

        fn next_u64(&mut self) -> u64 {
            self.0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }
    }

    /// Rng whose f64 draws are ~0.0, i.e. the trigger always survives.
    fn surviving_rng() -> ConstRng {
        ConstRng(0)
    }

    /// Rng whose f64 draws are ~1.0, i.e. the trigger always kills.
    fn lethal_rng() -> ConstRng {
        ConstRng(u64::MAX)
    }

    fn machine(room_id: &str) -> RoomMachine {
        RoomMachine::new(
            room_id,
            180,
            0.5,
            QuestionPool::new(crate::config::AppConfig::default().questions()),
        )
    }

    fn first_question(fx: &Effects) -> Question {
        fx.to_player
            .iter()
            .find_map(|event| match event {
                ServerEvent::Question(question) => Some(question.clone()),
                _ => None,
            })
            .expect("join must issue a question")
    }

    fn game_over(fx: &Effects) -> Option<GameOverEvent> {
        fx.broadcast.iter().find_map(|event| match event {
            ServerEvent::GameOver(over) => Some(over.clone()),
            _ => None,
        })
    }

    #[test]
    fn first_join_activates_room_and_issues_question() {
        let mut room = machine("r1");
        assert_eq!(room.status(), RoomStatus::Waiting);

        let fx = room.join("p1");
        assert_eq!(room.status(), RoomStatus::Active);
        assert!(fx.round_started);
        assert_eq!(first_question(&fx).id, "q1");
        assert!(matches!(fx.broadcast.first(), Some(ServerEvent::Room(_))));
    }

    #[test]
    fn second_join_does_not_restart_round() {
        let mut room = machine("r1");
        let _ = room.join("p1");
        let fx = room.join("p2");
        assert!(!fx.round_started);
        assert_eq!(room.status(), RoomStatus::Active);
    }

    #[test]
    fn rejoin_resends_current_question_without_reset() {
        let mut room = machine("r1");
        let fx = room.join("p1");
        let question = first_question(&fx);
        let fx = room.submit("p1", &question.id, "chance", &mut surviving_rng());
        let next = fx
            .to_player
            .iter()
            .find_map(|event| match event {
                ServerEvent::Question(q) => Some(q.clone()),
                _ => None,
            })
            .unwrap();

        let fx = room.join("p1");
        assert!(!fx.round_started);
        assert_eq!(first_question(&fx).id, next.id);
        let snapshot = room.snapshot();
        assert_eq!(snapshot.players[0].score, 10);
        assert!(snapshot.players[0].alive);
    }

    #[test]
    fn correct_answer_scores_ten_and_advances() {
        let mut room = machine("r1");
        let question = first_question(&room.join("p1"));
        assert_eq!(question.id, "q1");

        let fx = room.submit("p1", "q1", "chance", &mut surviving_rng());
        match &fx.to_player[0] {
            ServerEvent::Result(result) => {
                assert!(result.correct);
                assert_eq!(result.score_delta, 10);
                assert_eq!(result.total_score, 10);
            }
            other => panic!("expected result, got {other:?}"),
        }
        assert!(fx
            .to_player
            .iter()
            .any(|event| matches!(event, ServerEvent::Question(q) if q.id != "q1")));
    }

    #[test]
    fn answer_compare_is_trimmed_and_case_insensitive() {
        let mut room = machine("r1");
        let question = first_question(&room.join("p1"));
        let fx = room.submit("p1", &question.id, "  CHANCE ", &mut lethal_rng());
        match &fx.to_player[0] {
            ServerEvent::Result(result) => assert!(result.correct),
            other => panic!("expected result, got {other:?}"),
        }
    }

    #[test]
    fn stale_question_id_is_silently_dropped() {
        let mut room = machine("r1");
        let _ = room.join("p1");
        let fx = room.submit("p1", "q99", "chance", &mut surviving_rng());
        assert!(fx.to_player.is_empty());
        assert!(fx.broadcast.is_empty());
    }

    #[test]
    fn unknown_player_submission_is_ignored() {
        let mut room = machine("r1");
        let _ = room.join("p1");
        let fx = room.submit("ghost", "q1", "chance", &mut surviving_rng());
        assert!(fx.to_player.is_empty());
    }

    #[test]
    fn wrong_answer_with_survival_keeps_player_alive() {
        let mut room = machine("r1");
        let question = first_question(&room.join("p1"));
        let fx = room.submit("p1", &question.id, "wrong", &mut surviving_rng());

        assert!(fx.to_player.iter().any(|event| matches!(
            event,
            ServerEvent::Trigger(TriggerEvent {
                outcome: TriggerOutcome::Alive,
                ..
            })
        )));
        assert!(fx
            .to_player
            .iter()
            .any(|event| matches!(event, ServerEvent::Question(_))));
        assert_eq!(room.status(), RoomStatus::Active);
    }

    #[test]
    fn lethal_trigger_in_single_player_room_ends_with_null_winner() {
        let mut room = machine("r1");
        let question = first_question(&room.join("p1"));
        let fx = room.submit("p1", &question.id, "wrong", &mut lethal_rng());

        assert!(fx.to_player.iter().any(|event| matches!(
            event,
            ServerEvent::Trigger(TriggerEvent {
                outcome: TriggerOutcome::Dead,
                ..
            })
        )));
        let over = game_over(&fx).expect("room must end");
        assert_eq!(over.reason, GameOverReason::LastAlive);
        assert_eq!(over.winner_id, None);
        assert_eq!(room.status(), RoomStatus::Over);
    }

    #[test]
    fn kill_leaving_one_of_two_alive_preempts_timer() {
        let mut room = machine("r1");
        let q1 = first_question(&room.join("p1"));
        let _ = room.join("p2");

        let fx = room.submit("p1", &q1.id, "wrong", &mut lethal_rng());
        let over = game_over(&fx).expect("room must end");
        assert_eq!(over.reason, GameOverReason::LastAlive);
        assert_eq!(over.winner_id.as_deref(), Some("p2"));

        // Timer firing afterwards must not produce a second terminal event.
        assert!(room.expire().is_none());
    }

    #[test]
    fn timeout_picks_highest_alive_score() {
        let mut room = machine("r1");
        let mut question = first_question(&room.join("p1"));
        let _ = room.join("p2");

        // p1 answers three questions correctly: 30 points.
        for _ in 0..3 {
            let fx = room.submit("p1", &question.id, &question.answer, &mut surviving_rng());
            question = fx
                .to_player
                .iter()
                .find_map(|event| match event {
                    ServerEvent::Question(q) => Some(q.clone()),
                    _ => None,
                })
                .unwrap();
        }

        let over = match room.expire() {
            Some(ServerEvent::GameOver(over)) => over,
            other => panic!("expected game over, got {other:?}"),
        };
        assert_eq!(over.reason, GameOverReason::Timeout);
        assert_eq!(over.winner_id.as_deref(), Some("p1"));
        assert_eq!(room.status(), RoomStatus::Over);
    }

    #[test]
    fn timeout_tie_breaks_by_earliest_join() {
        let mut room = machine("r1");
        let _ = room.join("p1");
        let _ = room.join("p2");

        let over = match room.expire() {
            Some(ServerEvent::GameOver(over)) => over,
            other => panic!("expected game over, got {other:?}"),
        };
        assert_eq!(over.winner_id.as_deref(), Some("p1"));
    }

    #[test]
    fn over_room_is_terminal_and_idempotent() {
        let mut room = machine("r1");
        let question = first_question(&room.join("p1"));
        let _ = room.submit("p1", &question.id, "wrong", &mut lethal_rng());
        assert_eq!(room.status(), RoomStatus::Over);

        let fx = room.join("p2");
        assert!(!fx.round_started);
        assert!(fx.broadcast.is_empty());
        assert!(fx.to_player.iter().any(|event| matches!(
            event,
            ServerEvent::GameOver(GameOverEvent {
                reason: GameOverReason::Ended,
                ..
            })
        )));
        // Roster unchanged by the late join.
        assert_eq!(room.snapshot().players.len(), 1);

        let fx = room.submit("p1", &question.id, "chance", &mut surviving_rng());
        assert!(fx.to_player.iter().any(|event| matches!(
            event,
            ServerEvent::GameOver(GameOverEvent {
                reason: GameOverReason::Ended,
                ..
            })
        )));
        assert_eq!(room.snapshot().players[0].score, 0);
    }

    #[test]
    fn dead_player_submissions_are_ignored() {
        let mut room = machine("r1");
        let q1 = first_question(&room.join("p1"));
        let _ = room.join("p2");
        let _ = room.join("p3");
        let _ = room.submit("p1", &q1.id, "wrong", &mut lethal_rng());
        assert_eq!(room.status(), RoomStatus::Active);

        let fx = room.submit("p1", &q1.id, "chance", &mut surviving_rng());
        assert!(fx.to_player.is_empty());
        assert_eq!(room.snapshot().players[0].score, 0);
    }

    #[test]
    fn three_correct_answers_raise_difficulty_once() {
        let mut room = machine("r1");
        let mut question = first_question(&room.join("p1"));
        let mut notices = Vec::new();

        for _ in 0..3 {
            let fx = room.submit("p1", &question.id, &question.answer, &mut surviving_rng());
            for event in &fx.to_player {
                match event {
                    ServerEvent::Notice(notice) => notices.push(notice.message.clone()),
                    ServerEvent::Question(q) => question = q.clone(),
                    _ => {}
                }
            }
        }

        assert_eq!(notices, vec!["Difficulty increased to 2.".to_string()]);
    }

    #[test]
    fn scores_never_decrease_and_alive_is_one_way() {
        let mut room = machine("r1");
        let mut question = first_question(&room.join("p1"));
        let _ = room.join("p2");
        let mut last_score = 0;

        for attempt in 0..4 {
            let answer = if attempt % 2 == 0 { question.answer.clone() } else { "nope".into() };
            let fx = room.submit("p1", &question.id, &answer, &mut surviving_rng());
            for event in &fx.to_player {
                if let ServerEvent::Question(q) = event {
                    question = q.clone();
                }
            }
            let snapshot = room.snapshot();
            assert!(snapshot.players[0].score >= last_score);
            last_score = snapshot.players[0].score;
            assert!(snapshot.players[0].alive);
        }
    }

    #[test]
    fn reset_returns_room_to_waiting() {
        let mut room = machine("r1");
        let question = first_question(&room.join("p1"));
        let _ = room.submit("p1", &question.id, "wrong", &mut lethal_rng());
        assert_eq!(room.status(), RoomStatus::Over);

        room.reset(Some(60));
        assert_eq!(room.status(), RoomStatus::Waiting);
        assert_eq!(room.duration_secs(), 60);
        assert!(room.winner_id().is_none());
        assert!(room.snapshot().players.is_empty());
        assert_eq!(room.snapshot().time_left, 60);

        // The reset room can run a fresh round.
        let fx = room.join("p9");
        assert!(fx.round_started);
    }
}
