//! Client-side reconciliation: one consistent view model regardless of
//! connection state.
//!
//! The engine is the sole writer of the view. Inbound authoritative events
//! are applied strictly in arrival order; when no connection was ever
//! established the same application path consumes events synthesized by the
//! [`LocalFallbackSimulator`].

use std::collections::VecDeque;

use rand::Rng;

use crate::client::{clock, clock::ClockSync, fallback::LocalFallbackSimulator};
use crate::dto::ws::{
    ClientEvent, GameOverReason, PlayerSummary, Question, ServerEvent, SubmitPayload,
    TriggerOutcome,
};
use crate::state::questions::QuestionCard;

/// Notices kept in the view: a most-recent-3 ring.
const NOTICE_CAPACITY: usize = 3;
/// Remaining time shown before any snapshot arrived.
const DEFAULT_TIME_LEFT: u64 = 180;

/// Where game-rule authority currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// No authoritative event seen yet; a connection may still open.
    Pending,
    /// Server events drive the view. Sticky: a later socket close only
    /// clears the `connected` flag, never the authority.
    Authoritative,
    /// The connection never opened; the local simulator drives the view.
    Fallback,
}

/// The local player's life state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    /// Still in the round.
    Alive,
    /// Eliminated by a lethal trigger.
    Eliminated,
}

/// Last trigger resolution, tagged with a sequence number so repeated
/// identical outcomes are still detected as new.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerView {
    /// Monotonically increasing per-engine sequence number.
    pub seq: u64,
    /// Whether the player survived.
    pub outcome: TriggerOutcome,
    /// Flavor text for the overlay.
    pub message: String,
}

/// Stable view model exposed to the UI layer.
#[derive(Debug, Clone)]
pub struct ArenaView {
    /// Question currently in front of the player.
    pub question: Question,
    /// The player's cumulative score.
    pub score: u32,
    /// The player's life state.
    pub status: PlayerStatus,
    /// Roster as last reported, in join order.
    pub room_players: Vec<PlayerSummary>,
    /// Alive roster entries.
    pub alive_count: usize,
    /// Eliminated roster entries.
    pub dead_count: usize,
    /// Seconds remaining, recomputed from the clock offset.
    pub time_left: u64,
    /// Round length, once known.
    pub duration_seconds: Option<u64>,
    /// Whether the room reached its terminal state.
    pub game_over: bool,
    /// Winner at game over.
    pub winner_id: Option<String>,
    /// Why the room ended.
    pub game_over_reason: Option<GameOverReason>,
    /// Most recent notices, oldest first.
    pub notices: Vec<String>,
    /// Last trigger, if any fired this session.
    pub trigger: Option<TriggerView>,
    /// Socket state, for UI only; never affects game-rule authority.
    pub connected: bool,
    /// Where authority currently lives.
    pub mode: SyncMode,
}

/// What the caller should do with a submission.
#[derive(Debug, Clone)]
pub enum SubmitAction {
    /// Send this frame over the live connection.
    Send(ClientEvent),
    /// Handled locally by the fallback simulator; the view is updated.
    Simulated,
}

/// Single entry point merging server pushes with the local fallback.
#[derive(Debug)]
pub struct ReconciliationEngine {
    player_id: String,
    mode: SyncMode,
    connected: bool,
    question: Question,
    score: u32,
    status: PlayerStatus,
    trigger: Option<TriggerView>,
    trigger_seq: u64,
    room_players: Vec<PlayerSummary>,
    alive_count: usize,
    dead_count: usize,
    clock: ClockSync,
    duration_seconds: Option<u64>,
    started_at_ms: Option<u64>,
    last_time_left: u64,
    game_over: bool,
    winner_id: Option<String>,
    game_over_reason: Option<GameOverReason>,
    notices: VecDeque<String>,
    fallback: LocalFallbackSimulator,
}

impl ReconciliationEngine {
    /// New engine in pending mode, showing the pool's first question.
    pub fn new(player_id: impl Into<String>, cards: Vec<QuestionCard>) -> Self {
        let fallback = LocalFallbackSimulator::new(cards);
        let question = fallback.current_question();
        Self {
            player_id: player_id.into(),
            mode: SyncMode::Pending,
            connected: false,
            question,
            score: 0,
            status: PlayerStatus::Alive,
            trigger: None,
            trigger_seq: 0,
            room_players: Vec::new(),
            alive_count: 0,
            dead_count: 0,
            clock: ClockSync::new(),
            duration_seconds: None,
            started_at_ms: None,
            last_time_left: DEFAULT_TIME_LEFT,
            game_over: false,
            winner_id: None,
            game_over_reason: None,
            notices: VecDeque::new(),
            fallback,
        }
    }

    /// Identifier of the local player.
    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    /// Current authority mode.
    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// The socket opened; returns the join frame to send.
    pub fn connection_opened(&mut self) -> ClientEvent {
        self.connected = true;
        ClientEvent::Join(crate::dto::ws::JoinPayload {
            player_id: self.player_id.clone(),
        })
    }

    /// The socket closed or never opened. Authority already reached is
    /// sticky; a pending engine degrades to fallback.
    pub fn connection_closed(&mut self) {
        self.connected = false;
        if self.mode == SyncMode::Pending {
            self.mode = SyncMode::Fallback;
        }
    }

    /// Apply one authoritative event, in arrival order.
    ///
    /// The first applied event is the join acknowledgment that promotes the
    /// engine to authoritative mode; local guesses are overwritten by the
    /// server's values as they arrive.
    pub fn apply(&mut self, event: ServerEvent, local_now_ms: u64) {
        self.mode = SyncMode::Authoritative;
        self.apply_event(event, local_now_ms);
    }

    /// Route a submission to the wire or the local simulator.
    pub fn submit(&mut self, answer: &str, rng: &mut impl Rng, local_now_ms: u64) -> SubmitAction {
        if self.connected || self.mode == SyncMode::Authoritative {
            return SubmitAction::Send(ClientEvent::Submit(SubmitPayload {
                answer: answer.to_string(),
                question_id: self.question.id.clone(),
            }));
        }

        if self.mode == SyncMode::Pending {
            self.mode = SyncMode::Fallback;
        }
        let events = self.fallback.submit(answer, rng);
        for event in events {
            self.apply_event(event, local_now_ms);
        }
        SubmitAction::Simulated
    }

    /// Build the current view, recomputing remaining time from the offset.
    pub fn view(&self, local_now_ms: u64) -> ArenaView {
        let time_left = match (self.duration_seconds, self.started_at_ms) {
            (Some(duration), Some(started_at)) => {
                clock::time_left(duration, started_at, self.clock.offset_ms(), local_now_ms)
            }
            _ => self.last_time_left,
        };

        ArenaView {
            question: self.question.clone(),
            score: self.score,
            status: self.status,
            room_players: self.room_players.clone(),
            alive_count: self.alive_count,
            dead_count: self.dead_count,
            time_left,
            duration_seconds: self.duration_seconds,
            game_over: self.game_over,
            winner_id: self.winner_id.clone(),
            game_over_reason: self.game_over_reason,
            notices: self.notices.iter().cloned().collect(),
            trigger: self.trigger.clone(),
            connected: self.connected,
            mode: self.mode,
        }
    }

    /// Shared application path for authoritative and simulated events.
    fn apply_event(&mut self, event: ServerEvent, local_now_ms: u64) {
        match event {
            ServerEvent::Question(question) => {
                self.question = question;
            }
            ServerEvent::Result(result) => {
                self.score = result.total_score;
            }
            ServerEvent::Trigger(trigger) => {
                self.trigger_seq += 1;
                if trigger.outcome == TriggerOutcome::Dead {
                    self.status = PlayerStatus::Eliminated;
                }
                self.trigger = Some(TriggerView {
                    seq: self.trigger_seq,
                    outcome: trigger.outcome,
                    message: trigger.message,
                });
            }
            ServerEvent::Notice(notice) => {
                self.push_notice(notice.message);
            }
            ServerEvent::Room(snapshot) => {
                self.apply_snapshot(snapshot, local_now_ms);
            }
            ServerEvent::GameOver(over) => {
                self.winner_id = over.winner_id;
                self.game_over_reason = Some(over.reason);
                self.game_over = true;
                self.apply_snapshot(over.room, local_now_ms);
            }
        }
    }

    fn apply_snapshot(&mut self, snapshot: crate::dto::ws::RoomSnapshot, local_now_ms: u64) {
        self.clock.observe(snapshot.server_now_ms, local_now_ms);
        self.room_players = snapshot.players;
        self.alive_count = snapshot.alive_count;
        self.dead_count = snapshot.dead_count;
        self.duration_seconds = Some(snapshot.duration_seconds);
        self.started_at_ms = snapshot.started_at_ms;
        self.last_time_left = snapshot.time_left;
    }

    /// Append to the most-recent-3 ring. Duplicates are allowed.
    fn push_notice(&mut self, message: String) {
        if self.notices.len() == NOTICE_CAPACITY {
            self.notices.pop_front();
        }
        self.notices.push_back(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::dto::ws::{
        AnswerResult, GameOverEvent, Notice, RoomSnapshot, TriggerEvent,
    };
    use rand::RngCore;

    /// Rng that always yields the same word, pinning the trigger outcome.
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

    fn engine() -> ReconciliationEngine {
        ReconciliationEngine::new("p1", AppConfig::default().questions())
    }

    fn snapshot(time_left: u64, server_now_ms: u64) -> RoomSnapshot {
        RoomSnapshot {
            room_id: "arena".into(),
            players: vec![PlayerSummary {
                id: "p1".into(),
                score: 0,
                alive: true,
            }],
            alive_count: 1,
            dead_count: 0,
            time_left,
            duration_seconds: 180,
            server_now_ms,
            started_at_ms: Some(server_now_ms),
        }
    }

    #[test]
    fn starts_pending_with_pool_question() {
        let engine = engine();
        assert_eq!(engine.mode(), SyncMode::Pending);
        let view = engine.view(0);
        assert_eq!(view.question.id, "q1");
        assert_eq!(view.time_left, 180);
        assert_eq!(view.status, PlayerStatus::Alive);
    }

    #[test]
    fn first_server_event_promotes_to_authoritative() {
        let mut engine = engine();
        let _ = engine.connection_opened();
        engine.apply(ServerEvent::Room(snapshot(180, 1_000)), 1_000);
        assert_eq!(engine.mode(), SyncMode::Authoritative);
    }

    #[test]
    fn authority_is_sticky_across_socket_close() {
        let mut engine = engine();
        let _ = engine.connection_opened();
        engine.apply(ServerEvent::Room(snapshot(180, 1_000)), 1_000);
        engine.connection_closed();

        assert_eq!(engine.mode(), SyncMode::Authoritative);
        let view = engine.view(2_000);
        assert!(!view.connected);

        // Submissions still target the wire, never the local simulator.
        let action = engine.submit("chance", &mut ConstRng(0), 2_000);
        assert!(matches!(action, SubmitAction::Send(ClientEvent::Submit(_))));
    }

    #[test]
    fn never_connected_engine_falls_back_and_simulates() {
        let mut engine = engine();
        engine.connection_closed();
        assert_eq!(engine.mode(), SyncMode::Fallback);

        let action = engine.submit("chance", &mut ConstRng(0), 0);
        assert!(matches!(action, SubmitAction::Simulated));
        let view = engine.view(0);
        assert_eq!(view.score, 10);
        assert_eq!(view.question.id, "q2");
    }

    #[test]
    fn fallback_lethal_trigger_eliminates_locally() {
        let mut engine = engine();
        engine.connection_closed();
        let _ = engine.submit("wrong", &mut ConstRng(u64::MAX), 0);

        let view = engine.view(0);
        assert_eq!(view.status, PlayerStatus::Eliminated);
        let trigger = view.trigger.expect("trigger must be visible");
        assert_eq!(trigger.outcome, TriggerOutcome::Dead);
        assert_eq!(trigger.seq, 1);
    }

    #[test]
    fn repeated_identical_triggers_get_fresh_sequence_numbers() {
        let mut engine = engine();
        let trigger = TriggerEvent {
            outcome: TriggerOutcome::Alive,
            message: "LUCKY! You survived.".into(),
        };
        engine.apply(ServerEvent::Trigger(trigger.clone()), 0);
        let first = engine.view(0).trigger.unwrap().seq;
        engine.apply(ServerEvent::Trigger(trigger), 0);
        let second = engine.view(0).trigger.unwrap().seq;
        assert!(second > first);
    }

    #[test]
    fn notices_keep_only_most_recent_three() {
        let mut engine = engine();
        for n in 1..=5 {
            engine.apply(
                ServerEvent::Notice(Notice {
                    message: format!("notice {n}"),
                }),
                0,
            );
        }
        assert_eq!(
            engine.view(0).notices,
            vec!["notice 3", "notice 4", "notice 5"]
        );
    }

    #[test]
    fn result_events_drive_the_score_verbatim() {
        let mut engine = engine();
        engine.apply(
            ServerEvent::Result(AnswerResult {
                correct: true,
                score_delta: 10,
                total_score: 40,
            }),
            0,
        );
        assert_eq!(engine.view(0).score, 40);
    }

    #[test]
    fn snapshot_feeds_the_clock_and_time_left_decreases() {
        let mut engine = engine();
        // Server is 500ms ahead of the local clock.
        engine.apply(ServerEvent::Room(snapshot(180, 10_500)), 10_000);

        let early = engine.view(10_000).time_left;
        let later = engine.view(70_000).time_left;
        assert_eq!(early, 180);
        assert_eq!(later, 120);
    }

    #[test]
    fn game_over_sets_terminal_fields() {
        let mut engine = engine();
        engine.apply(
            ServerEvent::GameOver(GameOverEvent {
                winner_id: Some("p2".into()),
                reason: GameOverReason::Timeout,
                room: snapshot(0, 200_000),
            }),
            200_000,
        );
        let view = engine.view(200_000);
        assert!(view.game_over);
        assert_eq!(view.winner_id.as_deref(), Some("p2"));
        assert_eq!(view.game_over_reason, Some(GameOverReason::Timeout));
    }
}
