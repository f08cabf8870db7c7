//! Deterministic stand-in for the authoritative room, used when no
//! connection was ever established.
//!
//! The simulator produces the same shape of events as the server (`result`,
//! optional `notice`/`trigger`, question advance) so the reconciliation
//! engine and playback controller have a single contract to satisfy.

use rand::Rng;

use crate::dto::ws::{AnswerResult, Notice, Question, ServerEvent, TriggerEvent, TriggerOutcome};
use crate::state::questions::{QuestionCard, QuestionPool};

/// Survival odds of the offline trigger. The authoritative weight is server
/// configuration; the offline path always uses a plain coin flip.
pub const FALLBACK_SURVIVAL_PROBABILITY: f64 = 0.5;

/// Points awarded for a correct answer, mirroring the room rules.
const CORRECT_SCORE_DELTA: u32 = 10;
/// Streak length that raises the local difficulty.
const STREAK_FOR_DIFFICULTY: u32 = 3;
/// Difficulty ceiling.
const MAX_DIFFICULTY: u8 = 5;

/// Local simulation of the room rules for a single offline player.
#[derive(Debug)]
pub struct LocalFallbackSimulator {
    pool: QuestionPool,
    cursor: usize,
    current: QuestionCard,
    score: u32,
    streak: u32,
    difficulty: u8,
}

impl LocalFallbackSimulator {
    /// Build a simulator over the given rotating pool.
    pub fn new(cards: Vec<QuestionCard>) -> Self {
        let pool = QuestionPool::new(cards);
        let (card, cursor) = pool.issue(0, None);
        let current = card.clone();
        Self {
            pool,
            cursor,
            current,
            score: 0,
            streak: 0,
            difficulty: 1,
        }
    }

    /// The question currently in front of the player.
    pub fn current_question(&self) -> Question {
        Question::from(&self.current)
    }

    /// Local score mirror.
    pub fn score(&self) -> u32 {
        self.score
    }

    /// Current local difficulty level.
    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }

    /// Score a submission, returning the same event sequence the server
    /// would produce. The question always advances, even past a lethal
    /// trigger, so the offline loop never stalls.
    pub fn submit(&mut self, answer: &str, rng: &mut impl Rng) -> Vec<ServerEvent> {
        let mut events = Vec::new();

        if self.current.accepts(answer) {
            self.score += CORRECT_SCORE_DELTA;
            self.streak += 1;
            events.push(ServerEvent::Result(AnswerResult {
                correct: true,
                score_delta: CORRECT_SCORE_DELTA,
                total_score: self.score,
            }));
            if self.streak >= STREAK_FOR_DIFFICULTY {
                if self.difficulty < MAX_DIFFICULTY {
                    self.difficulty += 1;
                    events.push(ServerEvent::Notice(Notice {
                        message: format!("Difficulty increased to {}.", self.difficulty),
                    }));
                }
                self.streak = 0;
            }
        } else {
            self.streak = 0;
            events.push(ServerEvent::Result(AnswerResult {
                correct: false,
                score_delta: 0,
                total_score: self.score,
            }));
            let survived = rng.random::<f64>() < FALLBACK_SURVIVAL_PROBABILITY;
            events.push(ServerEvent::Trigger(TriggerEvent {
                outcome: if survived {
                    TriggerOutcome::Alive
                } else {
                    TriggerOutcome::Dead
                },
                message: if survived {
                    "LUCKY! You survived.".into()
                } else {
                    "YOU DIED.".into()
                },
            }));
        }

        let (card, next_cursor) = self.pool.issue(self.cursor, Some(&self.current.id));
        self.current = card.clone();
        self.cursor = next_cursor;
        events.push(ServerEvent::Question(self.current_question()));

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
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

    fn simulator() -> LocalFallbackSimulator {
        LocalFallbackSimulator::new(AppConfig::default().questions())
    }

    #[test]
    fn correct_answer_mirrors_server_scoring() {
        let mut sim = simulator();
        assert_eq!(sim.current_question().id, "q1");

        let events = sim.submit("chance", &mut ConstRng(0));
        match &events[0] {
            ServerEvent::Result(result) => {
                assert!(result.correct);
                assert_eq!(result.total_score, 10);
            }
            other => panic!("expected result, got {other:?}"),
        }
        match events.last() {
            Some(ServerEvent::Question(question)) => assert_eq!(question.id, "q2"),
            other => panic!("expected question advance, got {other:?}"),
        }
    }

    #[test]
    fn wrong_answer_with_lethal_roll_emits_dead_trigger_and_still_advances() {
        let mut sim = simulator();
        let events = sim.submit("nope", &mut ConstRng(u64::MAX));

        assert!(matches!(
            events[0],
            ServerEvent::Result(AnswerResult { correct: false, .. })
        ));
        assert!(events.iter().any(|event| matches!(
            event,
            ServerEvent::Trigger(TriggerEvent {
                outcome: TriggerOutcome::Dead,
                ..
            })
        )));
        assert!(matches!(events.last(), Some(ServerEvent::Question(_))));
    }

    #[test]
    fn wrong_answer_with_lucky_roll_survives() {
        let mut sim = simulator();
        let events = sim.submit("nope", &mut ConstRng(0));
        assert!(events.iter().any(|event| matches!(
            event,
            ServerEvent::Trigger(TriggerEvent {
                outcome: TriggerOutcome::Alive,
                ..
            })
        )));
    }

    #[test]
    fn third_straight_correct_raises_difficulty() {
        let mut sim = simulator();
        let mut notices = Vec::new();
        for _ in 0..3 {
            let answer = sim.current_question().answer;
            for event in sim.submit(&answer, &mut ConstRng(0)) {
                if let ServerEvent::Notice(notice) = event {
                    notices.push(notice.message);
                }
            }
        }
        assert_eq!(notices, vec!["Difficulty increased to 2.".to_string()]);
        assert_eq!(sim.difficulty(), 2);
    }

    #[test]
    fn pool_rotates_without_immediate_repeat() {
        let mut sim = simulator();
        let mut seen = vec![sim.current_question().id];
        for _ in 0..5 {
            let answer = sim.current_question().answer;
            let _ = sim.submit(&answer, &mut ConstRng(0));
            let id = sim.current_question().id;
            assert_ne!(&id, seen.last().unwrap(), "question repeated back-to-back");
            seen.push(id);
        }
    }
}
