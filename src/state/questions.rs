//! The rotating question pool shared by every room.

use serde::{Deserialize, Serialize};

use crate::dto::ws::Question;

/// One entry of the configured question pool.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct QuestionCard {
    /// Stable identifier of the question.
    pub id: String,
    /// Prompt text shown to players.
    pub prompt: String,
    /// Canonical answer, compared trimmed and case-insensitively.
    pub answer: String,
}

impl QuestionCard {
    /// Whether `candidate` matches the canonical answer.
    pub fn accepts(&self, candidate: &str) -> bool {
        candidate.trim().to_lowercase() == self.answer.to_lowercase()
    }
}

impl From<&QuestionCard> for Question {
    fn from(card: &QuestionCard) -> Self {
        Self {
            id: card.id.clone(),
            prompt: card.prompt.clone(),
            answer: card.answer.clone(),
        }
    }
}

/// Cyclic pool of question cards, issued per player via a cursor.
///
/// The pool itself is immutable once built; each player tracks their own
/// cursor so question sequences are independent across the roster.
#[derive(Debug, Clone)]
pub struct QuestionPool {
    cards: Vec<QuestionCard>,
}

impl QuestionPool {
    /// Build a pool from configured cards.
    ///
    /// An empty card list falls back to a single placeholder so rooms can
    /// always issue something; configuration loading warns before this
    /// situation can arise.
    pub fn new(cards: Vec<QuestionCard>) -> Self {
        let cards = if cards.is_empty() {
            vec![QuestionCard {
                id: "q0".into(),
                prompt: "spell: arena".into(),
                answer: "arena".into(),
            }]
        } else {
            cards
        };
        Self { cards }
    }

    /// Number of cards in the pool.
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Whether the pool holds no cards. Never true after construction.
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Issue the question at `cursor`, skipping an immediate repeat of
    /// `last_id` when the pool is large enough to offer an alternative.
    ///
    /// Returns the issued card together with the player's next cursor.
    pub fn issue(&self, cursor: usize, last_id: Option<&str>) -> (&QuestionCard, usize) {
        let len = self.cards.len();
        let mut index = cursor % len;
        if len > 1 {
            if let Some(last) = last_id {
                if self.cards[index].id == last {
                    index = (index + 1) % len;
                }
            }
        }
        (&self.cards[index], index + 1)
    }
}
