//! Settlement hand-off: pot query, payout, victory playback, and the
//! session summary, in that order.
//!
//! The on-chain pool is consumed through the [`Ledger`] capability; the
//! match outcome is never rolled back because of a settlement failure.

use std::error::Error;

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::warn;

use crate::client::playback::{VictoryOutcome, VictoryPlayback};
use crate::client::reconcile::{ArenaView, PlayerStatus};
use crate::dto::summary::{ScoreEntry, SummaryPayload};

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error raised by ledger backends regardless of the underlying chain.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger endpoint could not be reached.
    #[error("ledger unavailable: {message}")]
    Unavailable {
        /// Human-readable context for the failure.
        message: String,
        /// Underlying transport or provider error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The ledger refused the operation.
    #[error("ledger rejected operation: {0}")]
    Rejected(String),
}

impl LedgerError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        LedgerError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// Capability over the pooled-stake contract.
///
/// Injected by the caller with an explicit lifecycle; the core never holds
/// process-wide settlement state.
pub trait Ledger: Send + Sync {
    /// Add stake to the pool.
    fn deposit(&self, amount_eth: f64) -> BoxFuture<'static, LedgerResult<()>>;
    /// Pay the pool out to the winner's address.
    fn payout(&self, to_address: String, amount_eth: f64) -> BoxFuture<'static, LedgerResult<()>>;
    /// Current pooled stake.
    fn total_pot(&self) -> BoxFuture<'static, LedgerResult<f64>>;
    /// Balance of an address, for wallet display.
    fn balance_of(&self, address: String) -> BoxFuture<'static, LedgerResult<f64>>;
}

/// Connected-wallet state with an explicit connect/disconnect lifecycle.
#[derive(Debug, Clone, Default)]
pub struct WalletSession {
    address: Option<String>,
}

impl WalletSession {
    /// A session with no wallet connected.
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Bind the session to a wallet address.
    pub fn connect(&mut self, address: impl Into<String>) {
        self.address = Some(address.into());
    }

    /// Drop the wallet binding.
    pub fn disconnect(&mut self) {
        self.address = None;
    }

    /// Connected address, if any.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Whether a wallet is currently connected.
    pub fn is_connected(&self) -> bool {
        self.address.is_some()
    }
}

/// What the settlement hand-off produced.
#[derive(Debug)]
pub struct Settlement {
    /// Summary ready to be posted to the summary endpoint.
    pub summary: SummaryPayload,
    /// Amount string shown in the victory overlay.
    pub displayed_amount: String,
    /// Whether a payout call was issued.
    pub payout_attempted: bool,
    /// Whether the victory sequence ran to completion.
    pub victory_shown: bool,
}

/// Run the game-over hand-off for the local player.
///
/// Winners query the pot, pay out best-effort, and sit through the victory
/// sequence showing the queried amount — zero when the query failed, so the
/// flow always reaches the summary. Everyone else goes straight to an
/// eliminated summary.
pub async fn settle_game_over(
    view: &ArenaView,
    local_player_id: &str,
    wallet: &WalletSession,
    ledger: &dyn Ledger,
    victory: &VictoryPlayback,
) -> Settlement {
    let won = view.winner_id.as_deref() == Some(local_player_id);
    if !won {
        return Settlement {
            summary: session_summary(view, local_player_id),
            displayed_amount: format_eth(0.0),
            payout_attempted: false,
            victory_shown: false,
        };
    }

    let pot = match ledger.total_pot().await {
        Ok(pot) => pot,
        Err(err) => {
            warn!(error = %err, "pot query failed; displaying zero");
            0.0
        }
    };

    let mut payout_attempted = false;
    if let Some(address) = wallet.address() {
        if pot > 0.0 {
            payout_attempted = true;
            if let Err(err) = ledger.payout(address.to_string(), pot).await {
                warn!(error = %err, "payout failed; match outcome stands");
            }
        }
    }

    let displayed_amount = format_eth(pot);
    let outcome = victory.play(displayed_amount.clone()).await;

    Settlement {
        summary: session_summary(view, local_player_id),
        displayed_amount,
        payout_attempted,
        victory_shown: matches!(outcome, VictoryOutcome::Completed),
    }
}

/// Build the session summary from the final view.
pub fn session_summary(view: &ArenaView, local_player_id: &str) -> SummaryPayload {
    let eliminated = view.status == PlayerStatus::Eliminated;
    let duration = view.duration_seconds.unwrap_or(0);
    let survival_seconds = duration.saturating_sub(view.time_left.min(duration));

    // Fallback sessions never saw a roster; synthesize the local player.
    let players = if view.room_players.is_empty() {
        vec![crate::dto::ws::PlayerSummary {
            id: local_player_id.to_string(),
            score: view.score,
            alive: !eliminated,
        }]
    } else {
        view.room_players.clone()
    };

    let alive_count = players.iter().filter(|entry| entry.alive).count();
    let dead_count = players.len() - alive_count;

    let mut scores: Vec<ScoreEntry> = players
        .iter()
        .map(|entry| ScoreEntry {
            name: entry.id.clone(),
            score: entry.score,
            dead: !entry.alive,
        })
        .collect();
    scores.sort_by(|a, b| b.score.cmp(&a.score));

    SummaryPayload {
        player_id: local_player_id.to_string(),
        survival_seconds,
        alive_count,
        dead_count,
        scores,
    }
}

/// Render an ETH amount the way the overlay displays it.
fn format_eth(amount: f64) -> String {
    format!("{amount:.4} ETH")
}
