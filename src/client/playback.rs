//! Elimination and victory feedback sequencers.
//!
//! Each controller is an explicit finite-state machine with an atomic
//! "is running" guard: `play` while a sequence is active is a no-op, phases
//! advance on timers, elimination blocks on a rate-limited acknowledgment,
//! and tearing the controller down abandons every pending transition without
//! completing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::{Instant, sleep};
use tracing::debug;

/// Phase durations of the elimination sequence.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackTimings {
    /// Overlay entry animation.
    pub enter: Duration,
    /// Barrel sway before the shot.
    pub sway: Duration,
    /// Recoil and screen shake.
    pub fire: Duration,
    /// How long the fire frame stays swapped in.
    pub fire_frame_hold: Duration,
    /// Beat between the shot and the result.
    pub result_pause: Duration,
    /// How long the struck visual holds before accepting input.
    pub crack_hold: Duration,
    /// Minimum delay before an acknowledgment is accepted.
    pub ack_min_delay: Duration,
    /// Overlay exit animation.
    pub exit: Duration,
}

impl Default for PlaybackTimings {
    fn default() -> Self {
        Self {
            enter: Duration::from_millis(450),
            sway: Duration::from_millis(180),
            fire: Duration::from_millis(160),
            fire_frame_hold: Duration::from_millis(90),
            result_pause: Duration::from_millis(120),
            crack_hold: Duration::from_millis(650),
            ack_min_delay: Duration::from_millis(400),
            exit: Duration::from_millis(250),
        }
    }
}

/// Phases of the elimination sequence, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    /// No sequence running.
    Idle,
    /// Overlay and visual entering.
    Entering,
    /// Barrel sway.
    Swaying,
    /// Shot frame, recoil, shake.
    Firing,
    /// Post-shot beat; survivors skip from here to exit.
    ResultHold,
    /// Struck visual held until the player acknowledges.
    AwaitingAck,
    /// Reverse entry animation.
    Exiting,
}

/// How a `play` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// The sequence ran to completion; carries the original argument.
    Completed {
        /// The `eliminated` value the sequence was started with.
        eliminated: bool,
    },
    /// A sequence was already active; nothing happened.
    AlreadyActive,
    /// The surrounding view was torn down mid-sequence.
    Abandoned,
}

/// Cloneable input handle delivering acknowledgments to a controller.
#[derive(Clone)]
pub struct AckHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl AckHandle {
    /// Deliver one acknowledgment input. Ignored outside `AwaitingAck` and
    /// inside the rate-limit window.
    pub fn acknowledge(&self) {
        let _ = self.tx.send(());
    }
}

struct Aborted;

/// Sequencer for the elimination overlay.
pub struct EliminationPlayback {
    timings: PlaybackTimings,
    active: AtomicBool,
    phase_tx: watch::Sender<PlaybackPhase>,
    ack_tx: mpsc::UnboundedSender<()>,
    ack_rx: Mutex<mpsc::UnboundedReceiver<()>>,
    teardown_tx: watch::Sender<bool>,
}

impl EliminationPlayback {
    /// New idle controller with the given timings.
    pub fn new(timings: PlaybackTimings) -> Self {
        let (phase_tx, _) = watch::channel(PlaybackPhase::Idle);
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        let (teardown_tx, _) = watch::channel(false);
        Self {
            timings,
            active: AtomicBool::new(false),
            phase_tx,
            ack_tx,
            ack_rx: Mutex::new(ack_rx),
            teardown_tx,
        }
    }

    /// Handle the UI uses to deliver acknowledgment clicks.
    pub fn acknowledger(&self) -> AckHandle {
        AckHandle {
            tx: self.ack_tx.clone(),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> PlaybackPhase {
        *self.phase_tx.borrow()
    }

    /// Observe phase changes, e.g. to drive the overlay rendering.
    pub fn watch_phase(&self) -> watch::Receiver<PlaybackPhase> {
        self.phase_tx.subscribe()
    }

    /// Abandon any running sequence; the pending `play` future resolves to
    /// [`PlayOutcome::Abandoned`] without completing.
    pub fn teardown(&self) {
        self.teardown_tx.send_replace(true);
    }

    /// Run the sequence once. Re-entrant calls while a sequence is active
    /// return [`PlayOutcome::AlreadyActive`] immediately, without queueing.
    pub async fn play(&self, eliminated: bool) -> PlayOutcome {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("elimination playback already active; dropping play request");
            return PlayOutcome::AlreadyActive;
        }

        let outcome = self.run(eliminated).await;
        self.phase_tx.send_replace(PlaybackPhase::Idle);
        self.active.store(false, Ordering::Release);
        outcome
    }

    async fn run(&self, eliminated: bool) -> PlayOutcome {
        let mut teardown = self.teardown_tx.subscribe();
        if *teardown.borrow_and_update() {
            return PlayOutcome::Abandoned;
        }

        let t = self.timings;
        let steps = [
            (PlaybackPhase::Entering, t.enter),
            (PlaybackPhase::Swaying, t.sway),
            (PlaybackPhase::Firing, t.fire + t.fire_frame_hold),
            (PlaybackPhase::ResultHold, t.result_pause),
        ];
        for (phase, duration) in steps {
            if self.hold(phase, duration, &mut teardown).await.is_err() {
                return PlayOutcome::Abandoned;
            }
        }

        if eliminated {
            if self
                .hold(PlaybackPhase::ResultHold, t.crack_hold, &mut teardown)
                .await
                .is_err()
            {
                return PlayOutcome::Abandoned;
            }
            if self.await_acknowledgment(&mut teardown).await.is_err() {
                return PlayOutcome::Abandoned;
            }
        }

        if self
            .hold(PlaybackPhase::Exiting, t.exit, &mut teardown)
            .await
            .is_err()
        {
            return PlayOutcome::Abandoned;
        }

        PlayOutcome::Completed { eliminated }
    }

    /// Enter a phase and hold it for `duration`, unless torn down.
    async fn hold(
        &self,
        phase: PlaybackPhase,
        duration: Duration,
        teardown: &mut watch::Receiver<bool>,
    ) -> Result<(), Aborted> {
        self.phase_tx.send_replace(phase);
        tokio::select! {
            _ = torn_down(teardown) => Err(Aborted),
            _ = sleep(duration) => Ok(()),
        }
    }

    /// Block until an acknowledgment arrives after the rate-limit window.
    ///
    /// Acknowledgments queued before this phase, or delivered inside the
    /// window, are discarded: the input that caused the elimination must not
    /// also dismiss its own feedback.
    async fn await_acknowledgment(
        &self,
        teardown: &mut watch::Receiver<bool>,
    ) -> Result<(), Aborted> {
        self.phase_tx.send_replace(PlaybackPhase::AwaitingAck);

        let mut ack_rx = self.ack_rx.lock().await;
        while ack_rx.try_recv().is_ok() {}

        let armed_at = Instant::now() + self.timings.ack_min_delay;
        loop {
            tokio::select! {
                _ = torn_down(teardown) => return Err(Aborted),
                received = ack_rx.recv() => {
                    if received.is_none() {
                        return Err(Aborted);
                    }
                    if Instant::now() >= armed_at {
                        return Ok(());
                    }
                    debug!("acknowledgment before rate-limit window; ignoring");
                }
            }
        }
    }
}

impl Default for EliminationPlayback {
    fn default() -> Self {
        Self::new(PlaybackTimings::default())
    }
}

/// Phase durations of the victory sequence.
#[derive(Debug, Clone, Copy)]
pub struct VictoryTimings {
    /// Trophy entry animation.
    pub enter: Duration,
    /// Overlay exit animation.
    pub exit: Duration,
}

impl Default for VictoryTimings {
    fn default() -> Self {
        Self {
            enter: Duration::from_millis(450),
            exit: Duration::from_millis(250),
        }
    }
}

/// Phases of the victory sequence, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VictoryPhase {
    /// No sequence running.
    Idle,
    /// Trophy entering.
    Entering,
    /// Holding until the player acknowledges; no rate limit here.
    AwaitingAck,
    /// Reverse entry animation.
    Exiting,
}

/// How a victory `play` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VictoryOutcome {
    /// The sequence ran to completion.
    Completed,
    /// A sequence was already active; nothing happened.
    AlreadyActive,
    /// The surrounding view was torn down mid-sequence.
    Abandoned,
}

/// Sequencer for the victory overlay, showing the settled pot amount.
pub struct VictoryPlayback {
    timings: VictoryTimings,
    active: AtomicBool,
    phase_tx: watch::Sender<VictoryPhase>,
    amount_tx: watch::Sender<String>,
    ack_tx: mpsc::UnboundedSender<()>,
    ack_rx: Mutex<mpsc::UnboundedReceiver<()>>,
    teardown_tx: watch::Sender<bool>,
}

impl VictoryPlayback {
    /// New idle controller with the given timings.
    pub fn new(timings: VictoryTimings) -> Self {
        let (phase_tx, _) = watch::channel(VictoryPhase::Idle);
        let (amount_tx, _) = watch::channel(String::new());
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        let (teardown_tx, _) = watch::channel(false);
        Self {
            timings,
            active: AtomicBool::new(false),
            phase_tx,
            amount_tx,
            ack_tx,
            ack_rx: Mutex::new(ack_rx),
            teardown_tx,
        }
    }

    /// Handle the UI uses to deliver acknowledgment clicks.
    pub fn acknowledger(&self) -> AckHandle {
        AckHandle {
            tx: self.ack_tx.clone(),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> VictoryPhase {
        *self.phase_tx.borrow()
    }

    /// Observe phase changes.
    pub fn watch_phase(&self) -> watch::Receiver<VictoryPhase> {
        self.phase_tx.subscribe()
    }

    /// Amount string currently displayed by the overlay.
    pub fn amount(&self) -> String {
        self.amount_tx.borrow().clone()
    }

    /// Abandon any running sequence without completing it.
    pub fn teardown(&self) {
        self.teardown_tx.send_replace(true);
    }

    /// Run the victory sequence once, displaying `amount`.
    pub async fn play(&self, amount: impl Into<String>) -> VictoryOutcome {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("victory playback already active; dropping play request");
            return VictoryOutcome::AlreadyActive;
        }

        self.amount_tx.send_replace(amount.into());
        let outcome = self.run().await;
        self.phase_tx.send_replace(VictoryPhase::Idle);
        self.active.store(false, Ordering::Release);
        outcome
    }

    async fn run(&self) -> VictoryOutcome {
        let mut teardown = self.teardown_tx.subscribe();
        if *teardown.borrow_and_update() {
            return VictoryOutcome::Abandoned;
        }

        self.phase_tx.send_replace(VictoryPhase::Entering);
        tokio::select! {
            _ = torn_down(&mut teardown) => return VictoryOutcome::Abandoned,
            _ = sleep(self.timings.enter) => {}
        }

        self.phase_tx.send_replace(VictoryPhase::AwaitingAck);
        {
            let mut ack_rx = self.ack_rx.lock().await;
            while ack_rx.try_recv().is_ok() {}
            tokio::select! {
                _ = torn_down(&mut teardown) => return VictoryOutcome::Abandoned,
                received = ack_rx.recv() => {
                    if received.is_none() {
                        return VictoryOutcome::Abandoned;
                    }
                }
            }
        }

        self.phase_tx.send_replace(VictoryPhase::Exiting);
        tokio::select! {
            _ = torn_down(&mut teardown) => return VictoryOutcome::Abandoned,
            _ = sleep(self.timings.exit) => {}
        }

        VictoryOutcome::Completed
    }
}

impl Default for VictoryPlayback {
    fn default() -> Self {
        Self::new(VictoryTimings::default())
    }
}

/// Resolve once the teardown flag flips to true.
async fn torn_down(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender lives inside the controller; if it is gone the sequence
            // can never be torn down externally.
            std::future::pending::<()>().await;
        }
    }
}
