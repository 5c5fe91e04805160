//! Quiet-period debouncing of change signals.
//!
//! A burst of changes collapses into one settle signal, fired once no change
//! has arrived for the whole quiet period. Both the change and the settle
//! channels hold a single slot: extra signals merge into the pending one
//! instead of queueing.

use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{Instant, sleep_until};

/// State of a [`Debouncer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Pending { deadline: Instant },
}

/// Two-state debounce machine on the monotonic clock.
#[derive(Debug)]
pub struct Debouncer {
    state: DebounceState,
    quiet: Duration,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            state: DebounceState::Idle,
            quiet,
        }
    }

    /// Record a change at `now`. Starts the window, or restarts it from `now`
    /// when one is already running.
    pub fn record(&mut self, now: Instant) {
        self.state = DebounceState::Pending {
            deadline: now + self.quiet,
        };
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            DebounceState::Idle => None,
            DebounceState::Pending { deadline } => Some(deadline),
        }
    }

    /// Returns true exactly once per window, when `now` has reached the
    /// deadline, and goes back to idle.
    pub fn take_ready(&mut self, now: Instant) -> bool {
        match self.state {
            DebounceState::Pending { deadline } if now >= deadline => {
                self.state = DebounceState::Idle;
                true
            }
            _ => false,
        }
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, DebounceState::Pending { .. })
    }
}

/// Sending half for change notifications. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChangeSignal {
    tx: mpsc::Sender<()>,
}

impl ChangeSignal {
    /// Record that at least one change happened. Never blocks.
    pub fn notify(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => {
                crate::debug_event!("debounce", "dropped", "debouncer has stopped");
            }
        }
    }
}

/// Debounce task turning change signals into settle signals.
pub struct ChangeDebouncer {
    debouncer: Debouncer,
    changes: mpsc::Receiver<()>,
    settled: mpsc::Sender<()>,
}

impl ChangeDebouncer {
    /// Create the task, the change signal feeding it and the settle receiver.
    pub fn new(quiet: Duration) -> (Self, ChangeSignal, mpsc::Receiver<()>) {
        let (change_tx, change_rx) = mpsc::channel(1);
        let (settle_tx, settle_rx) = mpsc::channel(1);
        let task = Self {
            debouncer: Debouncer::new(quiet),
            changes: change_rx,
            settled: settle_tx,
        };
        (task, ChangeSignal { tx: change_tx }, settle_rx)
    }

    /// Run until every [`ChangeSignal`] is dropped (a pending window still
    /// fires first) or the settle receiver goes away.
    pub async fn run(mut self) {
        loop {
            let Some(deadline) = self.debouncer.deadline() else {
                match self.changes.recv().await {
                    Some(()) => self.debouncer.record(Instant::now()),
                    None => break,
                }
                continue;
            };

            tokio::select! {
                // A change racing the deadline wins and restarts the window.
                biased;

                change = self.changes.recv() => match change {
                    Some(()) => self.debouncer.record(Instant::now()),
                    None => {
                        sleep_until(deadline).await;
                        self.fire();
                        break;
                    }
                },

                _ = sleep_until(deadline) => {
                    if self.debouncer.take_ready(Instant::now()) && !self.fire() {
                        break;
                    }
                }
            }
        }
        crate::debug_event!("debounce", "stopped");
    }

    /// Returns false once nobody listens for settles anymore.
    fn fire(&self) -> bool {
        match self.settled.try_send(()) {
            Ok(()) => {
                crate::debug_event!("debounce", "settled");
                true
            }
            Err(TrySendError::Full(())) => {
                crate::debug_event!("debounce", "settled", "merged into queued settle");
                true
            }
            Err(TrySendError::Closed(())) => false,
        }
    }
}
