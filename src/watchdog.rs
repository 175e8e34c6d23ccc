//! # Watchdog: bounded auto-restart after unexpected exits.
//!
//! The watchdog subscribes to the event bus and reacts to two things:
//! non-graceful [`EventKind::Exited`] / failed [`EventKind::Launching`]
//! events (a crash), and [`EventKind::Started`] (the stability pattern).
//!
//! ## State machine
//! ```text
//! STABLE ──(unexpected exit)──► RETRYING ──(restart ok, banner seen)──► STABLE
//!                                   │
//!                                   └─(failures > limit)──► LIMIT_REACHED (terminal)
//! ```
//!
//! - Every crash increments a consecutive-failure counter; the stability
//!   pattern resets it to zero.
//! - While the counter is at or below the limit, the watchdog waits out a
//!   backoff delay and restarts the process, publishing
//!   [`EventKind::WatchdogRetry`] with the attempt number.
//! - Past the limit it publishes [`EventKind::WatchdogLimitReached`] exactly
//!   once and stops; the host application decides what to do (warden's
//!   binary exits non-zero so an outer supervisor can intervene).
//!
//! Restarts are best-effort: a restart attempt that itself fails to launch
//! publishes a failed `Launching` event, which the watchdog counts like any
//! other crash — no special-cased double counting.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::SupervisorError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::BackoffPolicy;
use crate::process::ProcessSupervisor;

/// The one thing a watchdog needs from its target: bring it back up.
///
/// [`ProcessSupervisor`] is the production implementation; tests substitute
/// a counter.
#[async_trait]
pub trait Restart: Send + Sync {
    /// Attempts one relaunch of the supervised process.
    async fn restart(&self) -> Result<(), SupervisorError>;
}

#[async_trait]
impl Restart for ProcessSupervisor {
    async fn restart(&self) -> Result<(), SupervisorError> {
        self.start().await
    }
}

/// Outcome of recording one crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Attempt another restart; carries the 1-based consecutive failure count.
    Retry {
        /// Consecutive failures so far, including this one.
        attempt: u32,
    },
    /// The limit is exceeded; stop restarting.
    LimitReached,
}

/// Consecutive-failure counter compared against a fixed retry limit.
///
/// Plain state with no I/O, so the retry arithmetic is testable without a
/// process to crash.
#[derive(Debug, Clone)]
pub struct RetryState {
    failures: u32,
    limit: u32,
}

impl RetryState {
    /// Creates a counter that tolerates `limit` consecutive failures.
    pub fn new(limit: u32) -> Self {
        Self { failures: 0, limit }
    }

    /// Records one unexpected exit and decides whether to retry.
    pub fn record_crash(&mut self) -> Verdict {
        self.failures = self.failures.saturating_add(1);
        if self.failures <= self.limit {
            Verdict::Retry {
                attempt: self.failures,
            }
        } else {
            Verdict::LimitReached
        }
    }

    /// Resets the counter; called when the stability pattern matches.
    pub fn record_stable(&mut self) {
        self.failures = 0;
    }

    /// Current consecutive failure count.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Restarts the supervised process after unexpected exits, up to a limit.
pub struct Watchdog {
    target: Arc<dyn Restart>,
    bus: Bus,
    limit: u32,
    backoff: BackoffPolicy,
}

impl Watchdog {
    pub fn new(target: Arc<dyn Restart>, bus: Bus, limit: u32, backoff: BackoffPolicy) -> Self {
        Self {
            target,
            bus,
            limit,
            backoff,
        }
    }

    /// Spawns the watchdog listener.
    ///
    /// The bus subscription is created before this returns, so an exit
    /// published right after spawning cannot be missed. The task runs until
    /// the limit is reached, the token is cancelled or the bus closes.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        let rx = self.bus.subscribe();
        tokio::spawn(self.run(rx, token))
    }

    async fn run(
        self,
        mut rx: tokio::sync::broadcast::Receiver<Event>,
        token: CancellationToken,
    ) {
        let mut state = RetryState::new(self.limit);

        loop {
            let event = tokio::select! {
                _ = token.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "watchdog lagged behind the event bus");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                }
            };

            match event.kind {
                EventKind::Started => {
                    if state.failures() > 0 {
                        tracing::info!("server reported stable; resetting failure counter");
                    }
                    state.record_stable();
                    self.bus.publish(Event::new(EventKind::WatchdogStable));
                }
                EventKind::Exited if event.is_crash() => {
                    tracing::warn!(code = ?event.code, "server process unexpectedly exited");
                    if !self.handle_crash(&mut state, &token).await {
                        break;
                    }
                }
                EventKind::Launching if event.success == Some(false) => {
                    tracing::warn!("server launch attempt failed");
                    if !self.handle_crash(&mut state, &token).await {
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    /// Returns `false` when the watchdog should stop for good.
    async fn handle_crash(&self, state: &mut RetryState, token: &CancellationToken) -> bool {
        match state.record_crash() {
            Verdict::Retry { attempt } => {
                let delay = self.backoff.next(attempt - 1);
                tracing::info!(attempt, limit = self.limit, ?delay, "scheduling restart");

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = token.cancelled() => return false,
                }

                self.bus
                    .publish(Event::new(EventKind::WatchdogRetry).with_attempt(attempt));
                if let Err(error) = self.target.restart().await {
                    // The failed Launching event loops back through the bus
                    // and is counted as the next crash.
                    tracing::warn!(%error, attempt, "restart attempt failed to launch");
                }
                true
            }
            Verdict::LimitReached => {
                tracing::error!(limit = self.limit, "restart limit reached; giving up");
                self.bus.publish(Event::new(EventKind::WatchdogLimitReached));
                false
            }
        }
    }
}
