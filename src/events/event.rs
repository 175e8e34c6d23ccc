//! # Runtime events emitted by the supervisor and coordinators.
//!
//! [`EventKind`] classifies events across three categories:
//! - **Process lifecycle**: launching, started, exited
//! - **Watchdog**: retry, stable, limit reached
//! - **Task progress**: backup/render started and finished, player activity
//!
//! The [`Event`] struct carries optional metadata such as exit codes,
//! attempt numbers and free-form detail text.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order when events are
//! observed from independent receivers.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Process lifecycle ===
    /// A launch attempt was made.
    ///
    /// Sets:
    /// - `success`: whether the OS reported a successful launch
    /// - `detail`: the launch error message on failure
    Launching,

    /// The process printed its ready banner and is serving.
    Started,

    /// The process terminated.
    ///
    /// Sets:
    /// - `code`: exit code if the OS reported one
    /// - `graceful`: true when the supervisor initiated the stop or the
    ///   exit status was zero
    Exited,

    // === Watchdog ===
    /// The watchdog is about to attempt a restart.
    ///
    /// Sets:
    /// - `attempt`: 1-based consecutive failure count
    WatchdogRetry,

    /// The stability pattern matched; the failure counter was reset.
    WatchdogStable,

    /// The retry limit was exceeded; the watchdog stopped restarting.
    ///
    /// Emitted exactly once per watchdog lifetime.
    WatchdogLimitReached,

    // === Task progress ===
    /// A backup invocation started.
    BackupStarted,

    /// A backup invocation finished.
    ///
    /// Sets:
    /// - `success`: whether the snapshot was produced
    /// - `detail`: the error label on failure
    BackupFinished,

    /// A render cycle started.
    RenderStarted,

    /// A render cycle finished.
    RenderFinished,

    // === Console patterns ===
    /// A player joined; `detail` carries the player name.
    PlayerConnected,

    /// A player left; `detail` carries the player name.
    PlayerDisconnected,

    /// The server announced its version; `detail` carries it.
    VersionDetected,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Whether the operation succeeded (launching, backup finished).
    pub success: Option<bool>,
    /// Exit code of the process, if the OS reported one.
    pub code: Option<i32>,
    /// Whether an exit was operator-initiated or clean.
    pub graceful: Option<bool>,
    /// Consecutive failure count (watchdog retry).
    pub attempt: Option<u32>,
    /// Free-form detail: player name, version string, error text.
    pub detail: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// the next global sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            success: None,
            code: None,
            graceful: None,
            attempt: None,
            detail: None,
        }
    }

    /// Attaches a success flag.
    #[inline]
    pub fn with_success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    /// Attaches an exit code.
    #[inline]
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Marks whether the exit was graceful.
    #[inline]
    pub fn with_graceful(mut self, graceful: bool) -> Self {
        self.graceful = Some(graceful);
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    /// Attaches free-form detail text.
    #[inline]
    pub fn with_detail(mut self, detail: impl Into<Arc<str>>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// True when this event reports a non-graceful process exit.
    #[inline]
    pub fn is_crash(&self) -> bool {
        matches!(self.kind, EventKind::Exited) && !self.graceful.unwrap_or(false)
    }
}
