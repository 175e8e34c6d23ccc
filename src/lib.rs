//! # warden
//!
//! **Warden** wraps a Bedrock-style dedicated server that exposes nothing but
//! a line-oriented console: stdout lines out, command lines in. On top of that
//! narrow interface it provides process supervision, crash recovery and
//! crash-consistent *hot backups* of the live world directory.
//!
//! ## Architecture
//! ```text
//!            child stdout (lines)
//!                   │
//!                   ▼
//!        ┌───────────────────────┐     ┌──────────────────────────┐
//!        │  ProcessSupervisor    │────►│  PatternRegistry         │
//!        │  - single reader task │     │  - persistent handlers   │
//!        │  - serialized stdin   │     │  - one-shot match waiters│
//!        │  - console echo/mute  │     └──────────────────────────┘
//!        └──────────┬────────────┘
//!                   │ lifecycle events (launching / started / exited)
//!                   ▼
//!        ┌───────────────────────┐
//!        │   Bus (broadcast)     │
//!        └───┬───────────┬───────┘
//!            ▼           ▼
//!      ┌──────────┐ ┌────────────────────┐
//!      │ Watchdog │ │ BackupCoordinator  │◄─── Scheduler (interval /
//!      │ restarts │ │ hold/query/copy/   │     time-of-day triggers)
//!      │ ≤ limit  │ │ verify/resume      │
//!      └──────────┘ └────────────────────┘
//! ```
//!
//! ## Key pieces
//! | Area            | Description                                                  | Key types |
//! |-----------------|--------------------------------------------------------------|-----------|
//! | **Supervision** | Own the child process, read stdout, serialize stdin.         | [`ProcessSupervisor`] |
//! | **Dispatch**    | Regex patterns → persistent handlers and blocking waiters.   | [`PatternRegistry`] |
//! | **Recovery**    | Bounded auto-restart after unexpected exits, with backoff.   | [`Watchdog`], [`RetryState`] |
//! | **Backups**     | Full or hot (hold/query/copy/verify/resume) world snapshots. | [`BackupCoordinator`] |
//! | **Archival**    | Timestamped `.tar.gz` snapshots with count-based rotation.   | [`backup::archive`] |
//! | **Scheduling**  | Interval and daily-time triggers under Processing exclusion. | [`Scheduler`] |
//! | **Events**      | Broadcast lifecycle/progress events with monotonic `seq`.    | [`Event`], [`Bus`] |
//!
//! ## Ordering invariant
//! The single stdout reader task is the only place lines are observed; it
//! dispatches to handlers and waiters in strict arrival order and must never
//! be blocked by a waiter. [`ProcessSupervisor::wait_for_match`] therefore
//! suspends only its caller, and protocol code arms the waiter *before*
//! sending the command that provokes the response.

pub mod backup;
pub mod bedrock;
pub mod config;
pub mod error;
pub mod events;
pub mod policies;
pub mod process;
pub mod processing;
pub mod render;
pub mod scheduler;
pub mod watchdog;

// ---- Public re-exports ----

pub use backup::{BackupCoordinator, BackupOptions};
pub use config::RunConfig;
pub use error::{BackupError, RenderError, SupervisorError, WardenError};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use process::{LaunchSpec, PatternRegistry, ProcessSupervisor};
pub use render::RenderRunner;
pub use scheduler::Scheduler;
pub use watchdog::{Restart, RetryState, Watchdog};
