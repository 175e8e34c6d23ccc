//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to lifecycle and progress events emitted by the
//! supervisor, watchdog, backup coordinator and render runner.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] — event classification and payload metadata
//! - [`Bus`] — thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `ProcessSupervisor` (launching/started/exited, player
//!   and version patterns), `Watchdog` (retry/stable/limit-reached),
//!   `BackupCoordinator`, `RenderRunner`.
//! - **Consumers**: the watchdog listener, the backup activity tracker and
//!   the binary's main loop (which exits on `WatchdogLimitReached`).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
