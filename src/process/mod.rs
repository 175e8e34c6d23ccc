//! Process supervision: the child process and its console.
//!
//! This module contains everything that touches the supervised child
//! directly. The only state the rest of the crate sees is the
//! [`ProcessSupervisor`] surface and the events it publishes.
//!
//! Internal modules:
//! - [`supervisor`]: owns the child, the single stdout reader and the
//!   serialized stdin writer;
//! - [`registry`]: regex dispatch to persistent handlers and one-shot
//!   waiters;
//! - [`console`]: operator console echo with ignore-list and mute flag;
//! - [`shell`]: opaque pre/post shell command execution;
//! - [`shutdown`]: cross-platform termination signal handling.

mod console;
mod registry;
mod shell;
mod shutdown;
mod supervisor;

pub use console::ConsoleEcho;
pub use registry::{MatchFuture, PatternRegistry};
pub use shell::run_shell_command;
pub use shutdown::wait_for_shutdown_signal;
pub use supervisor::{LaunchSpec, ProcessState, ProcessSupervisor};
