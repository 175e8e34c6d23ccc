//! Error types used across the warden runtime.
//!
//! Three main enums, one per concern:
//!
//! - [`SupervisorError`] — failures of the supervised process and its console.
//! - [`BackupError`] — failures of the hot-backup protocol and archival.
//! - [`RenderError`] — failures of the external renderer invocation.
//!
//! [`WardenError`] is the top-level type the binary reports; it wraps the
//! others plus configuration bootstrap failures. All enums provide
//! `as_label()` for stable snake_case identifiers in logs.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// # Errors raised by the process supervisor.
///
/// These represent failures of the child process itself, its stdin/stdout
/// plumbing, or the pattern-wait primitives built on top of them.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// `start()` was called while the process is still alive.
    #[error("server process is already running")]
    AlreadyRunning,

    /// A command or wait was issued against a process that is not running.
    #[error("server process is not running")]
    NotRunning,

    /// The OS refused to launch the configured binary.
    #[error("failed to launch server process: {source}")]
    Launch {
        #[source]
        source: std::io::Error,
    },

    /// A regex pattern failed to compile.
    #[error("invalid pattern {pattern:?}: {source}")]
    Pattern {
        /// The offending pattern text.
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A persistent handler was registered twice for the same pattern.
    ///
    /// Re-registering is almost always a wiring bug, so it fails loudly
    /// instead of silently replacing the earlier handler.
    #[error("a handler for pattern {pattern:?} is already registered")]
    DuplicatePattern {
        /// The pattern that was already present.
        pattern: String,
    },

    /// No line matched the pattern within the allowed time.
    #[error("no console line matched {pattern:?} within {timeout:?}")]
    WaitTimeout {
        /// The pattern that was being waited for.
        pattern: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The process exited while a wait was still armed.
    #[error("server exited while waiting for {pattern:?}")]
    WaitAborted {
        /// The pattern that was being waited for.
        pattern: String,
    },

    /// Any other I/O failure on the child's pipes.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::AlreadyRunning => "already_running",
            SupervisorError::NotRunning => "not_running",
            SupervisorError::Launch { .. } => "launch_failed",
            SupervisorError::Pattern { .. } => "bad_pattern",
            SupervisorError::DuplicatePattern { .. } => "duplicate_pattern",
            SupervisorError::WaitTimeout { .. } => "wait_timeout",
            SupervisorError::WaitAborted { .. } => "wait_aborted",
            SupervisorError::Io(_) => "io",
        }
    }
}

/// # Errors raised by the backup coordinator.
///
/// `Busy` is the mutual-exclusion rejection; everything else aborts the
/// in-flight backup (the resume phase still runs defensively first).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BackupError {
    /// Another backup is still processing; the new invocation was rejected.
    #[error("a backup task is still running")]
    Busy,

    /// The configured world directory does not exist.
    #[error("world directory {path:?} does not exist")]
    MissingWorld {
        /// The path that was checked.
        path: PathBuf,
    },

    /// The save-query response carried no parseable file manifest.
    #[error("could not parse a file manifest from {line:?}")]
    Manifest {
        /// The offending response line.
        line: String,
    },

    /// A source file ended before the manifest's recorded byte length.
    ///
    /// The manifest length is authoritative; a shorter source means the
    /// snapshot would be corrupt, so the backup is aborted.
    #[error("source file {path:?} ended after {actual} of {expected} bytes")]
    TruncatedSource {
        /// The source file being copied.
        path: PathBuf,
        /// Bytes the manifest promised.
        expected: u64,
        /// Bytes actually read.
        actual: u64,
    },

    /// An archive with the generated name already exists.
    ///
    /// Non-fatal for the backup itself; only archival is marked failed.
    #[error("archive {name:?} already exists")]
    ArchiveExists {
        /// The colliding archive file name.
        name: String,
    },

    /// A supervisor primitive failed mid-protocol (send, wait, restart).
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// Filesystem failure during copy, verify or archival.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackupError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            BackupError::Busy => "backup_busy",
            BackupError::MissingWorld { .. } => "missing_world",
            BackupError::Manifest { .. } => "manifest_parse",
            BackupError::TruncatedSource { .. } => "truncated_source",
            BackupError::ArchiveExists { .. } => "archive_exists",
            BackupError::Supervisor(e) => e.as_label(),
            BackupError::Io(_) => "io",
        }
    }
}

/// # Errors raised by the external renderer runner.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RenderError {
    /// Another render is still processing; the new invocation was rejected.
    #[error("a render task is still running")]
    Busy,

    /// Filesystem or process-spawn failure around the renderer.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// # Top-level error reported by the `warden` binary.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WardenError {
    /// The configuration file could not be read or written.
    #[error("could not access configuration {path:?}: {source}")]
    ConfigIo {
        /// Path of the configuration file.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`RunConfig`](crate::RunConfig).
    #[error("could not parse configuration {path:?}: {source}")]
    ConfigParse {
        /// Path of the configuration file.
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Render(#[from] RenderError),
}
