//! # Runtime configuration.
//!
//! [`RunConfig`] is the plain-value view of `warden.json`: server launch
//! settings, backup behavior, renderer wiring and watchdog limits. The core
//! components receive the sections they need at construction; nothing reads
//! the file after startup except an explicit operator reload.
//!
//! A missing file is bootstrapped with [`RunConfig::write_default`], which
//! writes a commented-by-example default the operator edits before the
//! first real run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WardenError;
use crate::policies::{BackoffPolicy, JitterPolicy};

/// Top-level configuration loaded from `warden.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RunConfig {
    /// Supervised server process settings.
    pub server: ServerConfig,
    /// Backup protocol and archival settings.
    pub backups: BackupConfig,
    /// External map renderer settings.
    pub renders: RenderConfig,
    /// Crash watchdog settings.
    pub watchdog: WatchdogConfig,
    /// Suppress in-game operator notices.
    pub quiet_mode: bool,
    /// Allow operator commands while a backup or render is processing.
    pub busy_commands: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            backups: BackupConfig::default(),
            renders: RenderConfig::default(),
            watchdog: WatchdogConfig::default(),
            quiet_mode: false,
            busy_commands: true,
        }
    }
}

/// Launch settings for the supervised server binary.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ServerConfig {
    /// Path to the server binary.
    pub bin_path: PathBuf,
    /// Name of the world directory under `worlds/`.
    pub world_name: String,
    /// Extra environment variables for the child process.
    pub env: BTreeMap<String, String>,
    /// Console lines matching any of these patterns are not echoed.
    ///
    /// Empty means "use the built-in save-protocol ignore list".
    pub ignore_patterns: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bin_path: if cfg!(windows) {
                PathBuf::from("bedrock_server.exe")
            } else {
                PathBuf::from("bedrock_server")
            },
            world_name: "Bedrock level".to_string(),
            env: BTreeMap::new(),
            ignore_patterns: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Directory the server runs in (the binary's parent, or `.`).
    pub fn working_dir(&self) -> PathBuf {
        match self.bin_path.parent() {
            Some(dir) if dir.as_os_str().is_empty() => PathBuf::from("."),
            Some(dir) => dir.to_path_buf(),
            None => PathBuf::from("."),
        }
    }

    /// Path of the live world directory.
    pub fn world_path(&self) -> PathBuf {
        self.working_dir().join("worlds").join(&self.world_name)
    }

    /// Effective echo ignore list (configured or built-in default).
    pub fn effective_ignore_patterns(&self) -> Vec<String> {
        if self.ignore_patterns.is_empty() {
            crate::bedrock::default_ignore_patterns(&self.world_name)
        } else {
            self.ignore_patterns.clone()
        }
    }
}

/// Backup protocol and archival settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct BackupConfig {
    /// Master switch for scheduled backups.
    pub enable_backups: bool,
    /// Take an initial full copy before the server starts serving.
    pub backup_on_startup: bool,
    /// Skip scheduled backups when no player was seen since the last one.
    pub on_activity_only: bool,
    /// Minutes between scheduled backups (interval mode).
    pub backup_interval: u64,
    /// Use the fixed daily `schedule` instead of the interval.
    pub enable_schedule: bool,
    /// Daily backup times as `HH:MM` local clock times.
    pub schedule: Vec<String>,
    /// Directory the working copy is written to.
    pub temp_path: PathBuf,
    /// Directory compressed archives are written to.
    pub archive_path: PathBuf,
    /// Archives to keep, oldest deleted first; `-1` keeps everything.
    pub backups_to_keep: i32,
    /// Stop the server for the duration of the backup instead of hot-copying.
    pub stop_before_backup: bool,
    /// Seconds of warning players get before a stop-for-backup shutdown.
    pub notify_before_stop: u64,
    /// Seconds to wait for each save-protocol acknowledgement; `0` waits forever.
    pub ack_timeout: u64,
    /// Shell command run before the backup starts.
    pub pre_exec: String,
    /// Shell command run after the backup (and archival) completes.
    pub post_exec: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enable_backups: true,
            backup_on_startup: true,
            on_activity_only: false,
            backup_interval: 60,
            enable_schedule: false,
            schedule: Vec::new(),
            temp_path: PathBuf::from("temp"),
            archive_path: PathBuf::from("backups"),
            backups_to_keep: 10,
            stop_before_backup: false,
            notify_before_stop: 60,
            ack_timeout: 120,
            pre_exec: String::new(),
            post_exec: String::new(),
        }
    }
}

impl BackupConfig {
    /// Protocol wait timeout; `None` waits forever.
    pub fn ack_timeout(&self) -> Option<Duration> {
        match self.ack_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// External map renderer settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RenderConfig {
    /// Master switch for scheduled renders.
    pub enable_renders: bool,
    /// Path to the renderer executable.
    pub bin_path: PathBuf,
    /// Directory rendered output is written to.
    pub output_path: PathBuf,
    /// Minutes between scheduled renders.
    pub render_interval: u64,
    /// Argument template; `${WORLD_PATH}` and `${OUTPUT_PATH}` are substituted.
    pub global_args: String,
    /// Per-task argument suffixes, run sequentially.
    pub tasks: Vec<String>,
    /// Discard the renderer's stdout instead of inheriting the console.
    pub hide_stdout: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enable_renders: false,
            bin_path: PathBuf::new(),
            output_path: PathBuf::from("render"),
            render_interval: 180,
            global_args: "-w ${WORLD_PATH} -o ${OUTPUT_PATH} --htmlfile index.html -f png -q 100"
                .to_string(),
            tasks: vec!["--dim 0".to_string(), "--dim 1".to_string(), "--dim 2".to_string()],
            hide_stdout: true,
        }
    }
}

/// Crash watchdog settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct WatchdogConfig {
    /// Master switch for auto-restart.
    pub enable: bool,
    /// Consecutive unexpected exits tolerated before giving up.
    pub retry_limit: u32,
    /// Milliseconds before the first restart attempt.
    pub backoff_first_ms: u64,
    /// Cap on the restart delay in milliseconds.
    pub backoff_max_ms: u64,
    /// Multiplicative growth factor between restart delays.
    pub backoff_factor: f64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enable: true,
            retry_limit: 3,
            backoff_first_ms: 1_000,
            backoff_max_ms: 30_000,
            backoff_factor: 2.0,
        }
    }
}

impl WatchdogConfig {
    /// Restart pacing policy derived from the raw millisecond fields.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(self.backoff_first_ms),
            max: Duration::from_millis(self.backoff_max_ms),
            factor: self.backoff_factor,
            jitter: JitterPolicy::Equal,
        }
    }
}

impl RunConfig {
    /// Loads configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, WardenError> {
        let text = std::fs::read_to_string(path).map_err(|source| WardenError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| WardenError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the default configuration to `path` for the operator to edit.
    pub fn write_default(path: &Path) -> Result<(), WardenError> {
        let text = serde_json::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| "{}".to_string());
        std::fs::write(path, text).map_err(|source| WardenError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })
    }
}
