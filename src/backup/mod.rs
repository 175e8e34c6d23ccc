//! # BackupCoordinator: crash-consistent snapshots of the live world.
//!
//! Two modes exist:
//!
//! - **Full copy**: recursively mirror the world directory. Used for the
//!   startup backup, the stop-for-backup mode and whenever the server is
//!   not running — no consistency concerns because nothing is writing.
//! - **Hot copy**: the server keeps running and the snapshot is produced
//!   by a five-phase console protocol:
//!
//! ```text
//! 1. hold    send `save hold`,   wait for the saving acknowledgement
//! 2. query   send `save query`,  wait for the manifest line, parse it
//! 3. copy    per entry: copy EXACTLY the frozen byte length
//! 4. verify  delete destination db/ files the server no longer tracks
//! 5. resume  send `save resume`, wait for the resume acknowledgement
//!            (runs even when 2–4 failed — the live server must never be
//!             left holding)
//! ```
//!
//! Every wait is armed **before** its triggering command is sent, so a fast
//! response cannot slip past the waiter. The console echo is muted for the
//! duration so the automated traffic does not spam the operator.
//!
//! At most one backup is in flight per coordinator; the `Processing` flag
//! is released on every exit path via [`ProcessingGuard`].

pub mod archive;
mod copy;
mod manifest;

pub use copy::{clear_dir, copy_dir_recursive, copy_truncated};
pub use manifest::{Manifest, ManifestEntry};

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Local;
use tokio::fs;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bedrock;
use crate::config::BackupConfig;
use crate::error::BackupError;
use crate::events::{Bus, Event, EventKind};
use crate::process::{run_shell_command, ProcessSupervisor};
use crate::processing::ProcessingGuard;

/// Per-invocation switches for [`BackupCoordinator::create_backup`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BackupOptions {
    /// Mirror the whole world directory instead of the hot protocol.
    pub full_copy: bool,
    /// Compress the finished copy into the archive directory.
    pub archive: bool,
    /// Ignore the player-activity gate.
    pub force: bool,
}

/// Drives full and hot backups against one [`ProcessSupervisor`].
pub struct BackupCoordinator {
    supervisor: Arc<ProcessSupervisor>,
    cfg: BackupConfig,
    world_name: String,
    world_path: PathBuf,
    destination: PathBuf,
    bus: Bus,
    processing: AtomicBool,
    activity: AtomicBool,
}

impl BackupCoordinator {
    /// Creates a coordinator for `world_path`, writing working copies to
    /// `<temp_path>/<world_name>`.
    pub fn new(
        supervisor: Arc<ProcessSupervisor>,
        cfg: BackupConfig,
        world_name: impl Into<String>,
        world_path: PathBuf,
    ) -> Arc<Self> {
        let world_name = world_name.into();
        let destination = cfg.temp_path.join(&world_name);
        let bus = supervisor.bus().clone();
        Arc::new(Self {
            supervisor,
            cfg,
            world_name,
            world_path,
            destination,
            bus,
            processing: AtomicBool::new(false),
            activity: AtomicBool::new(false),
        })
    }

    /// Whether a backup is currently in flight.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Where the working copy of the world is written.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Whether any player joined or left since the last completed backup.
    pub fn has_activity(&self) -> bool {
        self.activity.load(Ordering::Acquire)
    }

    /// Subscribes to player connect/disconnect events to feed the
    /// `on_activity_only` gate. Spawn once at startup.
    pub fn spawn_activity_listener(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        let mut rx = coordinator.bus.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(event) => {
                            if matches!(
                                event.kind,
                                EventKind::PlayerConnected | EventKind::PlayerDisconnected
                            ) {
                                coordinator.activity.store(true, Ordering::Release);
                            }
                        }
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        })
    }

    /// Runs one backup invocation under the `Processing` flag.
    ///
    /// A second invocation while one is in flight is rejected with
    /// [`BackupError::Busy`] without touching the running job.
    pub async fn create_backup(&self, opts: BackupOptions) -> Result<(), BackupError> {
        let _guard = ProcessingGuard::acquire(&self.processing).ok_or(BackupError::Busy)?;

        self.bus.publish(Event::new(EventKind::BackupStarted));
        let result = self.run_backup(&opts).await;
        match &result {
            Ok(()) => self
                .bus
                .publish(Event::new(EventKind::BackupFinished).with_success(true)),
            Err(error) => self.bus.publish(
                Event::new(EventKind::BackupFinished)
                    .with_success(false)
                    .with_detail(error.as_label()),
            ),
        }
        result
    }

    async fn run_backup(&self, opts: &BackupOptions) -> Result<(), BackupError> {
        let running = self.supervisor.is_running().await;

        if running && self.cfg.on_activity_only && !opts.force && !self.has_activity() {
            tracing::info!("skipping backup: no player activity since the last one");
            return Ok(());
        }

        if !self.cfg.pre_exec.trim().is_empty() {
            tracing::info!(command = %self.cfg.pre_exec, "executing pre-command");
            run_hook(&self.cfg.pre_exec).await;
        }

        self.supervisor.send_notice("Creating backup...").await;
        tracing::info!(world = %self.world_name, "creating backup");

        if self.cfg.stop_before_backup && running {
            self.supervisor.stop().await?;
        }

        let hot =
            !opts.full_copy && !self.cfg.stop_before_backup && self.supervisor.is_running().await;
        let copy_result = if hot {
            self.hot_copy().await
        } else {
            self.full_copy().await
        };

        // Stop-for-backup restarts the server even when the copy failed;
        // leaving it down would turn one bad backup into an outage.
        if self.cfg.stop_before_backup && !self.supervisor.is_running().await {
            let ready = self.supervisor.watch_for(bedrock::pat::SERVER_STARTED)?;
            self.supervisor.start().await?;
            ready.wait_timeout(None).await?;
        }

        copy_result?;

        let mut notice = "Finished creating backup!";
        if opts.archive {
            match self.archive_backup().await {
                Ok(path) => tracing::info!(archive = %path.display(), "archived backup"),
                Err(error) => {
                    tracing::warn!(label = error.as_label(), %error, "archiving failed");
                    notice = "Could not archive backup!";
                }
            }
        }

        self.supervisor.send_notice(notice).await;

        if !self.cfg.post_exec.trim().is_empty() {
            tracing::info!(command = %self.cfg.post_exec, "executing post-command");
            run_hook(&self.cfg.post_exec).await;
        }

        self.activity.store(false, Ordering::Release);
        tracing::info!("backup done");
        Ok(())
    }

    /// Hot path: hold/query/copy/verify, then resume no matter what.
    async fn hot_copy(&self) -> Result<(), BackupError> {
        let timeout = self.cfg.ack_timeout();

        self.supervisor.echo().set_muted(true);
        let protocol = self.hold_and_copy(timeout).await;
        let resume = self.resume_saving(timeout).await;
        self.supervisor.echo().set_muted(false);

        protocol.and(resume)
    }

    /// Phases 1–4 of the hot protocol.
    async fn hold_and_copy(
        &self,
        timeout: Option<std::time::Duration>,
    ) -> Result<(), BackupError> {
        // Phase 1 — hold. The wait is armed before the command goes out.
        let ack = self.supervisor.watch_for(bedrock::pat::SAVE_HELD)?;
        self.supervisor.send_line(bedrock::cmd::SAVE_HOLD).await?;
        ack.wait_timeout(timeout).await?;
        tracing::debug!("world saving held");

        // Phase 2 — query for the frozen file manifest.
        let manifest_pattern = bedrock::manifest_line_pattern(&self.world_name);
        let reply = self.supervisor.watch_for(&manifest_pattern)?;
        self.supervisor.send_line(bedrock::cmd::SAVE_QUERY).await?;
        let line = reply.wait_timeout(timeout).await?;
        let manifest = Manifest::parse(&line, &self.world_name)?;

        // Phase 3 — copy; the recorded lengths are authoritative.
        fs::create_dir_all(&self.destination).await?;
        let total = manifest.entries.len();
        tracing::info!(files = total, "copying manifest files");
        for (index, entry) in manifest.entries.iter().enumerate() {
            let relative = entry.resolve(index, total);
            copy_truncated(
                &self.world_path.join(&relative),
                &self.destination.join(&relative),
                entry.length,
            )
            .await?;
        }

        // Phase 4 — verify.
        self.verify_destination().await?;
        Ok(())
    }

    /// Phase 5 — resume saving. Runs defensively after any protocol
    /// outcome so the live server is never left permanently paused.
    async fn resume_saving(
        &self,
        timeout: Option<std::time::Duration>,
    ) -> Result<(), BackupError> {
        if !self.supervisor.is_running().await {
            return Ok(());
        }
        let ack = self.supervisor.watch_for(bedrock::pat::SAVE_RESUMED)?;
        self.supervisor.send_line(bedrock::cmd::SAVE_RESUME).await?;
        ack.wait_timeout(timeout).await?;
        tracing::debug!("world saving resumed");
        Ok(())
    }

    /// Deletes destination `db/` files that have no counterpart in the
    /// source `db/` — stale remnants from earlier backup cycles.
    async fn verify_destination(&self) -> Result<(), BackupError> {
        let dest_db = self.destination.join("db");
        match fs::try_exists(&dest_db).await {
            Ok(true) => {}
            _ => return Ok(()),
        }

        let live = read_file_names(&self.world_path.join("db")).await?;

        let mut entries = fs::read_dir(&dest_db).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.metadata().await?.is_file() {
                continue;
            }
            if !live.contains(&entry.file_name()) {
                tracing::debug!(file = %entry.path().display(), "deleting stale backup file");
                fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }

    /// Cold path: mirror the whole world directory.
    async fn full_copy(&self) -> Result<(), BackupError> {
        if !fs::try_exists(&self.world_path).await? {
            return Err(BackupError::MissingWorld {
                path: self.world_path.clone(),
            });
        }
        clear_dir(&self.destination).await?;
        let copied = copy_dir_recursive(&self.world_path, &self.destination).await?;
        tracing::info!(files = copied, "full world copy complete");
        Ok(())
    }

    /// Compresses the working copy and applies retention rotation.
    async fn archive_backup(&self) -> Result<PathBuf, BackupError> {
        let name = archive::archive_name(&self.world_name, Local::now());
        let path = archive::create_archive(&self.destination, &self.cfg.archive_path, &name).await?;
        let deleted =
            archive::rotate(&self.cfg.archive_path, self.cfg.backups_to_keep, &path).await?;
        if deleted > 0 {
            tracing::info!(deleted, "rotated old archives");
        }
        Ok(path)
    }
}

/// Runs a pre/post hook; hook failures are reported but never abort the
/// backup around them.
async fn run_hook(command: &str) {
    match run_shell_command(command).await {
        Ok(status) if !status.success() => {
            tracing::warn!(%status, command, "hook command failed");
        }
        Err(error) => {
            tracing::warn!(%error, command, "hook command did not run");
        }
        Ok(_) => {}
    }
}

/// File names directly under `dir`; missing directory counts as empty.
async fn read_file_names(dir: &Path) -> std::io::Result<HashSet<std::ffi::OsString>> {
    let mut names = HashSet::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        names.insert(entry.file_name());
    }
    Ok(names)
}
