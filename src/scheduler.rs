//! # Scheduler: timed backup and render cycles.
//!
//! Two trigger styles are supported:
//!
//! - **interval**: every `backup_interval` / `render_interval` minutes;
//! - **time-of-day**: a list of `HH:MM` local clock times, one backup at
//!   each (enabled with `enable_schedule`).
//!
//! Triggers only ever *invoke* the coordinators; mutual exclusion lives in
//! each coordinator's `Processing` flag, which is checked before starting
//! so an overrunning cycle causes the next tick to be skipped, never
//! queued. When `stop_before_backup` is set, players are warned
//! `notify_before_stop` seconds before the backup tick fires.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, NaiveTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backup::{BackupCoordinator, BackupOptions};
use crate::config::{BackupConfig, RenderConfig};
use crate::process::ProcessSupervisor;
use crate::render::RenderRunner;

/// Spawns the timer-driven backup/render loops.
pub struct Scheduler {
    supervisor: Arc<ProcessSupervisor>,
    backup: Arc<BackupCoordinator>,
    render: Option<Arc<RenderRunner>>,
    backups: BackupConfig,
    renders: RenderConfig,
}

impl Scheduler {
    pub fn new(
        supervisor: Arc<ProcessSupervisor>,
        backup: Arc<BackupCoordinator>,
        render: Option<Arc<RenderRunner>>,
        backups: BackupConfig,
        renders: RenderConfig,
    ) -> Self {
        Self {
            supervisor,
            backup,
            render,
            backups,
            renders,
        }
    }

    /// Starts the enabled loops; they run until the token is cancelled.
    pub fn spawn(self, token: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if self.backups.enable_backups {
            handles.push(tokio::spawn(backup_loop(
                Arc::clone(&self.supervisor),
                Arc::clone(&self.backup),
                self.backups.clone(),
                token.child_token(),
            )));
        }

        if let Some(render) = &self.render {
            if self.renders.enable_renders {
                handles.push(tokio::spawn(render_loop(
                    Arc::clone(&self.backup),
                    Arc::clone(render),
                    self.renders.render_interval,
                    token.child_token(),
                )));
            }
        }

        handles
    }
}

/// Invokes a scheduled/forced backup unless one is already processing.
pub async fn invoke_backup(backup: &BackupCoordinator, force: bool) {
    if backup.is_processing() {
        tracing::info!("a backup task is still running");
        return;
    }
    let opts = BackupOptions {
        full_copy: false,
        archive: true,
        force,
    };
    if let Err(error) = backup.create_backup(opts).await {
        tracing::warn!(label = error.as_label(), %error, "backup invocation failed");
    }
}

/// Refreshes the working copy, then runs the renderer over it.
pub async fn invoke_render(backup: &BackupCoordinator, render: &RenderRunner) {
    if backup.is_processing() || render.is_processing() {
        tracing::info!("a backup or render task is still running");
        return;
    }
    let opts = BackupOptions {
        full_copy: false,
        archive: false,
        force: true,
    };
    if let Err(error) = backup.create_backup(opts).await {
        tracing::warn!(label = error.as_label(), %error, "pre-render backup failed");
        return;
    }
    if let Err(error) = render.render(backup.destination()).await {
        tracing::warn!(%error, "render invocation failed");
    }
}

async fn backup_loop(
    supervisor: Arc<ProcessSupervisor>,
    backup: Arc<BackupCoordinator>,
    cfg: BackupConfig,
    token: CancellationToken,
) {
    loop {
        let delay = next_backup_delay(&cfg, Local::now().naive_local());
        let lead = if cfg.stop_before_backup {
            Duration::from_secs(cfg.notify_before_stop)
        } else {
            Duration::ZERO
        };

        if !lead.is_zero() && delay > lead {
            if !sleep_or_cancel(delay - lead, &token).await {
                return;
            }
            supervisor
                .send_notice(&format!(
                    "Shutting down server in {} seconds to take a backup.",
                    cfg.notify_before_stop
                ))
                .await;
            if !sleep_or_cancel(lead, &token).await {
                return;
            }
        } else if !sleep_or_cancel(delay, &token).await {
            return;
        }

        invoke_backup(&backup, false).await;
    }
}

async fn render_loop(
    backup: Arc<BackupCoordinator>,
    render: Arc<RenderRunner>,
    interval_minutes: u64,
    token: CancellationToken,
) {
    let interval = Duration::from_secs(interval_minutes.max(1) * 60);
    loop {
        if !sleep_or_cancel(interval, &token).await {
            return;
        }
        invoke_render(&backup, &render).await;
    }
}

/// Sleeps for `duration`; returns `false` when cancelled instead.
async fn sleep_or_cancel(duration: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = token.cancelled() => false,
    }
}

/// Delay until the next backup tick, in either trigger style.
fn next_backup_delay(cfg: &BackupConfig, now: NaiveDateTime) -> Duration {
    if cfg.enable_schedule {
        let times = parse_schedule(&cfg.schedule);
        if let Some(delay) = delay_until_next(&times, now) {
            return delay;
        }
        tracing::warn!("daily schedule is empty or unparseable; using the interval");
    }
    Duration::from_secs(cfg.backup_interval.max(1) * 60)
}

/// Parses `HH:MM` entries, skipping (and reporting) invalid ones.
fn parse_schedule(schedule: &[String]) -> Vec<NaiveTime> {
    let mut times = Vec::with_capacity(schedule.len());
    for entry in schedule {
        match NaiveTime::parse_from_str(entry.trim(), "%H:%M") {
            Ok(time) => times.push(time),
            Err(_) => tracing::warn!(entry, "ignoring unparseable schedule time"),
        }
    }
    times
}

/// Duration from `now` until the soonest of the given daily clock times.
fn delay_until_next(times: &[NaiveTime], now: NaiveDateTime) -> Option<Duration> {
    times
        .iter()
        .map(|&time| {
            let mut candidate = now.date().and_time(time);
            if candidate <= now {
                candidate += chrono::Duration::days(1);
            }
            candidate - now
        })
        .min()
        .and_then(|delta| delta.to_std().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_next_time_later_today() {
        let delay = delay_until_next(&[t(12, 0), t(18, 30)], at(9, 0)).unwrap();
        assert_eq!(delay, Duration::from_secs(3 * 3600));
    }

    #[test]
    fn test_wraps_to_tomorrow_when_all_passed() {
        let delay = delay_until_next(&[t(6, 0)], at(23, 0)).unwrap();
        assert_eq!(delay, Duration::from_secs(7 * 3600));
    }

    #[test]
    fn test_exact_now_counts_as_tomorrow() {
        let delay = delay_until_next(&[t(9, 0)], at(9, 0)).unwrap();
        assert_eq!(delay, Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_empty_schedule_has_no_next() {
        assert!(delay_until_next(&[], at(9, 0)).is_none());
    }

    #[test]
    fn test_parse_schedule_skips_garbage() {
        let times = parse_schedule(&[
            "06:00".to_string(),
            "not a time".to_string(),
            " 18:30".to_string(),
        ]);
        assert_eq!(times, vec![t(6, 0), t(18, 30)]);
    }

    #[test]
    fn test_interval_fallback_when_schedule_unusable() {
        let mut cfg = BackupConfig::default();
        cfg.enable_schedule = true;
        cfg.schedule = vec!["nonsense".to_string()];
        cfg.backup_interval = 45;
        assert_eq!(next_backup_delay(&cfg, at(10, 0)), Duration::from_secs(45 * 60));
    }
}
