//! # warden binary: wiring and the operator console.
//!
//! Loads `warden.json` (bootstrapping a default on first run), builds the
//! supervisor/watchdog/backup/render/scheduler stack, then serves the
//! operator console until a shutdown signal, an operator `stop`, or the
//! watchdog giving up.
//!
//! Exit status is non-zero when the watchdog reached its retry limit, so an
//! outer supervisor (systemd, a container runtime) can intervene.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use warden::bedrock;
use warden::process::wait_for_shutdown_signal;
use warden::scheduler::{invoke_backup, invoke_render};
use warden::{
    BackupCoordinator, BackupOptions, Bus, EventKind, LaunchSpec, ProcessSupervisor, RenderRunner,
    Restart, RunConfig, Scheduler, WardenError, Watchdog,
};

#[derive(Parser, Debug)]
#[command(name = "warden", version, about = "Console supervisor and hot-backup daemon")]
struct Cli {
    /// The configuration file to load settings from.
    #[arg(short, long, default_value = "warden.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            tracing::error!(%error, "warden failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warden=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode, WardenError> {
    if !cli.config.exists() {
        RunConfig::write_default(&cli.config)?;
        println!(
            "No previous configuration found. A default was written to {:?}; \
             edit it and restart warden.",
            cli.config
        );
        return Ok(ExitCode::SUCCESS);
    }
    let cfg = RunConfig::load(&cli.config)?;

    let bus = Bus::new(1024);
    let spec = LaunchSpec::from_server_config(&cfg.server);
    let supervisor = ProcessSupervisor::new(
        spec,
        &cfg.server.effective_ignore_patterns(),
        cfg.quiet_mode,
        bus.clone(),
    )?;

    let backup = BackupCoordinator::new(
        Arc::clone(&supervisor),
        cfg.backups.clone(),
        cfg.server.world_name.clone(),
        cfg.server.world_path(),
    );

    let mut renders_enabled = cfg.renders.enable_renders;
    if renders_enabled && cfg.renders.bin_path.as_os_str().is_empty() {
        tracing::warn!("disabling renders: no renderer binary configured");
        renders_enabled = false;
    }
    let render =
        renders_enabled.then(|| RenderRunner::new(Arc::clone(&supervisor), cfg.renders.clone()));

    let runtime_token = CancellationToken::new();

    if cfg.watchdog.enable {
        Watchdog::new(
            Arc::clone(&supervisor) as Arc<dyn Restart>,
            bus.clone(),
            cfg.watchdog.retry_limit,
            cfg.watchdog.backoff(),
        )
        .spawn(runtime_token.child_token());
    }
    backup.spawn_activity_listener(runtime_token.child_token());

    // Subscribe before the first launch so no lifecycle event is missed.
    let mut events = bus.subscribe();

    if cfg.backups.enable_backups && cfg.backups.backup_on_startup {
        tracing::info!("creating initial world backup");
        let opts = BackupOptions {
            full_copy: true,
            archive: false,
            force: true,
        };
        if let Err(error) = backup.create_backup(opts).await {
            tracing::warn!(label = error.as_label(), %error, "initial backup failed");
        }
    }

    if !supervisor.is_running().await {
        // The banner wait is armed before the launch so a fast-starting
        // server cannot print it into the void.
        let ready = supervisor
            .watch_for(bedrock::pat::SERVER_STARTED)
            .map_err(WardenError::from)?;
        supervisor.start().await.map_err(WardenError::from)?;
        ready.wait_timeout(None).await.map_err(WardenError::from)?;
    }
    tracing::info!("server is ready");

    Scheduler::new(
        Arc::clone(&supervisor),
        Arc::clone(&backup),
        render.clone(),
        cfg.backups.clone(),
        cfg.renders.clone(),
    )
    .spawn(runtime_token.child_token());

    spawn_console(Console {
        supervisor: Arc::clone(&supervisor),
        backup: Arc::clone(&backup),
        render,
        busy_commands: cfg.busy_commands,
        config_path: cli.config.clone(),
        exit: runtime_token.clone(),
    });

    let signal = wait_for_shutdown_signal();
    tokio::pin!(signal);

    let exit_code = loop {
        tokio::select! {
            _ = runtime_token.cancelled() => break ExitCode::SUCCESS,
            _ = &mut signal => {
                tracing::info!("termination signal received; stopping server");
                if let Err(error) = supervisor.stop().await {
                    tracing::warn!(%error, "graceful stop failed");
                }
                break ExitCode::SUCCESS;
            }
            event = events.recv() => match event {
                Ok(event) if event.kind == EventKind::WatchdogLimitReached => {
                    tracing::error!("watchdog reached its retry limit; exiting");
                    break ExitCode::FAILURE;
                }
                Ok(event) if event.kind == EventKind::VersionDetected => {
                    if let Some(version) = &event.detail {
                        tracing::info!(%version, "server version detected");
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break ExitCode::SUCCESS,
            }
        }
    };

    runtime_token.cancel();
    if supervisor.is_running().await {
        let _ = supervisor.stop().await;
    }
    Ok(exit_code)
}

/// Shared state of the operator console loop.
struct Console {
    supervisor: Arc<ProcessSupervisor>,
    backup: Arc<BackupCoordinator>,
    render: Option<Arc<RenderRunner>>,
    busy_commands: bool,
    config_path: PathBuf,
    exit: CancellationToken,
}

fn spawn_console(console: Console) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            console.handle(line.trim()).await;
        }
    });
}

impl Console {
    async fn handle(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.busy_commands && self.is_busy() {
            println!(
                "Could not execute \"{text}\": a backup or render task is still running \
                 (enable busy_commands to override)."
            );
            return;
        }

        let lowered: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
        let tokens: Vec<&str> = lowered.iter().map(String::as_str).collect();

        match tokens.as_slice() {
            ["force", "start", "backup"] => {
                let backup = Arc::clone(&self.backup);
                tokio::spawn(async move {
                    invoke_backup(&backup, true).await;
                });
            }
            ["force", "start", "render"] => match &self.render {
                Some(render) => {
                    let backup = Arc::clone(&self.backup);
                    let render = Arc::clone(render);
                    tokio::spawn(async move {
                        invoke_render(&backup, &render).await;
                    });
                }
                None => println!("Renders are disabled."),
            },
            ["stop"] => self.schedule_stop(0.0).await,
            ["stop", seconds] => match seconds.parse::<f64>() {
                Ok(seconds) if seconds.is_finite() && seconds >= 0.0 => {
                    self.schedule_stop(seconds).await;
                }
                _ => println!(
                    "Could not schedule shutdown because {seconds:?} is not a valid number."
                ),
            },
            ["reload", "warden"] => match RunConfig::load(&self.config_path) {
                Ok(_) => println!(
                    "Configuration file is valid; settings take effect when warden restarts."
                ),
                Err(error) => println!("Could not reload configuration: {error}"),
            },
            _ => {
                // Everything else passes through to the server console.
                if let Err(error) = self.supervisor.send_line(text).await {
                    println!("Could not execute \"{text}\": {error}");
                }
            }
        }
    }

    fn is_busy(&self) -> bool {
        self.backup.is_processing()
            || self.render.as_ref().is_some_and(|r| r.is_processing())
    }

    async fn schedule_stop(&self, seconds: f64) {
        if seconds > 0.0 {
            self.supervisor
                .send_notice(&format!("Scheduled shutdown in {seconds} seconds..."))
                .await;
        }
        let supervisor = Arc::clone(&self.supervisor);
        let exit = self.exit.clone();
        tokio::spawn(async move {
            if seconds > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
            }
            if let Err(error) = supervisor.stop().await {
                tracing::warn!(%error, "graceful stop failed");
            }
            exit.cancel();
        });
    }
}
