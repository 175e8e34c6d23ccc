//! # ProcessSupervisor: owns the child process and its console plumbing.
//!
//! One supervisor owns exactly one child process. It translates the child's
//! line-oriented stdout into pattern-match events and lifecycle events, and
//! provides a serialized command interface over the child's stdin.
//!
//! ## Concurrency contract
//! ```text
//! child stdout ──► reader task (single) ──► PatternRegistry.dispatch(line)
//!                                            ├─► persistent handlers
//!                                            ├─► one-shot waiters
//!                                            └─► ConsoleEcho
//!
//! callers (operator / scheduler / coordinator)
//!     ├─► send_line()  — serialized by the stdin mutex, whole lines only
//!     └─► wait_for_match() — suspends the caller, never the reader
//! ```
//!
//! - Exactly one background reader consumes stdout; handlers and waiter
//!   resolution run on it in strict arrival order.
//! - `send_line` may be called concurrently from any task; the stdin mutex
//!   guarantees writes never interleave mid-line.
//! - The reader observes EOF when the process dies, reaps the exit status,
//!   aborts armed waiters and publishes the `Exited` event — no polling.
//!
//! ## Lifecycle events
//! [`EventKind::Launching`] (carries launch success),
//! [`EventKind::Started`] (ready banner matched),
//! [`EventKind::Exited`] (exit code + graceful flag), plus the built-in
//! version and player-activity patterns.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{watch, Mutex};

use crate::bedrock;
use crate::config::ServerConfig;
use crate::error::SupervisorError;
use crate::events::{Bus, Event, EventKind};
use crate::process::{ConsoleEcho, MatchFuture, PatternRegistry};

/// Launch configuration for the supervised process.
#[derive(Clone, Debug)]
pub struct LaunchSpec {
    /// Path to the binary.
    pub binary: PathBuf,
    /// Working directory the process runs in.
    pub working_dir: PathBuf,
    /// Environment overrides applied on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    /// Builds a spec from the server section of the configuration.
    ///
    /// On Unix the binary's directory is exported as `LD_LIBRARY_PATH`
    /// (Bedrock ships its own shared objects next to the executable),
    /// unless the configuration already overrides it.
    pub fn from_server_config(cfg: &ServerConfig) -> Self {
        let working_dir = cfg.working_dir();
        let mut env: Vec<(String, String)> =
            cfg.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

        #[cfg(unix)]
        if !env.iter().any(|(k, _)| k == "LD_LIBRARY_PATH") {
            env.push(("LD_LIBRARY_PATH".to_string(), working_dir.display().to_string()));
        }

        Self {
            binary: cfg.bin_path.clone(),
            working_dir,
            env,
        }
    }
}

/// Coarse lifecycle of the supervised process, published on a watch channel.
///
/// This is bookkeeping for `stop()`-style waits; liveness checks go through
/// [`ProcessSupervisor::is_running`], which queries the OS handle directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    /// Never started.
    Idle,
    /// Launched and not yet reaped.
    Running,
    /// Reaped; carries the exit code if the OS reported one.
    Exited {
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
    },
}

/// Owns one child process: start/stop, serialized stdin, pattern waits.
pub struct ProcessSupervisor {
    spec: LaunchSpec,
    quiet: bool,
    registry: Arc<PatternRegistry>,
    echo: Arc<ConsoleEcho>,
    bus: Bus,
    child: Arc<Mutex<Option<Child>>>,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    state: watch::Sender<ProcessState>,
    stopping: Arc<AtomicBool>,
}

impl ProcessSupervisor {
    /// Creates a supervisor and registers the built-in console patterns
    /// (ready banner, version announcement, player connect/disconnect).
    pub fn new(
        spec: LaunchSpec,
        ignore_patterns: &[String],
        quiet: bool,
        bus: Bus,
    ) -> Result<Arc<Self>, SupervisorError> {
        let echo = Arc::new(ConsoleEcho::new(ignore_patterns)?);
        let (state, _) = watch::channel(ProcessState::Idle);

        let supervisor = Arc::new(Self {
            spec,
            quiet,
            registry: Arc::new(PatternRegistry::new()),
            echo,
            bus,
            child: Arc::new(Mutex::new(None)),
            stdin: Arc::new(Mutex::new(None)),
            state,
            stopping: Arc::new(AtomicBool::new(false)),
        });
        supervisor.register_builtin_handlers()?;
        Ok(supervisor)
    }

    /// Launches the process and begins asynchronous line reading.
    ///
    /// Safe to call again after a prior exit (the watchdog's restart path).
    /// Publishes a [`EventKind::Launching`] event carrying the outcome.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        let mut child_slot = self.child.lock().await;
        if let Some(child) = child_slot.as_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                return Err(SupervisorError::AlreadyRunning);
            }
        }
        self.stopping.store(false, Ordering::Release);

        let mut command = Command::new(&self.spec.binary);
        command
            .current_dir(&self.spec.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped());
        for (key, value) in &self.spec.env {
            command.env(key, value);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.bus.publish(
                    Event::new(EventKind::Launching)
                        .with_success(false)
                        .with_detail(source.to_string()),
                );
                return Err(SupervisorError::Launch { source });
            }
        };

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SupervisorError::Io(std::io::Error::other("child stdout not captured")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SupervisorError::Io(std::io::Error::other("child stdin not captured")))?;

        *self.stdin.lock().await = Some(stdin);
        *child_slot = Some(child);
        drop(child_slot);

        let _ = self.state.send(ProcessState::Running);
        self.spawn_reader(stdout);
        self.bus
            .publish(Event::new(EventKind::Launching).with_success(true));
        tracing::info!(binary = %self.spec.binary.display(), "server process launched");
        Ok(())
    }

    /// Sends the graceful-shutdown command and blocks until the OS reports
    /// process exit. A no-op when the process is not running.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        if !self.is_running().await {
            return Ok(());
        }
        self.stopping.store(true, Ordering::Release);
        if let Err(error) = self.send_line(bedrock::cmd::STOP).await {
            // The process died between the liveness check and the write;
            // the reader task is already reaping it.
            tracing::debug!(%error, "stop command could not be delivered");
        }
        self.wait_for_exit().await;
        Ok(())
    }

    /// Queries live OS process state; never fails (a query error counts as
    /// "not running").
    pub async fn is_running(&self) -> bool {
        let mut slot = self.child.lock().await;
        match slot.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Writes `line` plus a newline to the child's stdin.
    ///
    /// Concurrent callers are serialized; a line is always written whole.
    pub async fn send_line(&self, line: &str) -> Result<(), SupervisorError> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(SupervisorError::NotRunning)?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Broadcasts an in-game operator notice, unless quiet mode is on or
    /// the process is down. Delivery failures are logged, not surfaced.
    pub async fn send_notice(&self, message: &str) {
        if self.quiet || !self.is_running().await {
            return;
        }
        if let Err(error) = self.send_line(&bedrock::tellraw(message)).await {
            tracing::debug!(%error, "could not deliver operator notice");
        }
    }

    /// Arms a one-shot wait for `pattern` without suspending yet.
    ///
    /// Protocol code arms the wait *before* sending the command that
    /// provokes the response, closing the missed-match window.
    pub fn watch_for(&self, pattern: &str) -> Result<MatchFuture, SupervisorError> {
        self.registry.watch(pattern)
    }

    /// Blocks the calling task until a line matches `pattern` or `timeout`
    /// elapses (`None` waits forever). Lines produced after the call begins
    /// are guaranteed to be observed; the reader task is never blocked.
    pub async fn wait_for_match(
        &self,
        pattern: &str,
        timeout: Option<Duration>,
    ) -> Result<String, SupervisorError> {
        self.registry.watch(pattern)?.wait_timeout(timeout).await
    }

    /// Adds a persistent subscriber invoked on every future line matching
    /// `pattern`. Handlers run on the reader task and must not block it.
    pub fn register_handler(
        &self,
        pattern: &str,
        handler: impl Fn(&str) + Send + Sync + 'static,
    ) -> Result<(), SupervisorError> {
        self.registry.register(pattern, handler)
    }

    /// The operator console echo filter (mute control for protocol phases).
    pub fn echo(&self) -> &ConsoleEcho {
        &self.echo
    }

    /// The event bus this supervisor publishes on.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Watches the coarse process lifecycle.
    pub fn state(&self) -> watch::Receiver<ProcessState> {
        self.state.subscribe()
    }

    /// Suspends until the process is no longer in the `Running` state.
    pub async fn wait_for_exit(&self) {
        let mut rx = self.state.subscribe();
        loop {
            if !matches!(*rx.borrow_and_update(), ProcessState::Running) {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Spawns the single stdout reader for the freshly started child.
    fn spawn_reader(&self, stdout: ChildStdout) {
        let registry = Arc::clone(&self.registry);
        let echo = Arc::clone(&self.echo);
        let bus = self.bus.clone();
        let child = Arc::clone(&self.child);
        let stdin = Arc::clone(&self.stdin);
        let state = self.state.clone();
        let stopping = Arc::clone(&self.stopping);

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.is_empty() {
                            continue;
                        }
                        registry.dispatch(&line);
                        echo.echo(&line);
                    }
                    Ok(None) => break,
                    Err(error) => {
                        tracing::warn!(%error, "error reading server stdout");
                        break;
                    }
                }
            }

            // stdout hit EOF: the process is gone or going. Reap it, then
            // release the writer and fail any still-armed waiters.
            let status = {
                let mut slot = child.lock().await;
                match slot.take() {
                    Some(mut child) => child.wait().await.ok(),
                    None => None,
                }
            };
            stdin.lock().await.take();
            registry.abort_waiters();

            let code = status.and_then(|s| s.code());
            let graceful = stopping.load(Ordering::Acquire) || code == Some(0);
            let _ = state.send(ProcessState::Exited { code });

            let mut event = Event::new(EventKind::Exited).with_graceful(graceful);
            if let Some(code) = code {
                event = event.with_code(code);
            }
            bus.publish(event);
            tracing::info!(?code, graceful, "server process exited");
        });
    }

    /// Registers the interface patterns every deployment cares about.
    fn register_builtin_handlers(&self) -> Result<(), SupervisorError> {
        let bus = self.bus.clone();
        self.registry.register(bedrock::pat::SERVER_STARTED, move |_| {
            bus.publish(Event::new(EventKind::Started));
        })?;

        let bus = self.bus.clone();
        let version = compile(bedrock::pat::VERSION)?;
        self.registry.register(bedrock::pat::VERSION, move |line| {
            if let Some(caps) = version.captures(line) {
                bus.publish(Event::new(EventKind::VersionDetected).with_detail(caps[1].to_string()));
            }
        })?;

        let bus = self.bus.clone();
        let connected = compile(bedrock::pat::PLAYER_CONNECTED)?;
        self.registry
            .register(bedrock::pat::PLAYER_CONNECTED, move |line| {
                if let Some(caps) = connected.captures(line) {
                    bus.publish(Event::new(EventKind::PlayerConnected).with_detail(caps[1].to_string()));
                }
            })?;

        let bus = self.bus.clone();
        let disconnected = compile(bedrock::pat::PLAYER_DISCONNECTED)?;
        self.registry
            .register(bedrock::pat::PLAYER_DISCONNECTED, move |line| {
                if let Some(caps) = disconnected.captures(line) {
                    bus.publish(
                        Event::new(EventKind::PlayerDisconnected).with_detail(caps[1].to_string()),
                    );
                }
            })?;

        Ok(())
    }
}

fn compile(pattern: &str) -> Result<Regex, SupervisorError> {
    Regex::new(pattern).map_err(|source| SupervisorError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}
