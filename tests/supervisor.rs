//! End-to-end supervisor and watchdog tests against a scripted `sh` child.
#![cfg(unix)]

mod common;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use warden::bedrock;
use warden::{BackoffPolicy, Bus, EventKind, JitterPolicy, ProcessSupervisor, Restart, SupervisorError, Watchdog};

use common::{script_spec, write_crashing_server, write_fake_server};

const BANNER_TIMEOUT: Option<Duration> = Some(Duration::from_secs(10));

async fn started_supervisor(
    dir: &std::path::Path,
    env: Vec<(String, String)>,
) -> std::sync::Arc<ProcessSupervisor> {
    let script = write_fake_server(dir);
    let bus = Bus::new(256);
    let supervisor =
        ProcessSupervisor::new(script_spec(&script, dir, env), &[], true, bus).unwrap();

    let ready = supervisor.watch_for(bedrock::pat::SERVER_STARTED).unwrap();
    supervisor.start().await.unwrap();
    ready.wait_timeout(BANNER_TIMEOUT).await.unwrap();
    supervisor
}

#[tokio::test]
async fn test_start_reports_running_and_stop_is_graceful() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = started_supervisor(dir.path(), Vec::new()).await;
    assert!(supervisor.is_running().await);

    let mut events = supervisor.bus().subscribe();
    supervisor.stop().await.unwrap();
    assert!(!supervisor.is_running().await);

    // The exit event must be classified as graceful.
    let exited = loop {
        let event = events.recv().await.unwrap();
        if event.kind == EventKind::Exited {
            break event;
        }
    };
    assert_eq!(exited.graceful, Some(true));

    // Stopping an already-stopped process is a no-op.
    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn test_wait_resolves_when_command_is_answered() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = started_supervisor(dir.path(), Vec::new()).await;

    // Arm first, then send: the response cannot be missed.
    let ack = supervisor.watch_for(r"^Saving\.\.\.").unwrap();
    supervisor.send_line(bedrock::cmd::SAVE_HOLD).await.unwrap();
    let line = ack.wait_timeout(Some(Duration::from_secs(5))).await.unwrap();
    assert_eq!(line, "Saving...");

    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn test_wait_times_out_when_pattern_never_appears() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = started_supervisor(dir.path(), Vec::new()).await;

    // Generate unrelated traffic while the wait is pending.
    for i in 0..5 {
        supervisor.send_line(&format!("noise {i}")).await.unwrap();
    }
    let err = supervisor
        .wait_for_match(r"this will never be printed", Some(Duration::from_millis(300)))
        .await
        .unwrap_err();
    assert!(matches!(err, SupervisorError::WaitTimeout { .. }));

    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_handlers_both_observe_their_patterns() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    let supervisor = started_supervisor(dir.path(), Vec::new()).await;

    let unknowns = Arc::new(AtomicUsize::new(0));
    let saves = Arc::new(AtomicUsize::new(0));

    let u = Arc::clone(&unknowns);
    supervisor
        .register_handler(r"^Unknown command:", move |_| {
            u.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    let s = Arc::clone(&saves);
    supervisor
        .register_handler(r"^Saving\.\.\.", move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    supervisor.send_line("first junk").await.unwrap();
    supervisor.send_line("second junk").await.unwrap();

    // Round-trip a save hold as a barrier: once its ack arrived, the two
    // junk responses were necessarily dispatched first.
    let ack = supervisor.watch_for(r"^Saving\.\.\.").unwrap();
    supervisor.send_line(bedrock::cmd::SAVE_HOLD).await.unwrap();
    ack.wait_timeout(Some(Duration::from_secs(5))).await.unwrap();

    assert_eq!(unknowns.load(Ordering::SeqCst), 2);
    assert_eq!(saves.load(Ordering::SeqCst), 1);

    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn test_duplicate_registration_fails_loudly() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_fake_server(dir.path());
    let supervisor = ProcessSupervisor::new(
        script_spec(&script, dir.path(), Vec::new()),
        &[],
        true,
        Bus::new(16),
    )
    .unwrap();

    supervisor.register_handler(r"^custom$", |_| {}).unwrap();
    let err = supervisor.register_handler(r"^custom$", |_| {}).unwrap_err();
    assert!(matches!(err, SupervisorError::DuplicatePattern { .. }));
}

#[tokio::test]
async fn test_launch_failure_is_surfaced_and_published() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("no_such_binary");
    let bus = Bus::new(16);
    let supervisor = ProcessSupervisor::new(
        script_spec(&missing, dir.path(), Vec::new()),
        &[],
        true,
        bus.clone(),
    )
    .unwrap();

    let mut events = bus.subscribe();
    let err = supervisor.start().await.unwrap_err();
    assert!(matches!(err, SupervisorError::Launch { .. }));
    assert!(!supervisor.is_running().await);

    let launching = events.recv().await.unwrap();
    assert_eq!(launching.kind, EventKind::Launching);
    assert_eq!(launching.success, Some(false));
}

#[tokio::test]
async fn test_watchdog_retries_to_the_limit_then_gives_up() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_crashing_server(dir.path());
    let bus = Bus::new(256);
    let supervisor = ProcessSupervisor::new(
        script_spec(&script, dir.path(), Vec::new()),
        &[],
        true,
        bus.clone(),
    )
    .unwrap();

    let backoff = BackoffPolicy {
        first: Duration::from_millis(1),
        max: Duration::from_millis(1),
        factor: 1.0,
        jitter: JitterPolicy::None,
    };
    let watchdog = Watchdog::new(
        std::sync::Arc::clone(&supervisor) as std::sync::Arc<dyn Restart>,
        bus.clone(),
        2,
        backoff,
    );
    let token = CancellationToken::new();
    watchdog.spawn(token.clone());

    let mut events = bus.subscribe();
    supervisor.start().await.unwrap();

    let mut crashes = 0;
    let mut retries = Vec::new();
    let mut limit_reached = 0;
    let deadline = tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            let event = events.recv().await.unwrap();
            match event.kind {
                EventKind::Exited if event.is_crash() => crashes += 1,
                EventKind::WatchdogRetry => retries.push(event.attempt.unwrap()),
                EventKind::WatchdogLimitReached => {
                    limit_reached += 1;
                    break;
                }
                _ => {}
            }
        }
    })
    .await;
    assert!(deadline.is_ok(), "watchdog never reached its limit");

    // Limit 2: two restart attempts, the third crash trips the limit.
    assert_eq!(retries, vec![1, 2]);
    assert_eq!(crashes, 3);
    assert_eq!(limit_reached, 1);

    token.cancel();
}
