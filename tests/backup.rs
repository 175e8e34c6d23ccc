//! End-to-end backup protocol tests: a scripted server answers the
//! hold/query/resume commands while real files are copied and verified.
#![cfg(unix)]

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use warden::bedrock;
use warden::config::BackupConfig;
use warden::{BackupCoordinator, BackupError, BackupOptions, Bus, ProcessSupervisor};

use common::{script_spec, write_fake_server, WORLD};

const BANNER_TIMEOUT: Option<Duration> = Some(Duration::from_secs(10));

/// Lays out a world directory with a growing-db shape:
/// `db/000001.ldb` (100 000 bytes), `db/CURRENT` (16), `level.dat` (4 096).
fn write_world(root: &Path) {
    let world = root.join("worlds").join(WORLD);
    std::fs::create_dir_all(world.join("db")).unwrap();
    std::fs::write(world.join("db/000001.ldb"), vec![7u8; 100_000]).unwrap();
    std::fs::write(world.join("db/CURRENT"), vec![7u8; 16]).unwrap();
    std::fs::write(world.join("level.dat"), vec![7u8; 4_096]).unwrap();
}

fn manifest_env() -> Vec<(String, String)> {
    // The frozen lengths deliberately undershoot the on-disk sizes for the
    // growing file; the copy must stop at exactly these counts.
    let manifest = format!(
        "{WORLD}/db/000001.ldb:98304, {WORLD}/db/CURRENT:16, {WORLD}/level.dat:4096"
    );
    vec![("MANIFEST".to_string(), manifest)]
}

fn backup_config(root: &Path) -> BackupConfig {
    let mut cfg = BackupConfig::default();
    cfg.temp_path = root.join("temp");
    cfg.archive_path = root.join("backups");
    cfg.ack_timeout = 10;
    cfg
}

async fn started_stack(
    root: &Path,
    env: Vec<(String, String)>,
) -> (Arc<ProcessSupervisor>, Arc<BackupCoordinator>) {
    let script = write_fake_server(root);
    let supervisor =
        ProcessSupervisor::new(script_spec(&script, root, env), &[], true, Bus::new(256)).unwrap();

    let ready = supervisor.watch_for(bedrock::pat::SERVER_STARTED).unwrap();
    supervisor.start().await.unwrap();
    ready.wait_timeout(BANNER_TIMEOUT).await.unwrap();

    let coordinator = BackupCoordinator::new(
        Arc::clone(&supervisor),
        backup_config(root),
        WORLD,
        root.join("worlds").join(WORLD),
    );
    (supervisor, coordinator)
}

#[tokio::test]
async fn test_hot_backup_truncates_to_manifest_lengths() {
    let dir = tempfile::tempdir().unwrap();
    write_world(dir.path());
    let (supervisor, coordinator) = started_stack(dir.path(), manifest_env()).await;

    coordinator
        .create_backup(BackupOptions {
            full_copy: false,
            archive: false,
            force: true,
        })
        .await
        .unwrap();

    let dest = coordinator.destination();
    let len = |p: &str| std::fs::metadata(dest.join(p)).unwrap().len();
    assert_eq!(len("db/000001.ldb"), 98_304);
    assert_eq!(len("db/CURRENT"), 16);
    assert_eq!(len("level.dat"), 4_096);

    // The protocol resumed saving: the server is alive and answering.
    assert!(supervisor.is_running().await);
    let ack = supervisor.watch_for(r"^Saving\.\.\.").unwrap();
    supervisor.send_line(bedrock::cmd::SAVE_HOLD).await.unwrap();
    ack.wait_timeout(Some(Duration::from_secs(5))).await.unwrap();

    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn test_verify_deletes_stale_destination_files() {
    let dir = tempfile::tempdir().unwrap();
    write_world(dir.path());
    let (supervisor, coordinator) = started_stack(dir.path(), manifest_env()).await;

    // Remnant of an earlier cycle the server no longer tracks.
    let stale = coordinator.destination().join("db/stale.ldb");
    std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
    std::fs::write(&stale, b"old").unwrap();

    coordinator
        .create_backup(BackupOptions {
            full_copy: false,
            archive: false,
            force: true,
        })
        .await
        .unwrap();

    assert!(!stale.exists());
    // Files present in both survive untouched.
    assert!(coordinator.destination().join("db/CURRENT").exists());

    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn test_second_backup_is_rejected_while_processing() {
    let dir = tempfile::tempdir().unwrap();
    write_world(dir.path());
    let mut env = manifest_env();
    env.push(("HOLD_DELAY".to_string(), "1".to_string()));
    let (supervisor, coordinator) = started_stack(dir.path(), env).await;

    let opts = BackupOptions {
        full_copy: false,
        archive: false,
        force: true,
    };

    let first = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.create_backup(opts).await })
    };

    // Give the first invocation time to take the Processing flag (it then
    // sits in the delayed hold acknowledgement).
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(coordinator.is_processing());

    let err = coordinator.create_backup(opts).await.unwrap_err();
    assert!(matches!(err, BackupError::Busy));

    // The in-flight job is unaffected and completes.
    first.await.unwrap().unwrap();
    assert!(!coordinator.is_processing());

    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn test_full_copy_when_server_is_down_and_archive_created() {
    let dir = tempfile::tempdir().unwrap();
    write_world(dir.path());
    let script = write_fake_server(dir.path());
    let supervisor = ProcessSupervisor::new(
        script_spec(&script, dir.path(), Vec::new()),
        &[],
        true,
        Bus::new(64),
    )
    .unwrap();
    // Never started: the hold-based path must be skipped entirely.
    let coordinator = BackupCoordinator::new(
        Arc::clone(&supervisor),
        backup_config(dir.path()),
        WORLD,
        dir.path().join("worlds").join(WORLD),
    );

    coordinator
        .create_backup(BackupOptions {
            full_copy: false,
            archive: true,
            force: false,
        })
        .await
        .unwrap();

    // Full-copy semantics: everything mirrored at its on-disk size.
    let dest = coordinator.destination();
    assert_eq!(
        std::fs::metadata(dest.join("db/000001.ldb")).unwrap().len(),
        100_000
    );
    assert_eq!(std::fs::metadata(dest.join("level.dat")).unwrap().len(), 4_096);

    // Exactly one timestamped archive was produced.
    let archives: Vec<_> = std::fs::read_dir(dir.path().join("backups"))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(archives.len(), 1);
    assert!(archives[0].ends_with(&format!("_{WORLD}.tar.gz")));
}

#[tokio::test]
async fn test_backup_fails_when_manifest_promises_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    write_world(dir.path());
    let manifest = format!("{WORLD}/db/does_not_exist.ldb:64");
    let env = vec![("MANIFEST".to_string(), manifest)];
    let (supervisor, coordinator) = started_stack(dir.path(), env).await;

    let err = coordinator
        .create_backup(BackupOptions {
            full_copy: false,
            archive: false,
            force: true,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BackupError::Io(_)));

    // Resume still ran defensively: the server answers the next hold.
    let ack = supervisor.watch_for(r"^Saving\.\.\.").unwrap();
    supervisor.send_line(bedrock::cmd::SAVE_HOLD).await.unwrap();
    ack.wait_timeout(Some(Duration::from_secs(5))).await.unwrap();

    // And the Processing flag was released despite the failure.
    assert!(!coordinator.is_processing());

    supervisor.stop().await.unwrap();
}
