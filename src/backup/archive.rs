//! # Archival and rotation of backup snapshots.
//!
//! A finished working copy can be compressed into a timestamp-named
//! `.tar.gz` in the archive directory. Rotation then deletes the oldest
//! archives (by creation time, falling back to mtime) until the configured
//! retention count is satisfied. The archive just written in the same cycle
//! is never deleted, and a retention threshold of `-1` keeps everything.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::fs;

use crate::error::BackupError;

/// File extension used for compressed snapshots.
pub const ARCHIVE_EXT: &str = "tar.gz";

/// Deterministic archive name: `<yyyy-MM-dd_HH-mm>_<sourceName>.tar.gz`.
pub fn archive_name(source_name: &str, at: DateTime<Local>) -> String {
    format!("{}_{}.{}", at.format("%Y-%m-%d_%H-%M"), source_name, ARCHIVE_EXT)
}

/// Compresses the `source` directory's contents into
/// `archive_dir/<name>`, creating the archive directory if needed.
///
/// Fails with [`BackupError::ArchiveExists`] when an archive of that exact
/// name is already present — the caller treats this as a non-fatal archival
/// failure, not a backup failure.
pub async fn create_archive(
    source: &Path,
    archive_dir: &Path,
    name: &str,
) -> Result<PathBuf, BackupError> {
    fs::create_dir_all(archive_dir).await?;

    let archive_path = archive_dir.join(name);
    if fs::try_exists(&archive_path).await? {
        return Err(BackupError::ArchiveExists {
            name: name.to_string(),
        });
    }

    let source = source.to_path_buf();
    let target = archive_path.clone();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let file = std::fs::File::create(&target)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.append_dir_all(".", &source)?;
        builder.into_inner()?.finish()?;
        Ok(())
    })
    .await
    .map_err(std::io::Error::other)??;

    Ok(archive_path)
}

/// Deletes the oldest archives until at most `keep` remain.
///
/// - `keep < 0` disables rotation entirely.
/// - `protect` (the archive written this cycle) is never deleted.
/// - Individual deletion failures are logged and skipped; rotation never
///   fails the backup.
///
/// Returns the number of archives deleted.
pub async fn rotate(archive_dir: &Path, keep: i32, protect: &Path) -> std::io::Result<usize> {
    if keep < 0 {
        return Ok(0);
    }
    let keep = keep as usize;

    let mut archives: Vec<(PathBuf, SystemTime)> = Vec::new();
    let mut entries = fs::read_dir(archive_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        let created = meta.created().or_else(|_| meta.modified())?;
        archives.push((entry.path(), created));
    }

    if archives.len() <= keep {
        return Ok(0);
    }

    archives.sort_by_key(|(_, created)| *created);
    let excess = archives.len() - keep;

    let mut deleted = 0;
    for (path, _) in archives.into_iter().take(excess) {
        if path == protect {
            continue;
        }
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(archive = %path.display(), "rotated out old archive");
                deleted += 1;
            }
            Err(error) => {
                tracing::warn!(archive = %path.display(), %error, "could not delete old archive");
            }
        }
    }
    Ok(deleted)
}
