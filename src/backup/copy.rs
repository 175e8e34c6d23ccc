//! # Copy primitives for the backup coordinator.
//!
//! Two copy modes exist:
//!
//! - [`copy_truncated`] reproduces one manifest entry: exactly the recorded
//!   number of bytes, regardless of the source file's current on-disk size
//!   (the process is live and the file may still be growing).
//! - [`copy_dir_recursive`] mirrors a whole directory tree; used for full
//!   copies when the process is stopped.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::BackupError;

/// Copies exactly `length` bytes of `src` to `dst`, creating parent
/// directories as needed.
///
/// A source shorter than `length` aborts with
/// [`BackupError::TruncatedSource`] — the manifest promised bytes the file
/// no longer has, which means the snapshot would be corrupt.
pub async fn copy_truncated(src: &Path, dst: &Path, length: u64) -> Result<(), BackupError> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    let source = fs::File::open(src).await?;
    let mut taken = source.take(length);
    let mut target = fs::File::create(dst).await?;
    let copied = tokio::io::copy(&mut taken, &mut target).await?;
    target.flush().await?;

    if copied < length {
        return Err(BackupError::TruncatedSource {
            path: src.to_path_buf(),
            expected: length,
            actual: copied,
        });
    }
    Ok(())
}

/// Recursively copies every file under `src` into `dst`; returns the number
/// of files copied.
pub async fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<u64> {
    fs::create_dir_all(dst).await?;

    let mut copied = 0u64;
    let mut pending: Vec<PathBuf> = vec![src.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let relative = path
                .strip_prefix(src)
                .map_err(std::io::Error::other)?
                .to_path_buf();
            let target = dst.join(relative);

            let kind = entry.file_type().await?;
            if kind.is_dir() {
                fs::create_dir_all(&target).await?;
                pending.push(path);
            } else if kind.is_file() {
                fs::copy(&path, &target).await?;
                copied += 1;
            }
        }
    }
    Ok(copied)
}

/// Removes `path` if it exists and recreates it empty.
pub async fn clear_dir(path: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_bytes(path: &Path, len: usize) {
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(path, vec![0xAB; len]).await.unwrap();
    }

    #[tokio::test]
    async fn test_copies_exactly_the_recorded_length() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src/db/000001.ldb");
        let dst = dir.path().join("dst/db/000001.ldb");
        write_bytes(&src, 100_000).await;

        copy_truncated(&src, &dst, 98_304).await.unwrap();

        assert_eq!(fs::metadata(&dst).await.unwrap().len(), 98_304);
        // Source untouched.
        assert_eq!(fs::metadata(&src).await.unwrap().len(), 100_000);
    }

    #[tokio::test]
    async fn test_equal_length_copies_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src/level.dat");
        let dst = dir.path().join("dst/level.dat");
        write_bytes(&src, 4_096).await;

        copy_truncated(&src, &dst, 4_096).await.unwrap();
        assert_eq!(fs::metadata(&dst).await.unwrap().len(), 4_096);
    }

    #[tokio::test]
    async fn test_short_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src/db/short.ldb");
        let dst = dir.path().join("dst/db/short.ldb");
        write_bytes(&src, 10).await;

        let err = copy_truncated(&src, &dst, 100).await.unwrap_err();
        match err {
            BackupError::TruncatedSource {
                expected, actual, ..
            } => {
                assert_eq!(expected, 100);
                assert_eq!(actual, 10);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_recursive_copy_mirrors_tree() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("world");
        write_bytes(&src.join("level.dat"), 16).await;
        write_bytes(&src.join("db/CURRENT"), 8).await;
        write_bytes(&src.join("db/lost/000003.ldb"), 32).await;

        let dst = dir.path().join("copy");
        let copied = copy_dir_recursive(&src, &dst).await.unwrap();

        assert_eq!(copied, 3);
        assert_eq!(fs::metadata(dst.join("level.dat")).await.unwrap().len(), 16);
        assert_eq!(
            fs::metadata(dst.join("db/lost/000003.ldb")).await.unwrap().len(),
            32
        );
    }

    #[tokio::test]
    async fn test_clear_dir_empties_existing_contents() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("dest");
        write_bytes(&target.join("stale.bin"), 4).await;

        clear_dir(&target).await.unwrap();

        assert!(target.exists());
        let mut entries = fs::read_dir(&target).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }
}
