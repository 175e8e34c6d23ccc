//! # File manifest returned by the save-query phase.
//!
//! The `save query` response is a single console line repeating
//! `worldName/relativePath:byteCount` tokens. The byte count is the length
//! the file had when the hold froze the world — **authoritative** for the
//! copy phase, which must stop at exactly that many bytes even though the
//! file may keep growing on disk.
//!
//! Most entries live in the `db/` data subdirectory; a small fixed tail of
//! entries (`level.dat` and friends) belongs to the world root. Membership
//! is detected from the path itself when the token carries one; the
//! position-based tail heuristic is only a fallback for bare file names
//! emitted by older server builds.

use std::path::PathBuf;

use regex::Regex;

use crate::bedrock;
use crate::error::BackupError;

/// Trailing manifest entries assumed to be world-root metadata when the
/// token carries no subdirectory information.
const METADATA_TAIL: usize = 3;

/// One `(relativePath, frozenByteLength)` pair from the query response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Path relative to the world directory, `/`-separated.
    pub relative_path: String,
    /// Frozen byte length; the copy phase reads exactly this many bytes.
    pub length: u64,
}

impl ManifestEntry {
    /// Resolves the entry to a path relative to the world directory,
    /// applying the positional fallback for bare file names.
    pub fn resolve(&self, index: usize, total: usize) -> PathBuf {
        if self.relative_path.contains('/') {
            return PathBuf::from(&self.relative_path);
        }
        // Bare name: old builds omit the subdirectory. Everything except
        // the metadata tail lives in db/.
        if index + METADATA_TAIL < total {
            PathBuf::from("db").join(&self.relative_path)
        } else {
            PathBuf::from(&self.relative_path)
        }
    }
}

/// Ordered list of manifest entries for one backup invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Entries in the order the server reported them.
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Parses every `path:size` token scoped to `world_name` out of `line`.
    ///
    /// Fails when no token parses — a hold/query cycle that produced no
    /// manifest means the protocol went wrong and the backup must abort.
    pub fn parse(line: &str, world_name: &str) -> Result<Self, BackupError> {
        let pattern = bedrock::manifest_entry_pattern(world_name);
        let regex = Regex::new(&pattern).map_err(|_| BackupError::Manifest {
            line: line.to_string(),
        })?;

        let prefix_len = world_name.len();
        let mut entries = Vec::new();
        for caps in regex.captures_iter(line) {
            let raw_path = &caps[1];
            let relative = raw_path[prefix_len..]
                .trim_start_matches(['/', '\\'])
                .replace('\\', "/");
            let length = caps[2].parse::<u64>().map_err(|_| BackupError::Manifest {
                line: line.to_string(),
            })?;
            entries.push(ManifestEntry {
                relative_path: relative,
                length,
            });
        }

        if entries.is_empty() {
            return Err(BackupError::Manifest {
                line: line.to_string(),
            });
        }
        Ok(Self { entries })
    }
}
