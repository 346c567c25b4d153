//! Sequence number resolution for size-based rotation
//!
//! Finds the lowest `stem.N` that does not exist yet, so a new process never
//! appends into (or clobbers) a file left over from an earlier run.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{Result, SinkError};

/// Upper bound on candidates checked before giving up
pub const MAX_SEQUENCE: u64 = 1_000_000;

/// `stem.N`
pub fn sequenced_path(stem: &Path, sequence: u64) -> PathBuf {
    let mut name = OsString::from(stem.as_os_str());
    name.push(format!(".{}", sequence));
    PathBuf::from(name)
}

/// First sequence at or above `start` whose file does not exist
pub fn resolve_sequence(start: u64, stem: &Path) -> Result<u64> {
    resolve_sequence_with_limit(start, stem, MAX_SEQUENCE)
}

pub(crate) fn resolve_sequence_with_limit(start: u64, stem: &Path, limit: u64) -> Result<u64> {
    for sequence in start..limit {
        let candidate = sequenced_path(stem, sequence);
        // symlink_metadata so a dangling link still counts as taken
        if candidate.symlink_metadata().is_err() {
            if sequence > start {
                tracing::debug!(
                    "Skipped {} existing file(s) under {}, using sequence {}",
                    sequence - start,
                    stem.display(),
                    sequence
                );
            }
            return Ok(sequence);
        }
    }

    Err(SinkError::SequenceExhausted {
        stem: stem.to_path_buf(),
        limit,
    })
}
