//! Rotating file writer
//!
//! Owns at most one open, buffered log file and decides on every write whether
//! the logically current file has changed. File names follow
//!
//! ```text
//! no rotation    {dir}/{prefix}
//! size           {dir}/{prefix}.{seq}
//! time           {dir}/{prefix}.{YYYY-MM-DD[-HH]}
//! time + size    {dir}/{prefix}.{YYYY-MM-DD[-HH]}.{seq}
//! ```
//!
//! The writer does no locking of its own. Callers must serialize access, either
//! by owning it exclusively or through [`crate::sink::SerializedSink`].

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::clock::{Clock, SystemClock};
use crate::config::SinkConfig;
use crate::error::{Result, SinkError};
use crate::sequence::{resolve_sequence_with_limit, sequenced_path, MAX_SEQUENCE};

/// Prefix used when the configured path ends with a separator
pub const DEFAULT_PREFIX: &str = "log";

/// The file currently receiving writes
#[derive(Debug)]
struct ActiveFile {
    path: PathBuf,
    out: BufWriter<File>,
    /// Bytes accepted into this file since it was opened
    bytes_written: u64,
}

/// Where the next write should land
#[derive(Debug, PartialEq, Eq)]
struct Target {
    path: PathBuf,
    bucket: Option<String>,
    sequence: Option<u64>,
}

/// A byte sink that rotates its backing file by time, size, or both
#[derive(Debug)]
pub struct RotatingWriter<C = SystemClock> {
    config: SinkConfig,
    dir: PathBuf,
    prefix: String,
    clock: C,
    active: Option<ActiveFile>,
    /// Last committed sequence; `None` until the first size-rotated open
    sequence: Option<u64>,
    /// Last committed time-bucket label
    time_bucket: Option<String>,
    /// Ceiling for the sequence scan
    sequence_limit: u64,
}

impl RotatingWriter<SystemClock> {
    /// Build a writer on the system clock, creating the log directory if needed
    pub fn new(config: SinkConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> RotatingWriter<C> {
    /// Build a writer reading time buckets from `clock`
    ///
    /// No file is opened until the first non-empty write.
    pub fn with_clock(config: SinkConfig, clock: C) -> Result<Self> {
        let (dir, prefix) = split_path(&config.path)?;

        fs::create_dir_all(&dir).map_err(|source| SinkError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        tracing::debug!(
            "File sink ready in {} with prefix {:?} (size: {}, time: {:?})",
            dir.display(),
            prefix,
            config.rotate_size_bytes,
            config.rotate_time
        );

        Ok(Self {
            config,
            dir,
            prefix,
            clock,
            active: None,
            sequence: None,
            time_bucket: None,
            sequence_limit: MAX_SEQUENCE,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_sequence_limit(mut self, limit: u64) -> Self {
        self.sequence_limit = limit;
        self
    }

    /// Write one record
    ///
    /// Empty input is a no-op. Returns the number of bytes accepted, which is
    /// always the full record on success.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.write_record(buf)
    }

    /// Flush and release the current file, resetting all rotation state
    ///
    /// Safe to call repeatedly. A later write starts over with a fresh rotation.
    pub fn close(&mut self) -> Result<()> {
        let result = match self.active.take() {
            Some(mut active) => {
                tracing::debug!("Closing log file {}", active.path.display());
                active.out.flush().map_err(SinkError::from)
            }
            None => Ok(()),
        };
        self.sequence = None;
        self.time_bucket = None;
        result
    }

    /// Path of the file currently open, if any
    pub fn current_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.path.as_path())
    }

    /// Bytes accepted into the current file, `None` when nothing is open
    pub fn bytes_written(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.bytes_written)
    }

    /// Committed size-rotation sequence
    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    /// Committed time-bucket label
    pub fn time_bucket(&self) -> Option<&str> {
        self.time_bucket.as_deref()
    }

    /// File prefix, `log` when the configured path ends with a separator
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn write_record(&mut self, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        self.rotate_or_continue()?;

        let active = match self.active.as_mut() {
            Some(active) => active,
            None => {
                return Err(SinkError::NoWritableFile(Box::new(SinkError::Io(
                    io::Error::new(io::ErrorKind::NotFound, "no log file open"),
                ))))
            }
        };

        active.out.write_all(buf)?;
        active.bytes_written += buf.len() as u64;

        if self.config.flush_immediately {
            active.out.flush()?;
        }

        // Rotate now so a file that just crossed the threshold is not grown
        // further by the next record. The record is already accepted, so a
        // failure here only gets logged; the next write re-evaluates.
        if let Err(err) = self.rotate() {
            tracing::warn!("Post-write rotation failed: {}", err);
        }

        Ok(buf.len())
    }

    /// Rotate, keeping the previous file if the new one cannot be opened
    fn rotate_or_continue(&mut self) -> Result<()> {
        match self.rotate() {
            Ok(()) => Ok(()),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => match self.active.as_ref() {
                Some(active) => {
                    tracing::warn!(
                        "Rotation failed, continuing in {}: {}",
                        active.path.display(),
                        err
                    );
                    Ok(())
                }
                None => Err(SinkError::NoWritableFile(Box::new(err))),
            },
        }
    }

    /// Switch files if the target changed since the last write
    fn rotate(&mut self) -> Result<()> {
        let target = self.target()?;

        if self.current_path() == Some(target.path.as_path()) {
            self.sequence = target.sequence;
            self.time_bucket = target.bucket;
            return Ok(());
        }

        let file = open_append(&target.path).map_err(|source| SinkError::Open {
            path: target.path.clone(),
            source,
        })?;

        if let Some(mut previous) = self.active.take() {
            if let Err(e) = previous.out.flush() {
                tracing::warn!("Failed to flush {}: {}", previous.path.display(), e);
            }
        }

        tracing::debug!("Rotated log file to {}", target.path.display());

        self.active = Some(ActiveFile {
            path: target.path,
            out: BufWriter::new(file),
            bytes_written: 0,
        });
        self.sequence = target.sequence;
        self.time_bucket = target.bucket;

        Ok(())
    }

    fn target(&self) -> Result<Target> {
        let mut path = self.dir.join(&self.prefix);

        let bucket = self.config.rotate_time.label(self.clock.now());
        if let Some(label) = &bucket {
            path = with_suffix(&path, label);
        }

        let sequence = if self.config.rotates_by_size() {
            let sequence = self.next_sequence(&bucket, &path)?;
            path = sequenced_path(&path, sequence);
            Some(sequence)
        } else {
            None
        };

        Ok(Target {
            path,
            bucket,
            sequence,
        })
    }

    /// Sequence for the next write; only touches the filesystem when the
    /// sequence has to be re-derived
    fn next_sequence(&self, bucket: &Option<String>, stem: &Path) -> Result<u64> {
        if *bucket != self.time_bucket {
            return self.resolve(0, stem);
        }

        match (self.sequence, self.bytes_written()) {
            (Some(sequence), Some(written)) if written < self.config.rotate_size_bytes => {
                Ok(sequence)
            }
            (Some(sequence), _) => self.resolve(sequence + 1, stem),
            (None, _) => self.resolve(0, stem),
        }
    }

    fn resolve(&self, start: u64, stem: &Path) -> Result<u64> {
        resolve_sequence_with_limit(start, stem, self.sequence_limit)
    }
}

impl<C: Clock> Write for RotatingWriter<C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_record(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.active.as_mut() {
            Some(active) => active.out.flush(),
            None => Ok(()),
        }
    }
}

/// Split a configured path into its directory and file prefix
pub fn split_path(path: &str) -> Result<(PathBuf, String)> {
    let idx = path
        .rfind(std::path::is_separator)
        .ok_or_else(|| SinkError::InvalidPath(path.to_string()))?;

    let prefix = &path[idx + 1..];
    let prefix = if prefix.is_empty() {
        DEFAULT_PREFIX
    } else {
        prefix
    };

    // "/app" lives in the root directory
    let dir = &path[..idx.max(1)];

    Ok((PathBuf::from(dir), prefix.to_string()))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn open_append(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options.open(path)
}
