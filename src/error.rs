//! Error types for the rotating file sink

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while constructing or writing through a sink
#[derive(Debug, Error)]
pub enum SinkError {
    /// The configured path is empty or has no directory component
    #[error("invalid sink path {0:?}: expected a directory and a file prefix")]
    InvalidPath(String),

    /// The log directory could not be created
    #[error("failed to create log directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A rotation target could not be opened
    #[error("failed to open log file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No free sequence number below the scan ceiling
    #[error("no free sequence number for {stem:?} below {limit}")]
    SequenceExhausted { stem: PathBuf, limit: u64 },

    /// Nothing is open and nothing could be opened
    #[error("no writable log file: {0}")]
    NoWritableFile(Box<SinkError>),

    /// Write or flush failure on the open handle
    #[error("log file I/O failed: {0}")]
    Io(#[from] io::Error),
}

impl SinkError {
    /// Errors the sink cannot continue past
    ///
    /// The host decides what to do with them; the sink itself never aborts.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SinkError::SequenceExhausted { .. } | SinkError::NoWritableFile(_)
        )
    }
}

impl From<SinkError> for io::Error {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, SinkError>;
