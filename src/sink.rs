//! Shared, serialized access to a [`RotatingWriter`]
//!
//! The writer itself assumes a single caller. `SerializedSink` makes that
//! contract explicit with a mutex so one sink can be shared between threads
//! and handed to `tracing-subscriber` as a [`MakeWriter`].

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing_subscriber::fmt::MakeWriter;

use crate::clock::{Clock, SystemClock};
use crate::config::SinkConfig;
use crate::error::{Result, SinkError};
use crate::writer::RotatingWriter;

/// Cloneable handle to a mutex-guarded rotating writer
#[derive(Debug)]
pub struct SerializedSink<C = SystemClock> {
    inner: Arc<Mutex<RotatingWriter<C>>>,
}

impl<C> Clone for SerializedSink<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl SerializedSink<SystemClock> {
    /// Build the writer and wrap it
    pub fn open(config: SinkConfig) -> Result<Self> {
        Ok(Self::new(RotatingWriter::new(config)?))
    }
}

impl<C: Clock> SerializedSink<C> {
    pub fn new(writer: RotatingWriter<C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// Write one record under the lock
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        self.lock().write(buf)
    }

    /// Flush buffered bytes without closing
    pub fn flush(&self) -> Result<()> {
        Write::flush(&mut *self.lock()).map_err(SinkError::from)
    }

    /// Flush and release the current file; idempotent
    pub fn close(&self) -> Result<()> {
        self.lock().close()
    }

    /// Path of the file currently open, if any
    pub fn current_path(&self) -> Option<PathBuf> {
        self.lock().current_path().map(|p| p.to_path_buf())
    }

    /// Copy newline-terminated records from `reader` into the sink
    ///
    /// Bytes are passed through untouched; a final record without a newline
    /// gets one. Returns the number of records written.
    pub fn pipe_records<R: BufRead>(&self, mut reader: R) -> Result<u64> {
        let mut record = Vec::new();
        let mut records = 0u64;
        loop {
            record.clear();
            if reader.read_until(b'\n', &mut record)? == 0 {
                return Ok(records);
            }
            if record.last() != Some(&b'\n') {
                record.push(b'\n');
            }
            self.write(&record)?;
            records += 1;
        }
    }

    /// A writer that holds the lock for each call
    pub fn writer(&self) -> SinkWriter<C> {
        SinkWriter { sink: self.clone() }
    }

    // Writer state stays consistent across a panic, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, RotatingWriter<C>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// `std::io::Write` view of a [`SerializedSink`]
#[derive(Debug)]
pub struct SinkWriter<C = SystemClock> {
    sink: SerializedSink<C>,
}

impl<C: Clock> Write for SinkWriter<C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.write(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush().map_err(io::Error::from)
    }
}

impl<'a, C: Clock + 'static> MakeWriter<'a> for SerializedSink<C> {
    type Writer = SinkWriter<C>;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread;
    use tempfile::TempDir;

    fn sink_in(temp_dir: &TempDir) -> SerializedSink {
        let path = temp_dir.path().join("app");
        let config = SinkConfig::new(path.to_string_lossy()).unwrap();
        SerializedSink::open(config).unwrap()
    }

    #[test]
    fn test_write_and_close() {
        let temp_dir = TempDir::new().unwrap();
        let sink = sink_in(&temp_dir);

        assert_eq!(sink.write(b"hello\n").unwrap(), 6);
        assert_eq!(sink.current_path(), Some(temp_dir.path().join("app")));
        sink.close().unwrap();
        sink.close().unwrap();

        assert!(sink.current_path().is_none());
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("app")).unwrap(),
            "hello\n"
        );
    }

    #[test]
    fn test_concurrent_writers_do_not_interleave_records() {
        let temp_dir = TempDir::new().unwrap();
        let sink = sink_in(&temp_dir);

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let sink = sink.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        let line = format!("thread {} record {:03}\n", t, i);
                        sink.write(line.as_bytes()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        sink.close().unwrap();

        let content = fs::read_to_string(temp_dir.path().join("app")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 1000);
        assert!(lines.iter().all(|l| l.starts_with("thread ") && l.len() == 19));
    }

    #[test]
    fn test_pipe_records_passes_raw_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let sink = sink_in(&temp_dir);

        let input: &[u8] = b"good line\n\xff\xfe binary bytes\nafter";
        let records = sink.pipe_records(io::Cursor::new(input)).unwrap();
        sink.close().unwrap();

        assert_eq!(records, 3);
        assert_eq!(
            fs::read(temp_dir.path().join("app")).unwrap(),
            b"good line\n\xff\xfe binary bytes\nafter\n".to_vec()
        );
    }

    #[test]
    fn test_pipe_records_empty_input() {
        let temp_dir = TempDir::new().unwrap();
        let sink = sink_in(&temp_dir);

        assert_eq!(sink.pipe_records(io::empty()).unwrap(), 0);
        assert!(sink.current_path().is_none());
    }

    #[test]
    fn test_io_writer_view() {
        let temp_dir = TempDir::new().unwrap();
        let sink = sink_in(&temp_dir);

        let mut writer = sink.make_writer();
        writeln!(writer, "via io::Write").unwrap();
        writer.flush().unwrap();

        assert_eq!(
            fs::read_to_string(temp_dir.path().join("app")).unwrap(),
            "via io::Write\n"
        );
    }
}
