//! filesink - rotating file sink for log streams
//!
//! Accepts opaque byte records and places them in files rotated by hour, day,
//! accumulated size, or a combination of time and size.

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod sequence;
pub mod sink;
pub mod writer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RotateTime, SinkConfig};
pub use error::SinkError;
pub use logging::{init_file_logging, LogFormat, LoggingConfig, LoggingGuard};
pub use sequence::{resolve_sequence, MAX_SEQUENCE};
pub use sink::{SerializedSink, SinkWriter};
pub use writer::RotatingWriter;
