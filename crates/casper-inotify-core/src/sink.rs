//! The event log sink.
//!
//! An append-only text stream of records shaped
//! `"<iso8601>, <pid>, <level>, <message>"`. Level filtering happens
//! here, in the sink; callers log unconditionally. Every record is
//! flushed as soon as it is written.

use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use crate::clock;

/// Log record levels, in threshold order: a sink at level `L` accepts
/// every record whose level is at or below `L`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Informational lifecycle records.
    Info,
    /// Something unexpected but survivable.
    Warning,
    /// An operation failed.
    Error,
    /// A dispatched filesystem event.
    Event,
    /// Verbose diagnostics.
    Debug,
}

impl LogLevel {
    /// The level's name as it appears in log records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Warning => "Warning",
            Self::Error => "Error",
            Self::Event => "Event",
            Self::Debug => "Debug",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "event" => Ok(Self::Event),
            "debug" => Ok(Self::Debug),
            other => Err(format!(
                "unknown log level `{other}` (expected info, warning, error, event or debug)"
            )),
        }
    }
}

/// Writes log records to an append-only text stream.
pub struct LogSink<W: Write> {
    out: W,
    level: LogLevel,
    pid: u32,
}

impl<W: Write> LogSink<W> {
    /// Create a sink over the given writer, accepting records at or
    /// below `level`.
    pub fn new(out: W, level: LogLevel) -> Self {
        Self {
            out,
            level,
            pid: clock::pid(),
        }
    }

    /// Append one record, if `level` passes the sink's threshold.
    ///
    /// Flushes after writing.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error; a sink that cannot be written
    /// is fatal to the dispatch loop.
    pub fn write(&mut self, level: LogLevel, message: &str) -> std::io::Result<()> {
        if level > self.level {
            return Ok(());
        }
        writeln!(
            self.out,
            "{}, {:>8}, {:<10}, {}",
            clock::now_iso8601(),
            self.pid,
            level.as_str(),
            message
        )?;
        self.out.flush()
    }

    /// Flush any buffered output.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.out.flush()
    }
}

/// Open an append-only log file for use as a sink target.
///
/// Creates the file if it does not exist.
///
/// # Errors
///
/// Returns the underlying I/O error.
pub fn open_log_file(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}
