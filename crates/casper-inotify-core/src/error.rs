//! Error types for the watch engine.

/// Fatal errors from the watch engine.
///
/// Per-rule registration failures are deliberately *not* represented
/// here: they are recorded on the rule itself and the rule moves to the
/// retry list, leaving the rest of the table running.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The configuration file could not be read.
    #[error("cannot read configuration `{path}`: {source}")]
    ConfigRead {
        /// Path that was attempted.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration document failed to parse.
    #[error("invalid configuration `{path}`: {source}")]
    ConfigParse {
        /// Path that was attempted.
        path: String,
        /// The underlying JSON parse error.
        source: serde_json::Error,
    },

    /// The host's name could not be determined. Fatal at startup.
    #[error("cannot determine hostname: {0}")]
    Hostname(std::io::Error),

    /// The inotify instance could not be created.
    #[error("inotify initialization failed: {0}")]
    InotifyInit(std::io::Error),

    /// The event log sink failed; the dispatch loop does not continue
    /// without a working sink.
    #[error("event log sink failure: {0}")]
    Sink(#[from] std::io::Error),
}
