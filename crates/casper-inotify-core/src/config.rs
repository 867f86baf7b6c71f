//! The configuration document.
//!
//! A JSON object with optional top-level defaults and two rule arrays:
//!
//! ```json
//! {
//!   "user": "nobody",
//!   "command": "logger ${CASPER_INOTIFY_MSG}",
//!   "directories": [
//!     { "uri": "/var/spool/drop", "events": ["create"], "pattern": "*.job" }
//!   ],
//!   "files": [
//!     { "uri": "/etc/app/app.conf", "events": ["modify"], "user": "app" }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::WatchError;

/// Message template used when neither the document nor the element
/// supplies one.
pub const DEFAULT_MESSAGE: &str = "CASPER-INOTIFY :: WARNING :: ${CASPER_INOTIFY_NAME} \
     ${CASPER_INOTIFY_OBJECT} was ${CASPER_INOTIFY_EVENT} @ ${CASPER_INOTIFY_HOSTNAME} \
     [ ${CASPER_INOTIFY_DATETIME} ]";

/// Top-level configuration document.
///
/// Unknown keys are ignored so a document can carry operator notes or
/// settings for other tools.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Default OS user for spawned commands.
    pub user: Option<String>,
    /// Default command template.
    pub command: Option<String>,
    /// Default message template.
    pub message: Option<String>,
    /// Directory watch rules.
    #[serde(default)]
    pub directories: Vec<RuleSpec>,
    /// File watch rules.
    #[serde(default)]
    pub files: Vec<RuleSpec>,
}

/// One watch rule element, shared by `directories` and `files`.
#[derive(Debug, Default, Deserialize)]
pub struct RuleSpec {
    /// Absolute path to watch.
    pub uri: String,
    /// Event keywords (see the taxonomy); unknown keywords are ignored.
    #[serde(default)]
    pub events: Vec<String>,
    /// Override for the default user.
    pub user: Option<String>,
    /// Override for the default command template.
    pub command: Option<String>,
    /// Override for the default message template.
    pub message: Option<String>,
    /// Optional glob filtering the event's object name.
    pub pattern: Option<String>,
}

/// Load and parse a configuration file.
///
/// # Errors
///
/// Returns [`WatchError::ConfigRead`] if the file cannot be read, and
/// [`WatchError::ConfigParse`] if it is not a valid document. Both are
/// fatal at startup.
pub fn load_config(path: &Path) -> Result<Config, WatchError> {
    let data = std::fs::read_to_string(path).map_err(|source| WatchError::ConfigRead {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| WatchError::ConfigParse {
        path: path.display().to_string(),
        source,
    })
}
