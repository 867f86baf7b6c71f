//! Event dispatch engine for the casper-inotify supervisor daemon.
//!
//! `casper-inotify-core` watches a configured set of files and
//! directories through the kernel's inotify interface and, for each
//! delivered event, spawns an external command under a per-rule user
//! identity with the event's metadata exported as `CASPER_INOTIFY_*`
//! environment variables.
//!
//! The engine is strictly single-threaded: one dispatch loop blocks in
//! the kernel read and processes each returned buffer to completion.
//! Files that do not exist yet become watchable through synthetic
//! parent-directory rules that re-register them the moment the kernel
//! reports their creation.

pub mod clock;
pub mod config;
mod dispatch;
pub mod engine;
pub mod error;
mod event;
mod loader;
pub mod rules;
pub mod sink;
mod spawn;
pub mod syslog;
pub mod taxonomy;
pub mod template;
mod watcher;
mod wire;

pub use config::{load_config, Config, DEFAULT_MESSAGE};
pub use engine::Engine;
pub use error::WatchError;
pub use event::Event;
pub use sink::{open_log_file, LogLevel, LogSink};
pub use taxonomy::EventMask;
