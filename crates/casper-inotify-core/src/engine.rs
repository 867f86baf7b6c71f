//! Daemon lifecycle: load, register, dispatch, unload.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::clock;
use crate::config::Config;
use crate::dispatch::dispatch_buffer;
use crate::error::WatchError;
use crate::loader::build_rules;
use crate::rules::{Rule, RuleTable};
use crate::sink::{LogLevel, LogSink};
use crate::taxonomy;
use crate::watcher::{Inotify, BUFFER_LEN};

/// The supervisor engine.
///
/// Owns the rule table and the event log sink for the lifetime of the
/// daemon. Strictly single-threaded: one dispatch loop, blocking in
/// the kernel read, processing each returned buffer to completion.
pub struct Engine<W: Write> {
    sink: LogSink<W>,
    table: RuleTable,
    hostname: String,
}

impl<W: Write> Engine<W> {
    /// Create an engine over an event log sink.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Hostname`] when the host's name cannot be
    /// determined; fatal, since every dispatched event embeds it.
    pub fn new(sink: LogSink<W>) -> Result<Self, WatchError> {
        let hostname = clock::hostname().map_err(WatchError::Hostname)?;
        Ok(Self {
            sink,
            table: RuleTable::default(),
            hostname,
        })
    }

    /// Translate a configuration document into the rule table.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Sink`] when the event log cannot be
    /// written.
    pub fn load(&mut self, cfg: &Config) -> Result<(), WatchError> {
        self.sink.write(LogLevel::Info, "Loading...")?;
        for field in taxonomy::FIELDS {
            self.sink.write(
                LogLevel::Debug,
                &format!(
                    "{:#010x} - {:<16} - {:<13} - {}",
                    field.mask.bits(),
                    field.name,
                    field.key,
                    field.description
                ),
            )?;
        }
        self.table = build_rules(cfg);
        self.sink.write(
            LogLevel::Info,
            &format!("{} rule(s) loaded", self.table.len()),
        )?;
        Ok(())
    }

    /// The rule table, for inspection.
    #[must_use]
    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    /// Register every rule and dispatch events until `shutdown` is set.
    ///
    /// Registration failures are per-rule and non-fatal: the rule is
    /// recorded in the retry list and the rest of the table proceeds.
    /// Dispatch errors are logged and the loop continues; a failing log
    /// sink ends the loop. All watches and the inotify instance are
    /// released before returning.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InotifyInit`] when the inotify instance
    /// cannot be created and [`WatchError::Sink`] when the event log
    /// cannot be written.
    pub fn watch(&mut self, shutdown: &AtomicBool) -> Result<(), WatchError> {
        self.sink.write(LogLevel::Info, "Initializing...")?;
        let inotify = Inotify::init().map_err(WatchError::InotifyInit)?;

        self.sink.write(LogLevel::Info, "Registering...")?;
        for idx in 0..self.table.len() {
            if inotify.register_rule(self.table.rule_mut(idx)) {
                self.table.mark_good(idx);
            } else {
                self.table.mark_bad(idx);
            }
        }
        self.log_table()?;
        self.sink.write(LogLevel::Info, "Ready...")?;

        let mut buf = vec![0u8; BUFFER_LEN];
        let result = loop {
            if shutdown.load(Ordering::Relaxed) {
                break Ok(());
            }
            if let Err(e) = self.sink.write(LogLevel::Debug, "Waiting...") {
                break Err(WatchError::Sink(e));
            }
            match inotify.wait(&mut buf) {
                Ok(n) => {
                    if let Err(e) = dispatch_buffer(
                        &mut self.table,
                        &inotify,
                        &mut self.sink,
                        &self.hostname,
                        &buf[..n],
                    ) {
                        // the sink is gone; nothing left to log to
                        break Err(WatchError::Sink(e));
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {
                    // signal delivery; loop back to the shutdown check
                }
                Err(e) => {
                    if let Err(se) = self
                        .sink
                        .write(LogLevel::Error, &format!("event read failed: {e}"))
                    {
                        break Err(WatchError::Sink(se));
                    }
                }
            }
        };

        self.teardown(&inotify)?;
        result
    }

    /// Log the registration table: one line per rule with its outcome.
    fn log_table(&mut self) -> Result<(), WatchError> {
        let width = self
            .table
            .iter()
            .map(|r| r.uri.len())
            .max()
            .unwrap_or(0);
        for idx in 0..self.table.len() {
            let rule = self.table.rule(idx).clone();
            self.log_rule(&rule, width)?;
        }
        Ok(())
    }

    fn log_rule(&mut self, rule: &Rule, width: usize) -> Result<(), WatchError> {
        let suffix = if rule.pattern.is_empty() {
            String::new()
        } else {
            format!(", {}", rule.pattern)
        };
        match rule.wd {
            Some(wd) => self.sink.write(
                LogLevel::Info,
                &format!(
                    " ok [{}] {:<width$}, {:#010x} -> {}{}",
                    rule.kind.tag(),
                    rule.uri,
                    rule.mask.bits(),
                    wd,
                    suffix
                ),
            )?,
            None => {
                self.sink.write(
                    LogLevel::Info,
                    &format!(
                        "!ok [{}] {:<width$}, {:#010x}",
                        rule.kind.tag(),
                        rule.uri,
                        rule.mask.bits()
                    ),
                )?;
                if !rule.error.is_empty() {
                    self.sink.write(LogLevel::Error, &rule.error)?;
                } else if !rule.warning.is_empty() {
                    self.sink.write(LogLevel::Warning, &rule.warning)?;
                }
            }
        }
        Ok(())
    }

    /// Release every watch, drop all rules, and flush the sink.
    fn teardown(&mut self, inotify: &Inotify) -> Result<(), WatchError> {
        for idx in 0..self.table.len() {
            inotify.unregister_rule(self.table.rule_mut(idx));
        }
        self.table.clear();
        self.sink.write(LogLevel::Info, "Stopped")?;
        self.sink.flush()?;
        Ok(())
    }
}
