//! The kernel watch adapter: a thin owner of the inotify instance.
//!
//! Registration and removal go through raw `inotify_add_watch` /
//! `inotify_rm_watch` so the watch descriptors stay plain integers the
//! rule table can key on, and the blocking read hands back the raw
//! record buffer for [`crate::wire`] to parse.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use crate::rules::Rule;
use crate::taxonomy::EventMask;
use crate::wire;

/// Most records a single blocking read will return.
pub const MAX_EVENTS: usize = 1024;

/// Filename capacity per record.
pub const NAME_MAX: usize = 255;

/// Read buffer size: worst case of `MAX_EVENTS` records, each carrying
/// a name of `NAME_MAX` bytes plus its NUL.
pub const BUFFER_LEN: usize = MAX_EVENTS * (wire::HEADER_SIZE + NAME_MAX + 1);

/// An owned inotify instance.
#[derive(Debug)]
pub struct Inotify {
    fd: OwnedFd,
}

impl Inotify {
    /// Create the inotify instance (close-on-exec).
    ///
    /// # Errors
    ///
    /// Returns the OS error from `inotify_init1`.
    pub fn init() -> io::Result<Self> {
        let fd = unsafe { libc::inotify_init1(libc::IN_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// Register a path, returning the kernel-assigned watch descriptor.
    ///
    /// # Errors
    ///
    /// Returns the OS error from `inotify_add_watch` (commonly `ENOENT`
    /// for a path that does not exist yet).
    pub fn register(&self, uri: &str, mask: EventMask) -> io::Result<i32> {
        let path = CString::new(uri)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;
        let wd = unsafe {
            libc::inotify_add_watch(self.fd.as_raw_fd(), path.as_ptr(), mask.bits())
        };
        if wd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(wd)
    }

    /// Remove a watch descriptor.
    ///
    /// # Errors
    ///
    /// Returns the OS error from `inotify_rm_watch`.
    pub fn unregister(&self, wd: i32) -> io::Result<()> {
        let rv = unsafe { libc::inotify_rm_watch(self.fd.as_raw_fd(), wd) };
        if rv != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Attempt registration of a rule, storing the outcome on the rule.
    ///
    /// On success the descriptor is stored and any previous error or
    /// warning is cleared; on failure the error text (with the OS
    /// error) is recorded and the rule keeps its unregistered sentinel.
    pub fn register_rule(&self, rule: &mut Rule) -> bool {
        match self.register(&rule.uri, rule.mask) {
            Ok(wd) => {
                rule.wd = Some(wd);
                rule.error.clear();
                rule.warning.clear();
                true
            }
            Err(e) => {
                rule.error = format!("cannot register watch for {}: {}", rule.uri, e);
                false
            }
        }
    }

    /// Drop a rule's watch, if it holds one.
    ///
    /// Failures are logged and leave the descriptor in place; success
    /// resets the rule to the unregistered sentinel.
    pub fn unregister_rule(&self, rule: &mut Rule) -> bool {
        let Some(wd) = rule.wd else {
            return true;
        };
        if let Err(e) = self.unregister(wd) {
            tracing::error!(uri = %rule.uri, wd, error = %e, "cannot unregister watch");
            return false;
        }
        rule.wd = None;
        rule.error.clear();
        rule.warning.clear();
        true
    }

    /// One blocking read of the event stream.
    ///
    /// Returns the number of valid bytes in `buf`. The caller parses
    /// them with [`crate::wire::parse`].
    ///
    /// # Errors
    ///
    /// Returns the OS error from `read`; `ErrorKind::Interrupted`
    /// (`EINTR`) is how a signal wakes the dispatch loop to re-check
    /// its shutdown flag.
    pub fn wait(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr().cast::<libc::c_void>(),
                buf.len(),
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{test_rule, RuleAction, RuleKind};

    #[test]
    fn register_nonexistent_path_fails_with_enoent() {
        let inotify = Inotify::init().expect("inotify");
        let err = inotify
            .register("/nonexistent/definitely/missing", EventMask::MODIFY)
            .expect_err("should fail");
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }

    #[test]
    fn register_rule_records_the_error() {
        let inotify = Inotify::init().expect("inotify");
        let mut rule = test_rule(
            RuleKind::File,
            "/nonexistent/definitely/missing",
            EventMask::MODIFY,
            RuleAction::Command,
        );
        assert!(!inotify.register_rule(&mut rule));
        assert!(rule.wd.is_none());
        assert!(rule.error.contains("/nonexistent/definitely/missing"));
    }

    #[test]
    fn live_watch_delivers_create_event() {
        let dir = tempfile::tempdir().expect("tempdir");
        let uri = dir.path().to_str().expect("utf8").to_owned();

        let inotify = Inotify::init().expect("inotify");
        let wd = inotify
            .register(&uri, EventMask::CREATE | EventMask::ONLYDIR)
            .expect("register");

        std::fs::write(dir.path().join("fresh.txt"), b"x").expect("write");

        let mut buf = vec![0u8; BUFFER_LEN];
        let n = inotify.wait(&mut buf).expect("read");
        let records: Vec<_> = wire::parse(&buf[..n]).collect();
        assert!(!records.is_empty());
        assert_eq!(records[0].wd, wd);
        assert_ne!(records[0].mask & libc::IN_CREATE, 0);
        assert_eq!(records[0].name_str().as_deref(), Some("fresh.txt"));
    }

    #[test]
    fn unregister_rule_resets_the_sentinel() {
        let dir = tempfile::tempdir().expect("tempdir");
        let uri = dir.path().to_str().expect("utf8").to_owned();

        let inotify = Inotify::init().expect("inotify");
        let mut rule = test_rule(
            RuleKind::Directory,
            &uri,
            EventMask::CREATE | EventMask::ONLYDIR,
            RuleAction::Command,
        );
        assert!(inotify.register_rule(&mut rule));
        assert!(rule.wd.is_some());

        assert!(inotify.unregister_rule(&mut rule));
        assert!(rule.wd.is_none());
        // idempotent when already unregistered
        assert!(inotify.unregister_rule(&mut rule));
    }
}
