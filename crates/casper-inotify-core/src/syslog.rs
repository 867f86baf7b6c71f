//! Thin binding to the platform syslog.
//!
//! Spawn outcomes go to syslog (facility `cron`, ident fixed to the
//! service abbreviation) so they land next to the other job-runner
//! records on the host, independently of the daemon's own event log.

use std::ffi::{CStr, CString};

static IDENT: &CStr = c"casper-inotify";
static FMT: &CStr = c"%s";

/// Open the syslog connection. Call once at startup.
pub fn open() {
    unsafe {
        libc::openlog(IDENT.as_ptr(), libc::LOG_CONS | libc::LOG_PID, libc::LOG_CRON);
    }
}

/// Write a notice-level record.
pub fn notice(message: &str) {
    log(libc::LOG_NOTICE, message);
}

/// Write an error-level record.
pub fn error(message: &str) {
    log(libc::LOG_ERR, message);
}

fn log(priority: libc::c_int, message: &str) {
    // A message with an interior NUL cannot be passed through; drop it
    // rather than truncate silently.
    let Ok(c) = CString::new(message) else {
        return;
    };
    unsafe {
        libc::syslog(priority, FMT.as_ptr(), c.as_ptr());
    }
}

/// Close the syslog connection. Call once at shutdown.
pub fn close() {
    unsafe {
        libc::closelog();
    }
}
