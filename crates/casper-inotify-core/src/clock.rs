//! Timestamps and host identity.

use chrono::Utc;

/// Current time as ISO-8601 with timezone, always UTC with a `+00:00`
/// suffix, e.g. `2026-08-02T14:07:33+00:00`.
#[must_use]
pub fn now_iso8601() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S+00:00").to_string()
}

/// The host's name.
///
/// # Errors
///
/// Returns the underlying OS error; a host without a resolvable name is a
/// fatal startup condition for the daemon.
pub fn hostname() -> std::io::Result<String> {
    let name = nix::unistd::gethostname()
        .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
    Ok(name.to_string_lossy().into_owned())
}

/// This daemon's process identifier.
#[must_use]
pub fn pid() -> u32 {
    std::process::id()
}
