//! Spawns a rule's command for a dispatched event.
//!
//! The command runs as `/bin/sh -c <expanded cmd>` under the rule's
//! user, in its own session, with a rebuilt environment. Everything the
//! child needs (the passwd lookup, the argv and environment arrays, the
//! per-stage failure messages) is prepared in the parent, so that
//! between `fork` and `execve` the child only makes async-signal-safe
//! calls.

use std::ffi::{CStr, CString};
use std::io::Write;

use nix::unistd::{fork, ForkResult, User};

use crate::event::Event;
use crate::rules::Rule;
use crate::sink::{LogLevel, LogSink};
use crate::syslog;
use crate::template;

const SHELL: &str = "/bin/sh";
const DEFAULT_PATH: &str = "/usr/bin:/usr/local/bin";

static CHILD_FAIL_FMT: &CStr = c"unable to launch command: %s: %d";

/// The placeholder values for one dispatch, plus the two expanded
/// strings.
pub(crate) struct Expansion {
    /// The command after template expansion; what the shell runs.
    pub cmd: String,
    /// All placeholder bindings in canonical order; exported to the
    /// child as `CASPER_INOTIFY_*` environment variables. The expanded
    /// message travels here, under `CASPER_INOTIFY_MSG`.
    pub vars: Vec<(&'static str, String)>,
}

/// Expand a rule's command and message templates for an event.
///
/// `CASPER_INOTIFY_MSG` binds the *expanded* message;
/// `CASPER_INOTIFY_CMD` binds the *unexpanded* command template, so a
/// child can still see the raw template.
pub(crate) fn expand_templates(rule: &Rule, event: &Event, hostname: &str) -> Expansion {
    let base: Vec<(&'static str, String)> = vec![
        ("CASPER_INOTIFY_EVENT", event.name.clone()),
        ("CASPER_INOTIFY_OBJECT", event.object_kind_name().to_owned()),
        ("CASPER_INOTIFY_NAME", event.object_name.clone()),
        ("CASPER_INOTIFY_DATETIME", event.timestamp.clone()),
        ("CASPER_INOTIFY_HOSTNAME", hostname.to_owned()),
    ];

    let mut msg_bindings = base.clone();
    msg_bindings.push(("CASPER_INOTIFY_CMD", rule.cmd.clone()));
    let msg = template::expand(&rule.msg, &msg_bindings);

    let mut vars = base;
    vars.push(("CASPER_INOTIFY_MSG", msg));
    vars.push(("CASPER_INOTIFY_CMD", rule.cmd.clone()));
    let cmd = template::expand(&rule.cmd, &vars);

    Expansion { cmd, vars }
}

/// Build the complete child environment as `KEY=VALUE` strings.
///
/// Root keeps nothing but the event metadata; any other user gets the
/// minimal login-like set on top of it. The child's environment is
/// exactly this array; nothing is inherited.
pub(crate) fn build_environment(
    user_name: &str,
    is_root: bool,
    home: &str,
    shell: &str,
    vars: &[(&'static str, String)],
) -> Result<Vec<CString>, std::ffi::NulError> {
    let mut env = Vec::new();
    if !is_root {
        env.push(CString::new(format!("PATH={DEFAULT_PATH}"))?);
        env.push(CString::new(format!("LOGNAME={user_name}"))?);
        env.push(CString::new(format!("USER={user_name}"))?);
        env.push(CString::new(format!("USERNAME={user_name}"))?);
        env.push(CString::new(format!("HOME={home}"))?);
        env.push(CString::new(format!("SHELL={shell}"))?);
    }
    for (key, value) in vars {
        env.push(CString::new(format!("{key}={value}"))?);
    }
    Ok(env)
}

/// Fork and exec the rule's command for an event.
///
/// Spawn failures are not fatal to the daemon: they are written to
/// syslog and the event log, and dispatch continues. The child is
/// detached via `setsid` and never waited on.
///
/// # Errors
///
/// Returns an error only when the event log sink itself fails.
pub(crate) fn spawn<W: Write>(
    rule: &Rule,
    event: &Event,
    hostname: &str,
    sink: &mut LogSink<W>,
) -> std::io::Result<()> {
    let expansion = expand_templates(rule, event, hostname);

    let user = match User::from_name(&rule.user) {
        Ok(Some(user)) => user,
        Ok(None) => {
            syslog::error(&format!(
                "unable to launch {}: unknown user {}",
                expansion.cmd, rule.user
            ));
            return sink.write(
                LogLevel::Error,
                &format!("unknown user `{}`, command not launched", rule.user),
            );
        }
        Err(e) => {
            syslog::error(&format!(
                "unable to launch {}: get user info: {}",
                expansion.cmd, e
            ));
            return sink.write(
                LogLevel::Error,
                &format!("user lookup for `{}` failed: {e}", rule.user),
            );
        }
    };

    let Ok(prepared) = prepare(&user, &expansion) else {
        syslog::error(&format!(
            "unable to launch {}: NUL byte in command or environment",
            expansion.cmd
        ));
        return sink.write(
            LogLevel::Error,
            "NUL byte in command or environment, command not launched",
        );
    };

    let argv_ptrs = nul_terminated_ptrs(&prepared.argv);
    let envp_ptrs = nul_terminated_ptrs(&prepared.envp);
    let gid = user.gid.as_raw();
    let uid = user.uid.as_raw();
    let max_fd = max_fd();

    match unsafe { fork() } {
        Err(e) => {
            syslog::error(&format!("unable to launch {}: fork: {}", expansion.cmd, e));
            sink.write(LogLevel::Error, &format!("fork failed: {e}"))
        }
        Ok(ForkResult::Parent { .. }) => {
            syslog::notice(&format!("({}) {}", rule.user, expansion.cmd));
            Ok(())
        }
        Ok(ForkResult::Child) => {
            // Async-signal-safe calls only from here to execve.
            unsafe {
                for fd in 3..=max_fd {
                    libc::close(fd);
                }
                libc::setsid();
                for sig in [
                    libc::SIGINT,
                    libc::SIGHUP,
                    libc::SIGTERM,
                    libc::SIGUSR2,
                    libc::SIGPIPE,
                    libc::SIGTRAP,
                ] {
                    libc::signal(sig, libc::SIG_DFL);
                }
                if libc::setgid(gid) != 0 {
                    child_fail(&prepared.stage_setgid);
                }
                if libc::initgroups(prepared.user_name.as_ptr(), gid) != 0 {
                    child_fail(&prepared.stage_initgroups);
                }
                if libc::setuid(uid) != 0 {
                    child_fail(&prepared.stage_setuid);
                }
                libc::execve(
                    prepared.shell.as_ptr(),
                    argv_ptrs.as_ptr(),
                    envp_ptrs.as_ptr(),
                );
                // execve only returns on error
                child_fail(&prepared.stage_execve);
            }
        }
    }
}

/// Everything the child will touch, allocated before the fork.
struct Prepared {
    shell: CString,
    argv: Vec<CString>,
    envp: Vec<CString>,
    user_name: CString,
    stage_setgid: CString,
    stage_initgroups: CString,
    stage_setuid: CString,
    stage_execve: CString,
}

fn prepare(user: &User, expansion: &Expansion) -> Result<Prepared, std::ffi::NulError> {
    let shell = CString::new(SHELL)?;
    let argv = vec![
        shell.clone(),
        CString::new("-c")?,
        CString::new(expansion.cmd.as_str())?,
    ];
    let envp = build_environment(
        &user.name,
        user.uid.is_root(),
        &user.dir.to_string_lossy(),
        &user.shell.to_string_lossy(),
        &expansion.vars,
    )?;
    Ok(Prepared {
        shell,
        argv,
        envp,
        user_name: CString::new(user.name.as_str())?,
        stage_setgid: CString::new("set effective group ID")?,
        stage_initgroups: CString::new("initialize the group access list")?,
        stage_setuid: CString::new("set the effective user ID")?,
        stage_execve: CString::new("execute command")?,
    })
}

fn nul_terminated_ptrs(strings: &[CString]) -> Vec<*const libc::c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

/// Highest open file descriptor, computed in the parent because the
/// `/proc` walk may allocate.
fn max_fd() -> i32 {
    if let Ok(entries) = std::fs::read_dir("/proc/self/fd") {
        return entries
            .flatten()
            .filter_map(|e| e.file_name().to_str().and_then(|s| s.parse::<i32>().ok()))
            .max()
            .unwrap_or(1024);
    }
    let max = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    if max > 0 {
        max.min(65536) as i32
    } else {
        1024
    }
}

/// Report the failing stage and errno to syslog, then exit the child.
unsafe fn child_fail(stage: &CStr) -> ! {
    let errno = *libc::__errno_location();
    libc::syslog(libc::LOG_ERR, CHILD_FAIL_FMT.as_ptr(), stage.as_ptr(), errno);
    libc::_exit(255);
}
