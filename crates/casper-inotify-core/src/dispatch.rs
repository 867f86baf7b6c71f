//! Demultiplexes one kernel read buffer into per-rule work.
//!
//! Records are processed in buffer order. Each record resolves to a
//! rule through the `good` view, becomes an [`Event`], passes the
//! rule's glob filter, and then either runs the built-in
//! re-registration handler or spawns the rule's command. A record
//! carrying the kernel's `IGNORED` flag additionally demotes its rule
//! to the retry list.

use std::io::Write;

use crate::event::Event;
use crate::rules::{RuleAction, RuleTable};
use crate::sink::{LogLevel, LogSink};
use crate::spawn;
use crate::taxonomy::EventMask;
use crate::watcher::Inotify;
use crate::wire;

/// Dispatch every record of one read buffer.
///
/// # Errors
///
/// Returns an error only when the event log sink fails; everything
/// else is logged and dispatch continues with the next record.
pub(crate) fn dispatch_buffer<W: Write>(
    table: &mut RuleTable,
    inotify: &Inotify,
    sink: &mut LogSink<W>,
    hostname: &str,
    buf: &[u8],
) -> std::io::Result<()> {
    for record in wire::parse(buf) {
        let Some(idx) = table.lookup(record.wd) else {
            tracing::debug!(
                wd = record.wd,
                mask = record.mask,
                "event for descriptor not in watch list"
            );
            continue;
        };

        let mask = EventMask::from_bits_retain(record.mask);
        let rule = table.rule(idx).clone();
        let event = Event::synthesize(&rule, mask, record.name_str());

        if !rule.accepts_object(&event.object_name) {
            tracing::debug!(
                pattern = %rule.pattern,
                object = %event.object_name,
                "event skipped, no pattern match"
            );
            continue;
        }

        if rule.action == RuleAction::ReRegister {
            // The handler's return decides whether the pipeline
            // continues; re-registration never falls through to spawn.
            if !handle_re_register(table, inotify, sink, &event)? {
                continue;
            }
        }

        if event.name == "???" || event.name.is_empty() {
            sink.write(
                LogLevel::Event,
                &format!(
                    "[{}] {} '{}' was {:#010x}",
                    event.object_kind,
                    event.object_kind_name(),
                    event.object_name,
                    mask.bits()
                ),
            )?;
            sink.write(LogLevel::Warning, "event ignored")?;
        } else if !mask.contains(EventMask::IGNORED) {
            sink.write(
                LogLevel::Event,
                &format!(
                    "[{}] {} '{}' was {}",
                    event.object_kind,
                    event.object_kind_name(),
                    event.object_name,
                    event.name
                ),
            )?;
            spawn::spawn(&rule, &event, hostname, sink)?;
        }

        if mask.contains(EventMask::IGNORED) {
            // Watch removed explicitly (inotify_rm_watch) or
            // automatically (target deleted, filesystem unmounted).
            if table
                .demote(record.wd, "watch removed explicitly or automatically")
                .is_some()
            {
                sink.write(
                    LogLevel::Warning,
                    &format!("watch on {} removed, rule moved to retry list", rule.uri),
                )?;
            }
        }
    }
    Ok(())
}

/// Built-in handler for synthetic directory rules: register the watched
/// file that just appeared.
///
/// Applies only when a file (not a directory) was created inside the
/// watched directory and its full path is one the operator asked to
/// watch. Returns `false` on every path; a synthetic rule never
/// spawns.
fn handle_re_register<W: Write>(
    table: &mut RuleTable,
    inotify: &Inotify,
    sink: &mut LogSink<W>,
    event: &Event,
) -> std::io::Result<bool> {
    if event.mask.contains(EventMask::ISDIR) || !event.mask.contains(EventMask::CREATE) {
        return Ok(false);
    }
    let Some(parent) = event.parent_object_name.as_deref() else {
        return Ok(false);
    };

    let candidate = format!("{parent}/{}", event.object_name);
    if !table.is_user_file(&candidate) {
        return Ok(false);
    }

    let Some(idx) = table.take_bad_by_uri(&candidate) else {
        return Ok(false);
    };

    sink.write(LogLevel::Info, &format!("registering '{candidate}'..."))?;
    if inotify.register_rule(table.rule_mut(idx)) {
        table.mark_good(idx);
        sink.write(
            LogLevel::Info,
            &format!(
                "'{}' registered, wd {}",
                candidate,
                table.rule(idx).wd.unwrap_or(-1)
            ),
        )?;
    } else {
        table.mark_bad(idx);
        sink.write(LogLevel::Error, &table.rule(idx).error)?;
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::loader::build_rules;
    use crate::rules::{test_rule, RuleKind};
    use crate::wire::encode_record;

    // A user name that cannot exist keeps spawn from ever forking in
    // these tests; the failed lookup is itself logged, which the
    // assertions use as the spawn marker.
    const NO_USER: &str = "casper-test-no-such-user";

    fn registered_dir_table(
        inotify: &Inotify,
        uri: &str,
        mask: EventMask,
        pattern: &str,
    ) -> (RuleTable, i32) {
        let mut rule = test_rule(RuleKind::Directory, uri, mask, RuleAction::Command);
        rule.user = NO_USER.to_owned();
        if !pattern.is_empty() {
            rule.pattern = pattern.to_owned();
            rule.matcher = Some(
                globset::Glob::new(pattern)
                    .expect("pattern")
                    .compile_matcher(),
            );
        }
        let mut table = RuleTable::default();
        let idx = table.push(rule);
        assert!(inotify.register_rule(table.rule_mut(idx)));
        let wd = table.rule(idx).wd.expect("wd");
        table.mark_good(idx);
        (table, wd)
    }

    #[test]
    fn unknown_descriptor_is_skipped() {
        let inotify = Inotify::init().expect("inotify");
        let mut table = RuleTable::default();
        let mut out = Vec::new();
        let mut sink = LogSink::new(&mut out, LogLevel::Debug);

        let buf = encode_record(999, libc::IN_CREATE, 0, b"x");
        dispatch_buffer(&mut table, &inotify, &mut sink, "host", &buf).expect("dispatch");
        assert_eq!(table.good_len(), 0);
    }

    #[test]
    fn create_inside_watched_directory_reaches_spawn() {
        let dir = tempfile::tempdir().expect("tempdir");
        let uri = dir.path().to_str().expect("utf8");
        let inotify = Inotify::init().expect("inotify");
        let (mut table, wd) =
            registered_dir_table(&inotify, uri, EventMask::CREATE | EventMask::ONLYDIR, "");

        let mut out = Vec::new();
        let mut sink = LogSink::new(&mut out, LogLevel::Debug);
        let buf = encode_record(wd, libc::IN_CREATE, 0, b"foo");
        dispatch_buffer(&mut table, &inotify, &mut sink, "host", &buf).expect("dispatch");

        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("'foo' was created"), "log was: {text}");
        assert!(text.contains(NO_USER), "spawn should have been attempted");
    }

    #[test]
    fn pattern_filter_rejects_and_accepts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let uri = dir.path().to_str().expect("utf8");
        let inotify = Inotify::init().expect("inotify");
        let (mut table, wd) = registered_dir_table(
            &inotify,
            uri,
            EventMask::CREATE | EventMask::ONLYDIR,
            "*.log",
        );

        let mut rejected_out = Vec::new();
        let mut sink = LogSink::new(&mut rejected_out, LogLevel::Debug);
        let rejected = encode_record(wd, libc::IN_CREATE, 0, b"foo.txt");
        dispatch_buffer(&mut table, &inotify, &mut sink, "host", &rejected).expect("dispatch");
        let text = String::from_utf8(rejected_out).expect("utf8");
        assert!(!text.contains("foo.txt"), "rejected name must not dispatch");

        let mut accepted_out = Vec::new();
        let mut sink = LogSink::new(&mut accepted_out, LogLevel::Debug);
        let accepted = encode_record(wd, libc::IN_CREATE, 0, b"app.log");
        dispatch_buffer(&mut table, &inotify, &mut sink, "host", &accepted).expect("dispatch");
        let text = String::from_utf8(accepted_out).expect("utf8");
        assert!(text.contains("'app.log' was created"), "log was: {text}");
    }

    #[test]
    fn unrecognized_mask_is_logged_and_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let uri = dir.path().to_str().expect("utf8");
        let inotify = Inotify::init().expect("inotify");
        let (mut table, wd) =
            registered_dir_table(&inotify, uri, EventMask::ATTRIB | EventMask::ONLYDIR, "");

        let mut out = Vec::new();
        let mut sink = LogSink::new(&mut out, LogLevel::Debug);
        let buf = encode_record(wd, libc::IN_ATTRIB, 0, b"");
        dispatch_buffer(&mut table, &inotify, &mut sink, "host", &buf).expect("dispatch");

        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("event ignored"), "log was: {text}");
        assert!(!text.contains(NO_USER), "must not spawn for ???");
    }

    #[test]
    fn ignored_flag_demotes_the_rule() {
        let dir = tempfile::tempdir().expect("tempdir");
        let uri = dir.path().to_str().expect("utf8");
        let inotify = Inotify::init().expect("inotify");
        let (mut table, wd) = registered_dir_table(
            &inotify,
            uri,
            EventMask::DELETE_SELF | EventMask::ONLYDIR,
            "",
        );
        assert_eq!(table.good_len(), 1);

        let mut out = Vec::new();
        let mut sink = LogSink::new(&mut out, LogLevel::Debug);
        let buf = encode_record(wd, libc::IN_IGNORED, 0, b"");
        dispatch_buffer(&mut table, &inotify, &mut sink, "host", &buf).expect("dispatch");

        assert_eq!(table.good_len(), 0);
        assert_eq!(table.bad_len(), 1);
        assert!(table.rule(0).wd.is_none());
        assert!(!table.rule(0).warning.is_empty());
        let text = String::from_utf8(out).expect("utf8");
        // "ignored" resolves to an action name, so no spawn happens, but
        // the demotion is logged
        assert!(text.contains("retry list"), "log was: {text}");
        assert!(!text.contains(NO_USER));
    }

    #[test]
    fn delete_spawns_then_ignored_demotes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let uri = dir.path().to_str().expect("utf8");
        let inotify = Inotify::init().expect("inotify");
        let (mut table, wd) = registered_dir_table(
            &inotify,
            uri,
            EventMask::DELETE_SELF | EventMask::ONLYDIR,
            "",
        );

        let mut buf = encode_record(wd, libc::IN_DELETE_SELF, 0, b"");
        buf.extend_from_slice(&encode_record(wd, libc::IN_IGNORED, 0, b""));

        let mut out = Vec::new();
        let mut sink = LogSink::new(&mut out, LogLevel::Debug);
        dispatch_buffer(&mut table, &inotify, &mut sink, "host", &buf).expect("dispatch");

        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("was deleted"), "log was: {text}");
        assert!(text.contains(NO_USER), "delete should spawn");
        assert_eq!(table.good_len(), 0);
        assert_eq!(table.bad_len(), 1);
    }

    #[test]
    fn created_file_is_re_registered_from_the_retry_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        let parent = dir.path().to_str().expect("utf8").to_owned();
        let late = format!("{parent}/late");

        let cfg: Config = serde_json::from_str(&format!(
            r#"{{ "user": "{NO_USER}",
                 "files": [ {{ "uri": "{late}", "events": ["modify"] }} ] }}"#
        ))
        .expect("config");
        let mut table = build_rules(&cfg);
        assert_eq!(table.len(), 2);

        let inotify = Inotify::init().expect("inotify");
        // Registration pass: the synthetic parent watch lands in good,
        // the not-yet-existing file in bad.
        for idx in 0..table.len() {
            if inotify.register_rule(table.rule_mut(idx)) {
                table.mark_good(idx);
            } else {
                table.mark_bad(idx);
            }
        }
        assert_eq!(table.good_len(), 1);
        assert_eq!(table.bad_len(), 1);
        let aux_wd = table.rule(0).wd.expect("synthetic wd");

        // The file appears; dispatch the matching create record.
        std::fs::write(&late, b"x").expect("create file");
        let buf = encode_record(aux_wd, libc::IN_CREATE, 0, b"late");

        let mut out = Vec::new();
        let mut sink = LogSink::new(&mut out, LogLevel::Debug);
        dispatch_buffer(&mut table, &inotify, &mut sink, "host", &buf).expect("dispatch");

        assert_eq!(table.good_len(), 2, "file rule should be good now");
        assert_eq!(table.bad_len(), 0);
        assert!(table.rule(1).wd.is_some());
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("registering"), "log was: {text}");
        // the synthetic rule itself never spawns
        assert!(!text.contains(&format!("({NO_USER})")));
    }

    #[test]
    fn create_of_an_unwatched_file_is_not_applicable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let parent = dir.path().to_str().expect("utf8").to_owned();

        let cfg: Config = serde_json::from_str(&format!(
            r#"{{ "user": "{NO_USER}",
                 "files": [ {{ "uri": "{parent}/late", "events": ["modify"] }} ] }}"#
        ))
        .expect("config");
        let mut table = build_rules(&cfg);
        let inotify = Inotify::init().expect("inotify");
        for idx in 0..table.len() {
            if inotify.register_rule(table.rule_mut(idx)) {
                table.mark_good(idx);
            } else {
                table.mark_bad(idx);
            }
        }
        let aux_wd = table.rule(0).wd.expect("synthetic wd");

        let buf = encode_record(aux_wd, libc::IN_CREATE, 0, b"unrelated");
        let mut out = Vec::new();
        let mut sink = LogSink::new(&mut out, LogLevel::Debug);
        dispatch_buffer(&mut table, &inotify, &mut sink, "host", &buf).expect("dispatch");

        assert_eq!(table.good_len(), 1);
        assert_eq!(table.bad_len(), 1, "file rule must stay in retry");
    }

    #[test]
    fn directory_creation_does_not_trigger_re_registration() {
        let dir = tempfile::tempdir().expect("tempdir");
        let parent = dir.path().to_str().expect("utf8").to_owned();

        let cfg: Config = serde_json::from_str(&format!(
            r#"{{ "user": "{NO_USER}",
                 "files": [ {{ "uri": "{parent}/late", "events": ["modify"] }} ] }}"#
        ))
        .expect("config");
        let mut table = build_rules(&cfg);
        let inotify = Inotify::init().expect("inotify");
        for idx in 0..table.len() {
            if inotify.register_rule(table.rule_mut(idx)) {
                table.mark_good(idx);
            } else {
                table.mark_bad(idx);
            }
        }
        let aux_wd = table.rule(0).wd.expect("synthetic wd");

        // a directory named like the watched file must be rejected
        let buf = encode_record(
            aux_wd,
            libc::IN_CREATE | libc::IN_ISDIR,
            0,
            b"late",
        );
        let mut out = Vec::new();
        let mut sink = LogSink::new(&mut out, LogLevel::Debug);
        dispatch_buffer(&mut table, &inotify, &mut sink, "host", &buf).expect("dispatch");

        assert_eq!(table.bad_len(), 1, "file rule must stay in retry");
    }

    #[test]
    fn partition_invariant_holds_across_transitions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let parent = dir.path().to_str().expect("utf8").to_owned();
        let late = format!("{parent}/late");

        let cfg: Config = serde_json::from_str(&format!(
            r#"{{ "user": "{NO_USER}",
                 "files": [ {{ "uri": "{late}", "events": ["modify"] }} ] }}"#
        ))
        .expect("config");
        let mut table = build_rules(&cfg);
        let inotify = Inotify::init().expect("inotify");
        for idx in 0..table.len() {
            if inotify.register_rule(table.rule_mut(idx)) {
                table.mark_good(idx);
            } else {
                table.mark_bad(idx);
            }
        }
        assert_eq!(table.good_len() + table.bad_len(), table.len());

        std::fs::write(&late, b"x").expect("create file");
        let aux_wd = table.rule(0).wd.expect("wd");
        let buf = encode_record(aux_wd, libc::IN_CREATE, 0, b"late");
        let mut out = Vec::new();
        let mut sink = LogSink::new(&mut out, LogLevel::Debug);
        dispatch_buffer(&mut table, &inotify, &mut sink, "host", &buf).expect("dispatch");
        assert_eq!(table.good_len() + table.bad_len(), table.len());

        // wd ⇔ good membership, both directions
        for (idx, rule) in table.iter().enumerate() {
            match rule.wd {
                Some(wd) => assert_eq!(table.lookup(wd), Some(idx)),
                None => assert!(table.bad_indices().any(|b| b == idx)),
            }
        }
    }
}
