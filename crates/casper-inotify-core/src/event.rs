//! The per-dispatch event record.

use crate::clock;
use crate::rules::Rule;
use crate::taxonomy::EventMask;

/// One dispatched filesystem event, synthesized from a kernel record
/// and the rule it resolved to. Ephemeral: built, filtered, expanded
/// into templates, then dropped.
#[derive(Debug, Clone)]
pub struct Event {
    /// Raw kernel mask of the record.
    pub mask: EventMask,
    /// `'d'` when the kernel flagged the object as a directory, else `'f'`.
    pub object_kind: char,
    /// Name of the object the event is about: the record's filename when
    /// the event originated inside a watched directory, otherwise the
    /// rule's URI.
    pub object_name: String,
    /// URI of the watched directory the object lives in, when the event
    /// originated inside one.
    pub parent_object_name: Option<String>,
    /// Whether the event originated inside a watched directory.
    pub inside_watched_directory: bool,
    /// Composite human action name, e.g. `"created, modified"`, or
    /// `"???"` when no known action bit is set.
    pub name: String,
    /// ISO-8601 timestamp captured at dispatch time.
    pub timestamp: String,
}

impl Event {
    /// Synthesize the event for one kernel record.
    ///
    /// `kernel_name` is the record's filename payload; its presence is
    /// what distinguishes an event inside a watched directory from an
    /// event on the watched object itself.
    #[must_use]
    pub fn synthesize(rule: &Rule, mask: EventMask, kernel_name: Option<String>) -> Self {
        let inside_watched_directory = kernel_name.is_some();
        let (object_name, parent_object_name) = match kernel_name {
            Some(name) => (name, Some(rule.uri.clone())),
            None => (rule.uri.clone(), None),
        };
        Self {
            mask,
            object_kind: if mask.contains(EventMask::ISDIR) { 'd' } else { 'f' },
            object_name,
            parent_object_name,
            inside_watched_directory,
            name: compose_action_name(mask),
            timestamp: clock::now_iso8601(),
        }
    }

    /// The object kind spelled out, for template substitution.
    #[must_use]
    pub const fn object_kind_name(&self) -> &'static str {
        if self.object_kind == 'd' {
            "directory"
        } else {
            "file"
        }
    }
}

/// Build the composite action name for a kernel mask.
///
/// The mask is walked in canonical order and each matching token is
/// appended once; multiple bits yield one comma-joined string, never
/// one name per bit. An unrecognized mask yields `"???"`.
#[must_use]
pub fn compose_action_name(mask: EventMask) -> String {
    let mut actions: Vec<&str> = Vec::new();
    if mask.intersects(EventMask::OPEN) {
        actions.push("open");
    }
    if mask.intersects(EventMask::CLOSE) {
        actions.push("closed");
    }
    if mask.intersects(EventMask::ACCESS) {
        actions.push("accessed");
    }
    if mask.intersects(EventMask::CREATE) {
        actions.push("created");
    }
    if mask.intersects(EventMask::MODIFY) {
        actions.push("modified");
    }
    if mask.intersects(EventMask::DELETE | EventMask::DELETE_SELF) {
        actions.push("deleted");
    }
    if mask.intersects(EventMask::IGNORED) {
        actions.push("ignored");
    }
    if actions.is_empty() {
        "???".to_owned()
    } else {
        actions.join(", ")
    }
}
