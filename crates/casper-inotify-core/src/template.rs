//! Literal `${NAME}` placeholder substitution for command and message
//! strings.
//!
//! Substitution is non-recursive: the scan advances past each inserted
//! value, so text introduced by one replacement is never re-expanded by
//! the same placeholder.

/// The placeholder names, in canonical substitution order.
pub const PLACEHOLDERS: [&str; 7] = [
    "CASPER_INOTIFY_EVENT",
    "CASPER_INOTIFY_OBJECT",
    "CASPER_INOTIFY_NAME",
    "CASPER_INOTIFY_DATETIME",
    "CASPER_INOTIFY_HOSTNAME",
    "CASPER_INOTIFY_MSG",
    "CASPER_INOTIFY_CMD",
];

/// Replace every non-overlapping occurrence of `from` in `value` with
/// `to`, scanning left to right and advancing past each replacement.
#[must_use]
pub fn replace(value: &str, from: &str, to: &str) -> String {
    if from.is_empty() {
        return value.to_owned();
    }
    let mut out = value.to_owned();
    let mut start = 0;
    while let Some(pos) = out[start..].find(from) {
        let at = start + pos;
        out.replace_range(at..at + from.len(), to);
        start = at + to.len();
    }
    out
}

/// Expand a template against ordered `(placeholder, value)` bindings.
///
/// Each binding is applied once, in the order given; a placeholder name
/// `NAME` matches the literal token `${NAME}`.
#[must_use]
pub fn expand(template: &str, bindings: &[(&str, String)]) -> String {
    let mut out = template.to_owned();
    for (name, value) in bindings {
        out = replace(&out, &format!("${{{name}}}"), value);
    }
    out
}
