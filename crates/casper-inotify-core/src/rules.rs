//! The rule registry: the authoritative list of watch rules and its
//! `good` (active, keyed by watch descriptor) and `bad` (awaiting
//! retry) views.
//!
//! Rules are owned by one vector and referred to by stable index
//! everywhere else; `good` maps a live watch descriptor to an index and
//! `bad` is the ordered retry list. At rest, between dispatch
//! iterations, `good` and `bad` partition the table.

use std::collections::{HashMap, HashSet};

use globset::GlobMatcher;

use crate::taxonomy::EventMask;

/// Whether a rule watches a file or a directory. Tags the operator's
/// intent, not what the kernel found at the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// A single file.
    File,
    /// A directory and the objects inside it.
    Directory,
}

impl RuleKind {
    /// One-character tag used in log lines: `f` or `d`.
    #[must_use]
    pub const fn tag(self) -> char {
        match self {
            Self::File => 'f',
            Self::Directory => 'd',
        }
    }
}

/// What a rule does when one of its events fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// Spawn the rule's command.
    Command,
    /// Built-in: re-register a not-yet-existing watched file the moment
    /// its parent directory sees the creation. Rules with this action
    /// are synthetic and never spawn.
    ReRegister,
}

/// A watch rule.
#[derive(Debug, Clone)]
pub struct Rule {
    /// File or directory intent.
    pub kind: RuleKind,
    /// Absolute path to watch.
    pub uri: String,
    /// Kernel event classes requested.
    pub mask: EventMask,
    /// Live watch descriptor, or `None` while unregistered.
    pub wd: Option<i32>,
    /// OS user the command runs as.
    pub user: String,
    /// Command template.
    pub cmd: String,
    /// Message template.
    pub msg: String,
    /// Glob source text filtering the event's object name; empty means
    /// no filter.
    pub pattern: String,
    /// Compiled form of `pattern`, when present and valid.
    pub matcher: Option<GlobMatcher>,
    /// Last registration error, cleared on success.
    pub error: String,
    /// Last invalidation reason, cleared on success.
    pub warning: String,
    /// Spawn or built-in behavior.
    pub action: RuleAction,
}

impl Rule {
    /// Whether this rule was synthesized by the loader rather than
    /// declared by the operator.
    #[must_use]
    pub const fn is_synthetic(&self) -> bool {
        matches!(self.action, RuleAction::ReRegister)
    }

    /// Apply the rule's glob filter to an event's object name.
    ///
    /// A rule without a pattern accepts everything.
    #[must_use]
    pub fn accepts_object(&self, object_name: &str) -> bool {
        self.matcher
            .as_ref()
            .is_none_or(|m| m.is_match(object_name))
    }
}

/// The three-view rule registry, plus the literal URI sets the operator
/// asked to watch (synthetic rules excluded).
#[derive(Debug, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
    good: HashMap<i32, usize>,
    bad: Vec<usize>,
    directory_uris: HashSet<String>,
    file_uris: HashSet<String>,
}

impl RuleTable {
    /// Append a rule, recording its URI in the matching user-facing set
    /// unless the rule is synthetic. Returns the rule's stable index.
    pub fn push(&mut self, rule: Rule) -> usize {
        if !rule.is_synthetic() {
            match rule.kind {
                RuleKind::Directory => self.directory_uris.insert(rule.uri.clone()),
                RuleKind::File => self.file_uris.insert(rule.uri.clone()),
            };
        }
        self.rules.push(rule);
        self.rules.len() - 1
    }

    /// Number of rules in the authoritative list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table holds no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The rule at a stable index.
    #[must_use]
    pub fn rule(&self, idx: usize) -> &Rule {
        &self.rules[idx]
    }

    /// Mutable access to the rule at a stable index.
    pub fn rule_mut(&mut self, idx: usize) -> &mut Rule {
        &mut self.rules[idx]
    }

    /// All rules, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Resolve a live watch descriptor to a rule index.
    #[must_use]
    pub fn lookup(&self, wd: i32) -> Option<usize> {
        self.good.get(&wd).copied()
    }

    /// Track a freshly registered rule in the `good` view.
    ///
    /// The rule must hold a watch descriptor.
    pub fn mark_good(&mut self, idx: usize) {
        let wd = self.rules[idx]
            .wd
            .expect("rule tracked as good must hold a watch descriptor");
        self.good.insert(wd, idx);
    }

    /// Track a rule whose registration failed in the `bad` view.
    pub fn mark_bad(&mut self, idx: usize) {
        self.bad.push(idx);
    }

    /// Demote the rule behind a watch descriptor from `good` to `bad`
    /// after a kernel invalidation, recording the reason.
    ///
    /// Returns the demoted rule's index.
    pub fn demote(&mut self, wd: i32, reason: &str) -> Option<usize> {
        let idx = self.good.remove(&wd)?;
        let rule = &mut self.rules[idx];
        rule.wd = None;
        rule.warning = reason.to_owned();
        self.bad.push(idx);
        Some(idx)
    }

    /// Remove and return the index of the `bad` rule watching `uri`.
    pub fn take_bad_by_uri(&mut self, uri: &str) -> Option<usize> {
        let pos = self.bad.iter().position(|&idx| self.rules[idx].uri == uri)?;
        Some(self.bad.remove(pos))
    }

    /// Whether the operator asked to watch `uri` as a file.
    #[must_use]
    pub fn is_user_file(&self, uri: &str) -> bool {
        self.file_uris.contains(uri)
    }

    /// Whether the operator asked to watch `uri` as a directory.
    #[must_use]
    pub fn is_user_directory(&self, uri: &str) -> bool {
        self.directory_uris.contains(uri)
    }

    /// Number of rules currently in the `good` view.
    #[must_use]
    pub fn good_len(&self) -> usize {
        self.good.len()
    }

    /// Number of rules currently in the `bad` view.
    #[must_use]
    pub fn bad_len(&self) -> usize {
        self.bad.len()
    }

    /// Indices of the rules currently awaiting retry.
    pub fn bad_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.bad.iter().copied()
    }

    /// Drop every rule and clear all views and URI sets.
    pub fn clear(&mut self) {
        self.rules.clear();
        self.good.clear();
        self.bad.clear();
        self.directory_uris.clear();
        self.file_uris.clear();
    }
}

#[cfg(test)]
pub(crate) fn test_rule(kind: RuleKind, uri: &str, mask: EventMask, action: RuleAction) -> Rule {
    Rule {
        kind,
        uri: uri.to_owned(),
        mask,
        wd: None,
        user: "nobody".to_owned(),
        cmd: "true".to_owned(),
        msg: String::new(),
        pattern: String::new(),
        matcher: None,
        error: String::new(),
        warning: String::new(),
        action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(rules: Vec<Rule>) -> RuleTable {
        let mut table = RuleTable::default();
        for rule in rules {
            table.push(rule);
        }
        table
    }

    #[test]
    fn push_partitions_uris_by_kind() {
        let table = table_with(vec![
            test_rule(
                RuleKind::Directory,
                "/tmp/d",
                EventMask::CREATE,
                RuleAction::Command,
            ),
            test_rule(
                RuleKind::File,
                "/tmp/d/x",
                EventMask::MODIFY,
                RuleAction::Command,
            ),
        ]);
        assert!(table.is_user_directory("/tmp/d"));
        assert!(table.is_user_file("/tmp/d/x"));
        assert!(!table.is_user_file("/tmp/d"));
    }

    #[test]
    fn synthetic_uris_stay_out_of_the_user_sets() {
        let table = table_with(vec![test_rule(
            RuleKind::Directory,
            "/tmp/d",
            EventMask::CREATE,
            RuleAction::ReRegister,
        )]);
        assert_eq!(table.len(), 1);
        assert!(!table.is_user_directory("/tmp/d"));
    }

    #[test]
    fn good_and_bad_partition_the_table() {
        let mut table = table_with(vec![
            test_rule(
                RuleKind::File,
                "/a",
                EventMask::OPEN,
                RuleAction::Command,
            ),
            test_rule(
                RuleKind::File,
                "/b",
                EventMask::OPEN,
                RuleAction::Command,
            ),
        ]);
        table.rule_mut(0).wd = Some(11);
        table.mark_good(0);
        table.mark_bad(1);

        assert_eq!(table.good_len() + table.bad_len(), table.len());
        assert_eq!(table.lookup(11), Some(0));
        assert_eq!(table.lookup(99), None);
        // good membership tracks the descriptor, bad tracks its absence
        assert!(table.rule(0).wd.is_some());
        assert!(table.rule(1).wd.is_none());
    }

    #[test]
    fn demote_moves_a_rule_to_bad_and_clears_wd() {
        let mut table = table_with(vec![test_rule(
            RuleKind::File,
            "/a",
            EventMask::DELETE,
            RuleAction::Command,
        )]);
        table.rule_mut(0).wd = Some(5);
        table.mark_good(0);

        let idx = table.demote(5, "watch removed").expect("demote");
        assert_eq!(idx, 0);
        assert_eq!(table.good_len(), 0);
        assert_eq!(table.bad_len(), 1);
        assert!(table.rule(0).wd.is_none());
        assert_eq!(table.rule(0).warning, "watch removed");
        assert_eq!(table.demote(5, "again"), None);
    }

    #[test]
    fn take_bad_by_uri_removes_only_the_match() {
        let mut table = table_with(vec![
            test_rule(RuleKind::File, "/a", EventMask::MODIFY, RuleAction::Command),
            test_rule(RuleKind::File, "/b", EventMask::MODIFY, RuleAction::Command),
        ]);
        table.mark_bad(0);
        table.mark_bad(1);

        assert_eq!(table.take_bad_by_uri("/b"), Some(1));
        assert_eq!(table.bad_len(), 1);
        assert_eq!(table.take_bad_by_uri("/b"), None);
        assert_eq!(table.take_bad_by_uri("/a"), Some(0));
        assert_eq!(table.bad_len(), 0);
    }

    #[test]
    fn rule_without_pattern_accepts_everything() {
        let rule = test_rule(RuleKind::File, "/a", EventMask::OPEN, RuleAction::Command);
        assert!(rule.accepts_object("anything.at.all"));
    }

    #[test]
    fn clear_empties_every_view() {
        let mut table = table_with(vec![test_rule(
            RuleKind::Directory,
            "/tmp/d",
            EventMask::CREATE,
            RuleAction::Command,
        )]);
        table.mark_bad(0);
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.bad_len(), 0);
        assert!(!table.is_user_directory("/tmp/d"));
    }
}
