//! Translates a parsed configuration document into rule table entries.

use globset::Glob;

use crate::config::{Config, RuleSpec, DEFAULT_MESSAGE};
use crate::rules::{Rule, RuleAction, RuleKind, RuleTable};
use crate::taxonomy::{keywords_to_mask, EventMask};

/// Document-level defaults applied to elements that do not override
/// them.
struct Defaults {
    user: String,
    command: String,
    message: String,
}

impl Defaults {
    fn from_config(cfg: &Config) -> Self {
        Self {
            user: cfg.user.clone().unwrap_or_default(),
            command: cfg.command.clone().unwrap_or_default(),
            message: cfg
                .message
                .clone()
                .unwrap_or_else(|| DEFAULT_MESSAGE.to_owned()),
        }
    }
}

/// Build the rule table for a configuration document.
///
/// Directory elements become directory rules with the kernel's
/// only-if-directory flag ORed in. File elements may synthesize an
/// auxiliary directory rule (see [`RuleAction::ReRegister`]) and have
/// their delete mask promoted. Elements whose keywords resolve to an
/// empty mask are skipped.
pub(crate) fn build_rules(cfg: &Config) -> RuleTable {
    let defaults = Defaults::from_config(cfg);
    let mut table = RuleTable::default();

    for spec in &cfg.directories {
        let mask = keywords_to_mask(&spec.events);
        if mask.is_empty() {
            tracing::warn!(uri = %spec.uri, "directory rule without recognized events skipped");
            continue;
        }
        let rule = new_rule(
            RuleKind::Directory,
            spec.uri.clone(),
            mask | EventMask::ONLYDIR,
            spec,
            &defaults,
            RuleAction::Command,
        );
        table.push(rule);
    }

    for spec in &cfg.files {
        let mut mask = keywords_to_mask(&spec.events);
        if mask.is_empty() {
            tracing::warn!(uri = %spec.uri, "file rule without recognized events skipped");
            continue;
        }
        if mask.contains(EventMask::DELETE) {
            mask |= EventMask::DELETE_SELF;
        }
        if mask.contains(EventMask::MODIFY) {
            // A modify watch on a file that does not exist yet can only be
            // established once the parent directory reports its creation.
            let Some(parent) = parent_of(&spec.uri) else {
                tracing::warn!(uri = %spec.uri, "file rule without a parent component skipped");
                continue;
            };
            let aux = new_rule(
                RuleKind::Directory,
                parent,
                EventMask::CREATE,
                spec,
                &defaults,
                RuleAction::ReRegister,
            );
            table.push(aux);
        }
        let rule = new_rule(
            RuleKind::File,
            spec.uri.clone(),
            mask,
            spec,
            &defaults,
            RuleAction::Command,
        );
        table.push(rule);
    }

    table
}

fn new_rule(
    kind: RuleKind,
    uri: String,
    mask: EventMask,
    spec: &RuleSpec,
    defaults: &Defaults,
    action: RuleAction,
) -> Rule {
    let pattern = spec.pattern.clone().unwrap_or_default();
    let matcher = if pattern.is_empty() {
        None
    } else {
        match Glob::new(&pattern) {
            Ok(glob) => Some(glob.compile_matcher()),
            Err(e) => {
                tracing::warn!(uri = %uri, pattern = %pattern, error = %e, "invalid pattern dropped");
                None
            }
        }
    };
    Rule {
        kind,
        uri,
        mask,
        wd: None,
        user: spec.user.clone().unwrap_or_else(|| defaults.user.clone()),
        cmd: spec
            .command
            .clone()
            .unwrap_or_else(|| defaults.command.clone()),
        msg: spec
            .message
            .clone()
            .unwrap_or_else(|| defaults.message.clone()),
        pattern,
        matcher,
        error: String::new(),
        warning: String::new(),
        action,
    }
}

/// The parent directory component of a URI, without the trailing slash.
///
/// `None` when the URI has no slash at all; the root-level case yields
/// an empty string, which registration will reject.
fn parent_of(uri: &str) -> Option<String> {
    uri.rfind('/').map(|idx| uri[..idx].to_owned())
}
