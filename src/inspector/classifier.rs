//! Line classification.
//!
//! An ordered table of patterns, each turning a matching console line into a
//! [`BoardEvent`]. Boot and block rules are tested independently of each
//! other; the runtime error rules are tried in order and only the first match
//! fires.

use crate::event::BoardEvent;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Rule families. Families differ in suppression and in match semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleGroup {
    /// ROM bootloader reset banners.
    Boot,
    /// Block tracing emitted by the IDE's generated code.
    Block,
    /// Lua error lines; first match wins.
    Runtime,
}

struct Rule {
    group: RuleGroup,
    pattern: Regex,
    build: fn(&Captures<'_>) -> BoardEvent,
}

fn capture(caps: &Captures<'_>, index: usize) -> String {
    caps.get(index)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

fn rule(group: RuleGroup, pattern: &str, build: fn(&Captures<'_>) -> BoardEvent) -> Rule {
    Rule {
        group,
        pattern: Regex::new(pattern).expect("valid classifier pattern"),
        build,
    }
}

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(
            RuleGroup::Boot,
            r"^rst:.*\(POWERON_RESET\),boot:.*(.*)$",
            |_| BoardEvent::PowerOnReset,
        ),
        rule(
            RuleGroup::Boot,
            r"^rst:.*(SW_CPU_RESET),boot:.*(.*)$",
            |_| BoardEvent::SoftwareReset,
        ),
        rule(
            RuleGroup::Boot,
            r"^rst:.*(DEEPSLEEP_RESET),boot.*(.*)$",
            |_| BoardEvent::DeepSleepReset,
        ),
        rule(RuleGroup::Block, r"<blockStart,(.*)>", |caps| {
            BoardEvent::BlockStart {
                block: capture(caps, 1),
            }
        }),
        rule(RuleGroup::Block, r"<blockEnd,(.*)>", |caps| {
            BoardEvent::BlockEnd {
                block: capture(caps, 1),
            }
        }),
        rule(RuleGroup::Block, r"<blockError,(.*),(.*)>", |caps| {
            BoardEvent::BlockError {
                block: capture(caps, 1),
                error: capture(caps, 2),
            }
        }),
        rule(
            RuleGroup::Runtime,
            r"^([a-zA-Z]*):(\d*):\s(\d*):(.*)$",
            |caps| BoardEvent::RuntimeError {
                location: capture(caps, 1),
                line: capture(caps, 2),
                code: capture(caps, 3),
                message: capture(caps, 4),
            },
        ),
        rule(
            RuleGroup::Runtime,
            r"^([a-zA-Z]*):(\d*):\s*(.*)$",
            |caps| BoardEvent::RuntimeError {
                location: capture(caps, 1),
                line: capture(caps, 2),
                code: "0".to_string(),
                message: capture(caps, 3),
            },
        ),
    ]
});

/// Classify one complete console line (terminator already removed).
///
/// With `boot_notifications` off, reset banners and block events are not
/// reported; runtime errors always are.
pub fn classify(line: &str, boot_notifications: bool) -> Vec<BoardEvent> {
    let mut events = Vec::new();
    let mut runtime_matched = false;

    for rule in RULES.iter() {
        match rule.group {
            RuleGroup::Boot | RuleGroup::Block if !boot_notifications => continue,
            RuleGroup::Runtime if runtime_matched => continue,
            _ => {}
        }
        if let Some(caps) = rule.pattern.captures(line) {
            events.push((rule.build)(&caps));
            runtime_matched |= rule.group == RuleGroup::Runtime;
        }
    }
    events
}
