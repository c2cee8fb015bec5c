//! Literal, order-sensitive token substitution.
//!
//! Rules run one after another over the whole text: every occurrence of
//! `rules[0].name` is replaced before `rules[1]` runs, so a later rule sees
//! the output of earlier ones. No regex, no escaping. Binary content is never
//! touched.

use std::borrow::Cow;

use filesync_core::SubstitutionRule;

/// How many leading bytes the binary sniff inspects.
const SNIFF_LEN: usize = 8 * 1024;

/// Outcome of [`apply_bytes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substituted<'a> {
    pub bytes: Cow<'a, [u8]>,
    /// Number of rules that matched at least once.
    pub rules_matched: usize,
}

/// Apply `rules` in declaration order.
pub fn apply(text: &str, rules: &[SubstitutionRule]) -> String {
    apply_counting(text, rules).0
}

fn apply_counting(text: &str, rules: &[SubstitutionRule]) -> (String, usize) {
    let mut current = text.to_string();
    let mut matched = 0;
    for rule in rules {
        if rule.name.is_empty() || !current.contains(rule.name.as_str()) {
            continue;
        }
        current = current.replace(rule.name.as_str(), &rule.value);
        matched += 1;
        tracing::debug!("replaced '{}'", rule.name);
    }
    (current, matched)
}

/// NUL byte in the first 8 KiB, or not UTF-8.
pub fn is_binary(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];
    head.contains(&0) || std::str::from_utf8(bytes).is_err()
}

/// Byte-level entry point: text gets [`apply`], binary passes through
/// borrowed and unmodified.
pub fn apply_bytes<'a>(bytes: &'a [u8], rules: &[SubstitutionRule]) -> Substituted<'a> {
    if rules.is_empty() || is_binary(bytes) {
        return Substituted {
            bytes: Cow::Borrowed(bytes),
            rules_matched: 0,
        };
    }
    // is_binary() already proved this is valid UTF-8.
    let Ok(text) = std::str::from_utf8(bytes) else {
        return Substituted {
            bytes: Cow::Borrowed(bytes),
            rules_matched: 0,
        };
    };
    let (replaced, rules_matched) = apply_counting(text, rules);
    if rules_matched == 0 {
        return Substituted {
            bytes: Cow::Borrowed(bytes),
            rules_matched,
        };
    }
    Substituted {
        bytes: Cow::Owned(replaced.into_bytes()),
        rules_matched,
    }
}
