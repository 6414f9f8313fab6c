//! Trigger validation and event-name pattern matching
//!
//! A trigger pattern matches an inbound event name one of four ways:
//! exact equality; a `*` glob (`app:*`); the segment-prefix rule, where
//! a pattern without `*` matches any event starting with `pattern + ":"`
//! (`fs` matches `fs:written`); or a custom matcher keyed by a `type:`
//! prefix, such as `regex:^app:.+$`.

use dashmap::DashMap;
use regex::Regex;
use std::sync::Arc;
use tracing::{trace, warn};

use crate::action::Action;
use crate::scenario::TriggerDef;

/// The wildcard pattern handled by the engine's global trigger list
pub const WILDCARD: &str = "*";

/// A custom matcher: (pattern remainder, event name) -> matched
pub type CustomMatcher = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Registry of custom pattern matchers, keyed by the `type:` prefix
///
/// `with_defaults` installs the built-in `regex` matcher. Injected into
/// the engine at construction so tests get isolated instances.
#[derive(Default)]
pub struct MatcherRegistry {
    matchers: DashMap<String, CustomMatcher>,
}

impl MatcherRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in matchers installed
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register("regex", |pattern: &str, event: &str| {
            match Regex::new(pattern) {
                Ok(re) => re.is_match(event),
                Err(error) => {
                    warn!(pattern, %error, "Invalid regex pattern in trigger");
                    false
                }
            }
        });
        registry
    }

    /// Register a matcher under a `type:` prefix
    pub fn register<F>(&self, prefix: impl Into<String>, matcher: F)
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        let prefix = prefix.into();
        if self.matchers.contains_key(&prefix) {
            warn!(prefix = %prefix, "Custom matcher replaces a previous registration");
        }
        self.matchers.insert(prefix, Arc::new(matcher));
    }

    /// Look up a matcher by prefix
    pub fn get(&self, prefix: &str) -> Option<CustomMatcher> {
        self.matchers.get(prefix).map(|m| m.value().clone())
    }

    /// Whether a pattern's `type:` prefix names a registered matcher
    pub fn handles(&self, pattern: &str) -> bool {
        pattern
            .split_once(':')
            .map(|(prefix, _)| self.matchers.contains_key(prefix))
            .unwrap_or(false)
    }
}

/// Whether a pattern matches an event name
pub fn pattern_matches(pattern: &str, event: &str, matchers: &MatcherRegistry) -> bool {
    if pattern == WILDCARD {
        return true;
    }

    // Custom matcher, keyed by prefix (only when that prefix is registered,
    // so ordinary namespaced patterns like `app:launched` are unaffected)
    if let Some((prefix, rest)) = pattern.split_once(':') {
        if let Some(matcher) = matchers.get(prefix) {
            let matched = matcher(rest, event);
            trace!(pattern, event, matched, "Custom matcher");
            return matched;
        }
    }

    // Glob: `*` spans any run of characters
    if pattern.contains('*') {
        return glob_matches(pattern, event);
    }

    // Exact, or segment prefix (`fs` matches `fs:written`)
    event == pattern || event.starts_with(&format!("{}:", pattern))
}

fn glob_matches(pattern: &str, event: &str) -> bool {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    match Regex::new(&format!("^{}$", escaped)) {
        Ok(re) => re.is_match(event),
        Err(error) => {
            warn!(pattern, %error, "Glob pattern failed to compile");
            false
        }
    }
}

/// Validate a trigger definition, returning human-readable problems
///
/// Invalid definitions are still registered (the engine logs these as
/// warnings); validation never rejects.
pub fn validate(def: &TriggerDef) -> Vec<String> {
    let mut problems = Vec::new();

    if def.events.is_empty() {
        problems.push("trigger specifies no event patterns".to_string());
    }
    if def.events.iter().any(|e| e.is_empty()) {
        problems.push("trigger has an empty event pattern".to_string());
    }
    if def.debounce < 0 {
        problems.push(format!(
            "debounce must be non-negative, got {} (clamped to 0)",
            def.debounce
        ));
    }
    for action in &def.actions {
        if let Action::Custom(custom) = action {
            problems.push(format!(
                "action type '{}' is not a built-in shape and needs a registered handler",
                custom.kind
            ));
        }
    }

    problems
}
