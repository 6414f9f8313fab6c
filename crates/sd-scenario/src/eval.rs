//! Condition evaluation logic
//!
//! This module provides the runtime evaluation of condition trees
//! against the current run state and desktop collaborators. Evaluation
//! is total at the public boundary: any failure inside a node (missing
//! path, bad regex, unknown type) is caught there and treated as false,
//! and sibling nodes keep evaluating.

use chrono::NaiveTime;
use dashmap::DashMap;
use regex::Regex;
use sd_core::path;
use sd_desktop::{AchievementStore, FeatureFlags, VirtualFs, WindowManager};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::condition::{
    CompareOp, Condition, ConditionError, ConditionResult, CustomCondition, MatchOp, ValueSource,
};
use crate::executor::EvaluateCondition;
use crate::runtime::EvalContext;

/// Built-in condition type names, used to warn when an extension
/// overrides one
const BUILTIN_CONDITION_TYPES: [&str; 28] = [
    "varEquals",
    "varExists",
    "varGreater",
    "varLess",
    "varContains",
    "varMatches",
    "fileExists",
    "fileContains",
    "fileEquals",
    "appOpen",
    "appFocused",
    "appLocked",
    "windowExists",
    "windowMinimized",
    "achievementUnlocked",
    "featureEnabled",
    "elapsed",
    "timeBefore",
    "timeAfter",
    "eventMatch",
    "eventCount",
    "random",
    "compare",
    "always",
    "never",
    "and",
    "or",
    "not",
];

/// A custom predicate: raw authored parameters plus the evaluation context
pub type CustomPredicate = Arc<dyn Fn(&Map<String, Value>, &EvalContext) -> bool + Send + Sync>;

/// Registry of externally provided condition types
///
/// Passed into the evaluator at construction so tests get isolated
/// instances. A name registered here wins over the built-in of the same
/// name; that override is permitted but logged.
#[derive(Default)]
pub struct ConditionRegistry {
    predicates: DashMap<String, CustomPredicate>,
}

impl ConditionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a predicate under a type name
    pub fn register<F>(&self, name: impl Into<String>, predicate: F)
    where
        F: Fn(&Map<String, Value>, &EvalContext) -> bool + Send + Sync + 'static,
    {
        let name = name.into();
        if BUILTIN_CONDITION_TYPES.contains(&name.as_str()) {
            warn!(name = %name, "Custom condition overrides a built-in type");
        } else if self.predicates.contains_key(&name) {
            warn!(name = %name, "Custom condition replaces a previous registration");
        }
        self.predicates.insert(name, Arc::new(predicate));
    }

    /// Look up a predicate by type name
    pub fn get(&self, name: &str) -> Option<CustomPredicate> {
        self.predicates.get(name).map(|p| p.value().clone())
    }
}

/// Condition evaluator
///
/// Evaluates condition trees against scenario variables, the triggering
/// event, event history, and the desktop collaborators.
pub struct ConditionEvaluator {
    vfs: Arc<VirtualFs>,
    windows: Arc<WindowManager>,
    achievements: Arc<AchievementStore>,
    features: Arc<FeatureFlags>,
    registry: Arc<ConditionRegistry>,
}

impl ConditionEvaluator {
    /// Create a new condition evaluator
    pub fn new(
        vfs: Arc<VirtualFs>,
        windows: Arc<WindowManager>,
        achievements: Arc<AchievementStore>,
        features: Arc<FeatureFlags>,
        registry: Arc<ConditionRegistry>,
    ) -> Self {
        Self {
            vfs,
            windows,
            achievements,
            features,
            registry,
        }
    }

    /// Evaluate a condition, fail-closed
    ///
    /// Never panics or propagates an error: a node that cannot be
    /// evaluated counts as false.
    pub fn check(&self, condition: &Condition, ctx: &EvalContext) -> bool {
        match self.evaluate(condition, ctx) {
            Ok(result) => result,
            Err(error) => {
                debug!(
                    condition = condition.type_name(),
                    %error,
                    "Condition evaluation failed, treating as false"
                );
                false
            }
        }
    }

    /// Evaluate a condition
    ///
    /// Returns `true` if the condition is satisfied, `false` otherwise.
    pub fn evaluate(&self, condition: &Condition, ctx: &EvalContext) -> ConditionResult<bool> {
        // A registered predicate under this name wins, built-in or not
        if let Some(custom) = self.registry.get(condition.type_name()) {
            return Ok(custom(&condition_params(condition), ctx));
        }

        match condition {
            Condition::VarEquals { path, value } => Ok(self
                .resolve_var(ctx, path)
                .map(|current| values_equal(&current, value))
                .unwrap_or(false)),
            Condition::VarExists { path } => Ok(self.resolve_var(ctx, path).is_some()),
            Condition::VarGreater { path, value } => Ok(self
                .resolve_var(ctx, path)
                .and_then(|current| path::as_f64(&current))
                .map(|n| n > *value)
                .unwrap_or(false)),
            Condition::VarLess { path, value } => Ok(self
                .resolve_var(ctx, path)
                .and_then(|current| path::as_f64(&current))
                .map(|n| n < *value)
                .unwrap_or(false)),
            Condition::VarContains { path, value } => Ok(self
                .resolve_var(ctx, path)
                .map(|current| value_contains(&current, value))
                .unwrap_or(false)),
            Condition::VarMatches { path, pattern } => self.eval_var_matches(ctx, path, pattern),
            Condition::FileExists { path } => Ok(self.vfs.exists(path)),
            Condition::FileContains { path, text } => {
                Ok(self.vfs.read(path).map(|c| c.contains(text)).unwrap_or(false))
            }
            Condition::FileEquals { path, content } => {
                Ok(self.vfs.read(path).map(|c| &c == content).unwrap_or(false))
            }
            Condition::AppOpen { app_id } => Ok(self.windows.is_open(app_id)),
            Condition::AppFocused { app_id } => Ok(self.windows.is_focused(app_id)),
            Condition::AppLocked { app_id } => Ok(self.windows.is_locked(app_id)),
            Condition::WindowExists { window_id } => Ok(self.windows.window_exists(window_id)),
            Condition::WindowMinimized { window_id } => {
                Ok(self.windows.window_minimized(window_id))
            }
            Condition::AchievementUnlocked { id } => Ok(self.achievements.is_unlocked(id)),
            Condition::FeatureEnabled { feature } => Ok(self.features.is_enabled(feature)),
            Condition::Elapsed { since, millis } => self.eval_elapsed(ctx, since, *millis),
            Condition::TimeBefore { time } => {
                let boundary = parse_time(time).ok_or_else(|| {
                    ConditionError::InvalidConfig(format!("'{}' is not a valid time", time))
                })?;
                Ok(ctx.now().time() < boundary)
            }
            Condition::TimeAfter { time } => {
                let boundary = parse_time(time).ok_or_else(|| {
                    ConditionError::InvalidConfig(format!("'{}' is not a valid time", time))
                })?;
                Ok(ctx.now().time() >= boundary)
            }
            Condition::EventMatch { field, op, value } => self.eval_event_match(ctx, field, *op, value),
            Condition::EventCount { event, min, max } => {
                let count = ctx.counts.get(event).copied().unwrap_or(0);
                let above = min.map(|m| count >= m).unwrap_or(true);
                let below = max.map(|m| count <= m).unwrap_or(true);
                Ok(above && below)
            }
            Condition::Random { probability } => {
                let draw = ctx.random_override.unwrap_or_else(rand::random::<f64>);
                Ok(draw < *probability)
            }
            Condition::Compare { left, op, right } => {
                let left = self.resolve_source(ctx, left)?;
                let right = self.resolve_source(ctx, right)?;
                Ok(compare_values(&left, *op, &right))
            }
            Condition::Always => Ok(true),
            Condition::Never => Ok(false),
            Condition::And { conditions } => self.evaluate_all(conditions, ctx),
            Condition::Or { conditions } => self.evaluate_any(conditions, ctx),
            Condition::Not { condition } => Ok(!self.check(condition, ctx)),
            Condition::Custom(custom) => self.eval_custom(custom, ctx),
        }
    }

    /// Evaluate multiple conditions (all must pass)
    ///
    /// Each child is itself fail-closed, so one broken child makes the
    /// AND false without poisoning its siblings.
    pub fn evaluate_all(
        &self,
        conditions: &[Condition],
        ctx: &EvalContext,
    ) -> ConditionResult<bool> {
        for condition in conditions {
            if !self.check(condition, ctx) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Evaluate multiple conditions (any must pass)
    pub fn evaluate_any(
        &self,
        conditions: &[Condition],
        ctx: &EvalContext,
    ) -> ConditionResult<bool> {
        for condition in conditions {
            if self.check(condition, ctx) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // --- Individual condition evaluators ---

    fn resolve_var(&self, ctx: &EvalContext, var_path: &str) -> Option<Value> {
        path::resolve(&ctx.variables, var_path).cloned()
    }

    fn eval_var_matches(
        &self,
        ctx: &EvalContext,
        var_path: &str,
        pattern: &str,
    ) -> ConditionResult<bool> {
        let Some(current) = self.resolve_var(ctx, var_path) else {
            return Ok(false);
        };
        let Some(text) = current.as_str() else {
            return Ok(false);
        };

        let re = Regex::new(pattern)
            .map_err(|e| ConditionError::InvalidConfig(format!("Invalid regex: {}", e)))?;
        Ok(re.is_match(text))
    }

    fn eval_elapsed(&self, ctx: &EvalContext, since: &str, millis: u64) -> ConditionResult<bool> {
        let mark = ctx
            .marks
            .get(since)
            .ok_or_else(|| ConditionError::PathMissing(format!("timestamp '{}'", since)))?;

        let now = ctx.now().with_timezone(&chrono::Utc);
        let elapsed = now.signed_duration_since(*mark).num_milliseconds();
        trace!(since, elapsed, required = millis, "Elapsed check");
        Ok(elapsed >= millis as i64)
    }

    fn eval_event_match(
        &self,
        ctx: &EvalContext,
        field: &str,
        op: MatchOp,
        expected: &Value,
    ) -> ConditionResult<bool> {
        let Some(event) = &ctx.event else {
            return Ok(false);
        };
        let Some(actual) = path::resolve(&event.data, field) else {
            trace!(field, "Event payload field missing");
            return Ok(false);
        };

        let result = match op {
            MatchOp::Equals => values_equal(actual, expected),
            MatchOp::NotEquals => !values_equal(actual, expected),
            MatchOp::Contains => value_contains(actual, expected),
            MatchOp::StartsWith => match (actual.as_str(), expected.as_str()) {
                (Some(a), Some(e)) => a.starts_with(e),
                _ => false,
            },
            MatchOp::EndsWith => match (actual.as_str(), expected.as_str()) {
                (Some(a), Some(e)) => a.ends_with(e),
                _ => false,
            },
            MatchOp::Greater => match (path::as_f64(actual), path::as_f64(expected)) {
                (Some(a), Some(e)) => a > e,
                _ => false,
            },
            MatchOp::Less => match (path::as_f64(actual), path::as_f64(expected)) {
                (Some(a), Some(e)) => a < e,
                _ => false,
            },
            MatchOp::In => expected
                .as_array()
                .map(|options| options.iter().any(|o| values_equal(actual, o)))
                .unwrap_or(false),
            MatchOp::Regex => {
                let Some(pattern) = expected.as_str() else {
                    return Ok(false);
                };
                let re = Regex::new(pattern).map_err(|e| {
                    ConditionError::InvalidConfig(format!("Invalid regex: {}", e))
                })?;
                actual.as_str().map(|a| re.is_match(a)).unwrap_or(false)
            }
        };

        trace!(field, ?op, result, "Event match check");
        Ok(result)
    }

    fn resolve_source(&self, ctx: &EvalContext, source: &ValueSource) -> ConditionResult<Value> {
        match source {
            ValueSource::Var { var } => self
                .resolve_var(ctx, var)
                .ok_or_else(|| ConditionError::PathMissing(var.clone())),
            ValueSource::Literal(value) => Ok(value.clone()),
        }
    }

    fn eval_custom(&self, custom: &CustomCondition, ctx: &EvalContext) -> ConditionResult<bool> {
        match self.registry.get(&custom.kind) {
            Some(predicate) => Ok(predicate(&custom.params, ctx)),
            None => Err(ConditionError::UnknownType(custom.kind.clone())),
        }
    }
}

impl EvaluateCondition for ConditionEvaluator {
    fn passes(&self, condition: &Condition, ctx: &EvalContext) -> bool {
        self.check(condition, ctx)
    }
}

// --- Utility functions ---

/// The authored parameters of a condition, for custom predicate dispatch
fn condition_params(condition: &Condition) -> Map<String, Value> {
    match serde_json::to_value(condition) {
        Ok(Value::Object(mut map)) => {
            map.remove("type");
            map
        }
        _ => Map::new(),
    }
}

/// Value equality with numeric coercion (`1` equals `1.0` equals `"1"`)
fn values_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (path::as_f64(a), path::as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Containment: substring for strings, membership for arrays
fn value_contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => needle.as_str().map(|n| s.contains(n)).unwrap_or(false),
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        _ => false,
    }
}

/// Generic comparison for the `compare` condition
fn compare_values(left: &Value, op: CompareOp, right: &Value) -> bool {
    match op {
        CompareOp::Equals => values_equal(left, right),
        CompareOp::NotEquals => !values_equal(left, right),
        CompareOp::Contains => value_contains(left, right),
        CompareOp::Greater | CompareOp::GreaterOrEqual | CompareOp::Less | CompareOp::LessOrEqual => {
            match (path::as_f64(left), path::as_f64(right)) {
                (Some(a), Some(b)) => match op {
                    CompareOp::Greater => a > b,
                    CompareOp::GreaterOrEqual => a >= b,
                    CompareOp::Less => a < b,
                    CompareOp::LessOrEqual => a <= b,
                    _ => unreachable!(),
                },
                _ => false,
            }
        }
    }
}

/// Parse time string as HH:MM:SS or HH:MM
fn parse_time(s: &str) -> Option<NaiveTime> {
    if let Ok(t) = NaiveTime::parse_from_str(s, "%H:%M:%S") {
        return Some(t);
    }
    if let Ok(t) = NaiveTime::parse_from_str(s, "%H:%M") {
        return Some(t);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::EventRecord;
    use sd_event_bus::EventBus;
    use serde_json::json;

    fn make_evaluator() -> (ConditionEvaluator, Arc<sd_desktop::Desktop>) {
        let bus = Arc::new(EventBus::new());
        let desktop = Arc::new(sd_desktop::Desktop::new(bus));
        let evaluator = ConditionEvaluator::new(
            desktop.vfs.clone(),
            desktop.windows.clone(),
            desktop.achievements.clone(),
            desktop.features.clone(),
            Arc::new(ConditionRegistry::new()),
        );
        (evaluator, desktop)
    }

    fn ctx_with_vars(vars: Value) -> EvalContext {
        EvalContext {
            variables: vars,
            ..EvalContext::default()
        }
    }

    fn parse(json: Value) -> Condition {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_var_conditions() {
        let (evaluator, _desktop) = make_evaluator();
        let ctx = ctx_with_vars(json!({"score": 10, "items": ["key", "map"], "name": "ada"}));

        assert!(evaluator.check(
            &parse(json!({"type": "varEquals", "path": "score", "value": 10})),
            &ctx
        ));
        assert!(evaluator.check(&parse(json!({"type": "varExists", "path": "items[1]"})), &ctx));
        assert!(evaluator.check(
            &parse(json!({"type": "varGreater", "path": "score", "value": 5})),
            &ctx
        ));
        assert!(!evaluator.check(
            &parse(json!({"type": "varLess", "path": "score", "value": 5})),
            &ctx
        ));
        assert!(evaluator.check(
            &parse(json!({"type": "varContains", "path": "items", "value": "map"})),
            &ctx
        ));
        assert!(evaluator.check(
            &parse(json!({"type": "varMatches", "path": "name", "pattern": "^a.a$"})),
            &ctx
        ));
    }

    #[test]
    fn test_missing_path_is_false_not_error() {
        let (evaluator, _desktop) = make_evaluator();
        let ctx = ctx_with_vars(json!({}));

        assert!(!evaluator.check(
            &parse(json!({"type": "varEquals", "path": "no.such.thing", "value": 1})),
            &ctx
        ));
        assert!(!evaluator.check(&parse(json!({"type": "varExists", "path": "ghost"})), &ctx));
    }

    #[test]
    fn test_invalid_regex_fails_closed() {
        let (evaluator, _desktop) = make_evaluator();
        let ctx = ctx_with_vars(json!({"name": "ada"}));

        assert!(!evaluator.check(
            &parse(json!({"type": "varMatches", "path": "name", "pattern": "("})),
            &ctx
        ));
    }

    #[test]
    fn test_file_conditions() {
        let (evaluator, desktop) = make_evaluator();
        desktop.vfs.write("/home/readme.txt", "welcome to simdesk");
        let ctx = EvalContext::new();

        assert!(evaluator.check(&parse(json!({"type": "fileExists", "path": "/home/readme.txt"})), &ctx));
        assert!(evaluator.check(
            &parse(json!({"type": "fileContains", "path": "/home/readme.txt", "text": "simdesk"})),
            &ctx
        ));
        assert!(evaluator.check(
            &parse(json!({"type": "fileEquals", "path": "/home/readme.txt", "content": "welcome to simdesk"})),
            &ctx
        ));
        assert!(!evaluator.check(&parse(json!({"type": "fileExists", "path": "/nope"})), &ctx));
    }

    #[test]
    fn test_app_and_window_conditions() {
        let (evaluator, desktop) = make_evaluator();
        desktop.windows.launch("calculator").unwrap();
        desktop.windows.lock("terminal");
        let ctx = EvalContext::new();

        assert!(evaluator.check(&parse(json!({"type": "appOpen", "appId": "calculator"})), &ctx));
        assert!(evaluator.check(&parse(json!({"type": "appFocused", "appId": "calculator"})), &ctx));
        assert!(evaluator.check(&parse(json!({"type": "appLocked", "appId": "terminal"})), &ctx));
        assert!(evaluator.check(&parse(json!({"type": "windowExists", "windowId": "calculator"})), &ctx));
        assert!(!evaluator.check(&parse(json!({"type": "windowMinimized", "windowId": "calculator"})), &ctx));
    }

    #[test]
    fn test_achievement_and_feature_conditions() {
        let (evaluator, desktop) = make_evaluator();
        desktop.achievements.unlock("first-file");
        desktop.features.enable("dark-mode");
        let ctx = EvalContext::new();

        assert!(evaluator.check(&parse(json!({"type": "achievementUnlocked", "id": "first-file"})), &ctx));
        assert!(evaluator.check(&parse(json!({"type": "featureEnabled", "feature": "dark-mode"})), &ctx));
        assert!(!evaluator.check(&parse(json!({"type": "featureEnabled", "feature": "beta"})), &ctx));
    }

    #[test]
    fn test_event_match_operators() {
        let (evaluator, _desktop) = make_evaluator();
        let ctx = EvalContext::with_event(EventRecord {
            name: "calculator:result".to_string(),
            data: json!({"result": 42, "expression": "6*7"}),
            time: chrono::Utc::now(),
        });

        assert!(evaluator.check(
            &parse(json!({"type": "eventMatch", "field": "result", "value": 42})),
            &ctx
        ));
        assert!(evaluator.check(
            &parse(json!({"type": "eventMatch", "field": "result", "op": "notEquals", "value": 41})),
            &ctx
        ));
        assert!(evaluator.check(
            &parse(json!({"type": "eventMatch", "field": "result", "op": "greater", "value": 40})),
            &ctx
        ));
        assert!(evaluator.check(
            &parse(json!({"type": "eventMatch", "field": "expression", "op": "startsWith", "value": "6"})),
            &ctx
        ));
        assert!(evaluator.check(
            &parse(json!({"type": "eventMatch", "field": "expression", "op": "endsWith", "value": "7"})),
            &ctx
        ));
        assert!(evaluator.check(
            &parse(json!({"type": "eventMatch", "field": "result", "op": "in", "value": [41, 42]})),
            &ctx
        ));
        assert!(evaluator.check(
            &parse(json!({"type": "eventMatch", "field": "expression", "op": "regex", "value": "^\\d\\*\\d$"})),
            &ctx
        ));
        assert!(!evaluator.check(
            &parse(json!({"type": "eventMatch", "field": "missing", "value": 1})),
            &ctx
        ));
    }

    #[test]
    fn test_event_count_bounds() {
        let (evaluator, _desktop) = make_evaluator();
        let mut ctx = EvalContext::new();
        ctx.counts.insert("app:launched".to_string(), 3);

        assert!(evaluator.check(
            &parse(json!({"type": "eventCount", "event": "app:launched", "min": 3})),
            &ctx
        ));
        assert!(evaluator.check(
            &parse(json!({"type": "eventCount", "event": "app:launched", "min": 1, "max": 3})),
            &ctx
        ));
        assert!(!evaluator.check(
            &parse(json!({"type": "eventCount", "event": "app:launched", "max": 2})),
            &ctx
        ));
        assert!(!evaluator.check(
            &parse(json!({"type": "eventCount", "event": "never:seen", "min": 1})),
            &ctx
        ));
    }

    #[test]
    fn test_random_with_override() {
        let (evaluator, _desktop) = make_evaluator();

        let lucky = EvalContext::new().with_random(0.2);
        assert!(evaluator.check(&parse(json!({"type": "random", "probability": 0.5})), &lucky));

        let unlucky = EvalContext::new().with_random(0.9);
        assert!(!evaluator.check(&parse(json!({"type": "random", "probability": 0.5})), &unlucky));
    }

    #[test]
    fn test_compare_sources() {
        let (evaluator, _desktop) = make_evaluator();
        let ctx = ctx_with_vars(json!({"score": 10, "best": 8}));

        assert!(evaluator.check(
            &parse(json!({
                "type": "compare",
                "left": {"var": "score"},
                "op": "greater",
                "right": {"var": "best"}
            })),
            &ctx
        ));
        assert!(evaluator.check(
            &parse(json!({"type": "compare", "left": {"var": "score"}, "right": 10})),
            &ctx
        ));
    }

    #[test]
    fn test_combinators() {
        let (evaluator, _desktop) = make_evaluator();
        let ctx = EvalContext::new();

        assert!(evaluator.check(
            &parse(json!({"type": "and", "conditions": [{"type": "always"}, {"type": "always"}]})),
            &ctx
        ));
        assert!(!evaluator.check(
            &parse(json!({"type": "and", "conditions": [{"type": "always"}, {"type": "never"}]})),
            &ctx
        ));
        assert!(evaluator.check(
            &parse(json!({"type": "or", "conditions": [{"type": "never"}, {"type": "always"}]})),
            &ctx
        ));
        assert!(evaluator.check(&parse(json!({"type": "not", "condition": {"type": "never"}})), &ctx));
    }

    #[test]
    fn test_elapsed_with_time_override() {
        let (evaluator, _desktop) = make_evaluator();
        let start = chrono::Utc::now();

        let mut ctx = EvalContext::new();
        ctx.marks.insert("scenario".to_string(), start);
        ctx.time_override =
            Some((start + chrono::Duration::milliseconds(6000)).with_timezone(&chrono::Local));

        assert!(evaluator.check(&parse(json!({"type": "elapsed", "millis": 5000})), &ctx));
        assert!(!evaluator.check(&parse(json!({"type": "elapsed", "millis": 7000})), &ctx));
        // Unknown reference timestamp fails closed
        assert!(!evaluator.check(
            &parse(json!({"type": "elapsed", "since": "bossFight", "millis": 1})),
            &ctx
        ));
    }

    #[test]
    fn test_custom_predicate_and_unknown_type() {
        let bus = Arc::new(EventBus::new());
        let desktop = sd_desktop::Desktop::new(bus);
        let registry = Arc::new(ConditionRegistry::new());
        registry.register("solarFlareActive", |params, _ctx| {
            params.get("region").and_then(|r| r.as_str()) == Some("north")
        });

        let evaluator = ConditionEvaluator::new(
            desktop.vfs,
            desktop.windows,
            desktop.achievements,
            desktop.features,
            registry,
        );
        let ctx = EvalContext::new();

        assert!(evaluator.check(
            &parse(json!({"type": "solarFlareActive", "region": "north"})),
            &ctx
        ));
        assert!(!evaluator.check(
            &parse(json!({"type": "solarFlareActive", "region": "south"})),
            &ctx
        ));
        // Unregistered custom type fails closed
        assert!(!evaluator.check(&parse(json!({"type": "lunarEclipse"})), &ctx));
    }

    #[test]
    fn test_custom_predicate_overrides_builtin() {
        let bus = Arc::new(EventBus::new());
        let desktop = sd_desktop::Desktop::new(bus);
        let registry = Arc::new(ConditionRegistry::new());
        // Invert "always" to prove the override wins
        registry.register("always", |_params, _ctx| false);

        let evaluator = ConditionEvaluator::new(
            desktop.vfs,
            desktop.windows,
            desktop.achievements,
            desktop.features,
            registry,
        );

        assert!(!evaluator.check(&Condition::Always, &EvalContext::new()));
    }
}
