//! Condition types
//!
//! Conditions are boolean-valued predicate trees evaluated at trigger
//! time: leaf checks against scenario variables, collaborators, the
//! triggering event, and time, combined with `and`/`or`/`not`. Unknown
//! `type` tags fall through to the `Custom` variant so externally
//! registered predicates remain representable.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Condition errors
#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("Invalid condition configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown condition type: {0}")]
    UnknownType(String),

    #[error("Path did not resolve: {0}")]
    PathMissing(String),

    #[error("Value type mismatch: {0}")]
    TypeMismatch(String),
}

/// Result type for condition operations
pub type ConditionResult<T> = Result<T, ConditionError>;

/// Condition definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Condition {
    /// Variable at a dot path equals a value
    VarEquals { path: String, value: Value },

    /// Variable at a dot path exists
    VarExists { path: String },

    /// Variable at a dot path is numerically greater than a threshold
    VarGreater { path: String, value: f64 },

    /// Variable at a dot path is numerically less than a threshold
    VarLess { path: String, value: f64 },

    /// Variable (string or array) contains a value
    VarContains { path: String, value: Value },

    /// Variable string matches a regex
    VarMatches { path: String, pattern: String },

    /// A virtual file exists
    FileExists { path: String },

    /// A virtual file's contents contain a substring
    FileContains { path: String, text: String },

    /// A virtual file's contents equal a string exactly
    FileEquals { path: String, content: String },

    /// An application is open
    #[serde(rename_all = "camelCase")]
    AppOpen { app_id: String },

    /// An application has focus
    #[serde(rename_all = "camelCase")]
    AppFocused { app_id: String },

    /// An application is locked
    #[serde(rename_all = "camelCase")]
    AppLocked { app_id: String },

    /// A window exists (by window id or owning app id)
    #[serde(rename_all = "camelCase")]
    WindowExists { window_id: String },

    /// A window is minimized (by window id or owning app id)
    #[serde(rename_all = "camelCase")]
    WindowMinimized { window_id: String },

    /// An achievement has been unlocked
    AchievementUnlocked { id: String },

    /// A feature flag is enabled
    FeatureEnabled { feature: String },

    /// At least `millis` have elapsed since a named reference timestamp
    /// (`scenario` start by default, `stage` for the current stage)
    Elapsed {
        #[serde(default = "default_since")]
        since: String,
        millis: u64,
    },

    /// Wall-clock time is before `HH:MM[:SS]`
    TimeBefore { time: String },

    /// Wall-clock time is at or after `HH:MM[:SS]`
    TimeAfter { time: String },

    /// A field of the triggering event's payload matches
    #[serde(rename_all = "camelCase")]
    EventMatch {
        field: String,
        #[serde(default)]
        op: MatchOp,
        value: Value,
    },

    /// The named event has been observed between `min` and `max` times
    /// (inclusive; the event being processed is already counted)
    EventCount {
        event: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<u64>,
    },

    /// Uniform draw in [0, 1) lands below `probability`
    Random { probability: f64 },

    /// Generic comparison between two resolved values
    Compare {
        left: ValueSource,
        #[serde(default)]
        op: CompareOp,
        right: ValueSource,
    },

    /// Always true
    Always,

    /// Always false
    Never,

    /// All children must be true
    And { conditions: Vec<Condition> },

    /// Any child must be true
    Or { conditions: Vec<Condition> },

    /// Child must be false
    Not { condition: Box<Condition> },

    /// Externally registered condition type
    #[serde(untagged)]
    Custom(CustomCondition),
}

impl Condition {
    /// Create an AND condition
    pub fn and(conditions: Vec<Condition>) -> Self {
        Condition::And { conditions }
    }

    /// Create an OR condition
    pub fn or(conditions: Vec<Condition>) -> Self {
        Condition::Or { conditions }
    }

    /// Create a NOT condition
    pub fn not(condition: Condition) -> Self {
        Condition::Not {
            condition: Box::new(condition),
        }
    }

    /// The `type` tag this condition was authored with
    pub fn type_name(&self) -> &str {
        match self {
            Condition::VarEquals { .. } => "varEquals",
            Condition::VarExists { .. } => "varExists",
            Condition::VarGreater { .. } => "varGreater",
            Condition::VarLess { .. } => "varLess",
            Condition::VarContains { .. } => "varContains",
            Condition::VarMatches { .. } => "varMatches",
            Condition::FileExists { .. } => "fileExists",
            Condition::FileContains { .. } => "fileContains",
            Condition::FileEquals { .. } => "fileEquals",
            Condition::AppOpen { .. } => "appOpen",
            Condition::AppFocused { .. } => "appFocused",
            Condition::AppLocked { .. } => "appLocked",
            Condition::WindowExists { .. } => "windowExists",
            Condition::WindowMinimized { .. } => "windowMinimized",
            Condition::AchievementUnlocked { .. } => "achievementUnlocked",
            Condition::FeatureEnabled { .. } => "featureEnabled",
            Condition::Elapsed { .. } => "elapsed",
            Condition::TimeBefore { .. } => "timeBefore",
            Condition::TimeAfter { .. } => "timeAfter",
            Condition::EventMatch { .. } => "eventMatch",
            Condition::EventCount { .. } => "eventCount",
            Condition::Random { .. } => "random",
            Condition::Compare { .. } => "compare",
            Condition::Always => "always",
            Condition::Never => "never",
            Condition::And { .. } => "and",
            Condition::Or { .. } => "or",
            Condition::Not { .. } => "not",
            Condition::Custom(custom) => &custom.kind,
        }
    }
}

fn default_since() -> String {
    "scenario".to_string()
}

/// Operator for event payload field matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum MatchOp {
    #[default]
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    Greater,
    Less,
    In,
    Regex,
}

/// Operator for generic value comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum CompareOp {
    #[default]
    Equals,
    NotEquals,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Contains,
}

/// A value operand: either a variable reference or a literal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueSource {
    /// Resolve a variable path at evaluation time
    Var { var: String },
    /// Use the value as written
    Literal(Value),
}

/// An externally registered condition, preserved as raw parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomCondition {
    /// Registered type name
    #[serde(rename = "type")]
    pub kind: String,

    /// Remaining parameters as authored
    #[serde(flatten)]
    pub params: Map<String, Value>,
}
