//! Scenario definition types
//!
//! A scenario is a declarative, authored description of one guided
//! experience: an ordered list of stages, globally active triggers,
//! initial variables, configuration, and lifecycle action lists. The
//! definition is immutable once loaded; the orchestrator owns it for
//! the duration of a run.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::action::Action;
use crate::condition::Condition;

/// Deserialize a field that can be either a single string or an array of strings
fn string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
    }

    match StringOrVec::deserialize(deserializer)? {
        StringOrVec::String(s) => Ok(vec![s]),
        StringOrVec::Vec(v) => Ok(v),
    }
}

fn default_enabled() -> bool {
    true
}

fn default_version() -> String {
    "1.0".to_string()
}

/// A complete scenario definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDefinition {
    /// Unique scenario identifier
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Author-assigned version string
    #[serde(default = "default_version")]
    pub version: String,

    /// Ordered stages; the run progresses through these
    #[serde(default)]
    pub stages: Vec<Stage>,

    /// Triggers active for the whole run regardless of stage
    #[serde(default)]
    pub global_triggers: Vec<TriggerDef>,

    /// Initial scenario variables
    #[serde(default)]
    pub variables: Map<String, Value>,

    /// Run configuration
    #[serde(default)]
    pub config: ScenarioConfig,

    /// Actions run when the scenario starts
    #[serde(default)]
    pub on_start: Vec<Action>,

    /// Actions run when the scenario completes
    #[serde(default)]
    pub on_complete: Vec<Action>,

    /// Actions run when the scenario fails
    #[serde(default)]
    pub on_fail: Vec<Action>,

    /// Actions run when the scenario is aborted
    #[serde(default)]
    pub on_abort: Vec<Action>,
}

impl ScenarioDefinition {
    /// The stage a run begins in: the one flagged `initial`, or the
    /// first stage when none is flagged
    pub fn initial_stage(&self) -> Option<&Stage> {
        self.stages
            .iter()
            .find(|s| s.initial)
            .or_else(|| self.stages.first())
    }

    /// Look up a stage by id
    pub fn stage(&self, id: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == id)
    }
}

/// One named phase of a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    /// Unique within the scenario
    pub id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: String,

    /// Marks the stage a run begins in
    #[serde(default)]
    pub initial: bool,

    /// Actions run when the stage is entered
    #[serde(default)]
    pub on_enter: Vec<Action>,

    /// Actions run when the stage is exited
    #[serde(default)]
    pub on_exit: Vec<Action>,

    /// Ordered hints, revealed one at a time on a timer
    #[serde(default)]
    pub hints: Vec<Hint>,

    /// Triggers active only while this stage is current
    #[serde(default)]
    pub triggers: Vec<TriggerDef>,
}

/// A timed hint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hint {
    /// Delay before the hint is shown, in milliseconds; falls back to
    /// the scenario-wide `hintDelay` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,

    /// Hint text
    pub message: String,
}

/// Run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioConfig {
    /// Whether the host may offer a skip-stage affordance
    #[serde(default)]
    pub allow_skip: bool,

    /// Whether the host should show run progress
    #[serde(default = "default_enabled")]
    pub show_progress: bool,

    /// Snapshot variables to durable state on stage transitions
    #[serde(default)]
    pub auto_save: bool,

    /// Default hint delay in milliseconds
    #[serde(default = "default_hint_delay")]
    pub hint_delay: u64,

    /// Maximum hints shown per run
    #[serde(default = "default_max_hints")]
    pub max_hints: u32,

    /// Whether the host should pause the run when the desktop loses focus
    #[serde(default)]
    pub pause_on_blur: bool,
}

fn default_hint_delay() -> u64 {
    30_000
}

fn default_max_hints() -> u32 {
    3
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            allow_skip: false,
            show_progress: true,
            auto_save: false,
            hint_delay: default_hint_delay(),
            max_hints: default_max_hints(),
            pause_on_blur: false,
        }
    }
}

/// A trigger definition
///
/// Binds one or more event-name patterns to an optional condition tree
/// and an action list. `stage_id` is set by the orchestrator when it
/// registers a stage's own triggers; authored global triggers leave it
/// null.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDef {
    /// Unique within an engine run; generated when absent
    #[serde(default)]
    pub id: String,

    /// Event-name patterns this trigger listens for (`event` accepts a
    /// single string)
    #[serde(default, alias = "event", deserialize_with = "string_or_vec")]
    pub events: Vec<String>,

    /// Condition tree gating the actions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Condition>,

    /// Actions run when the trigger fires
    #[serde(default)]
    pub actions: Vec<Action>,

    /// Fire at most once per run
    #[serde(default)]
    pub once: bool,

    /// Higher priority fires first among triggers matched by one event
    #[serde(default)]
    pub priority: i64,

    /// Debounce window in milliseconds; rapid qualifying events collapse
    /// into a single firing after the quiet period
    #[serde(default)]
    pub debounce: i64,

    /// Disabled triggers never fire
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Stage this trigger is scoped to; null means global
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<String>,
}
