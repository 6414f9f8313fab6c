//! Causality context attached to every published event

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifies what initiated an event and links it to its cause
///
/// Events emitted by a trigger's actions carry a context chaining back
/// to the event that fired the trigger, so everything a scenario run
/// produced can be traced end to end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// ULID of this context
    pub id: String,

    /// Scenario run this event belongs to, when one is active
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<String>,

    /// Id of the context that caused this one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            scenario_id: None,
            parent_id: None,
        }
    }

    /// A fresh context attributed to a scenario run
    pub fn for_scenario(scenario_id: impl Into<String>) -> Self {
        Self {
            scenario_id: Some(scenario_id.into()),
            ..Self::new()
        }
    }

    /// Derive a context caused by this one
    pub fn child(&self) -> Self {
        Self {
            scenario_id: self.scenario_id.clone(),
            parent_id: Some(self.id.clone()),
            ..Self::new()
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
