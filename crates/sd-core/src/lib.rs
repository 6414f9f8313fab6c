//! Core types for SimDesk
//!
//! This crate provides the fundamental types used throughout the SimDesk
//! Rust implementation: Event, EventName, Context, and dot-notation value
//! paths.

mod context;
mod event;
pub mod path;

pub use context::Context;
pub use event::{Event, EventData, EventName};

/// Standard event names emitted by the scenario engine
pub mod events {
    use super::*;

    /// A scenario definition was loaded
    pub const SCENARIO_LOADED: &str = "scenario:loaded";

    /// A scenario run started
    pub const SCENARIO_STARTED: &str = "scenario:started";

    /// A stage became the current stage
    pub const STAGE_ENTERED: &str = "scenario:stage-entered";

    /// A stage was marked completed
    pub const STAGE_COMPLETED: &str = "scenario:stage-completed";

    /// A trigger's conditions passed and its actions are about to run
    pub const TRIGGER_FIRED: &str = "scenario:trigger-fired";

    /// An action is about to execute
    pub const ACTION_ATTEMPTED: &str = "scenario:action-attempted";

    /// An action finished successfully
    pub const ACTION_COMPLETED: &str = "scenario:action-completed";

    /// An action failed
    pub const ACTION_FAILED: &str = "scenario:action-failed";

    /// A hint was shown to the user
    pub const HINT_SHOWN: &str = "scenario:hint-shown";

    /// The scenario run completed successfully
    pub const SCENARIO_COMPLETED: &str = "scenario:completed";

    /// The scenario run failed
    pub const SCENARIO_FAILED: &str = "scenario:failed";

    /// The scenario run was aborted
    pub const SCENARIO_ABORTED: &str = "scenario:aborted";

    /// The scenario run was paused
    pub const SCENARIO_PAUSED: &str = "scenario:paused";

    /// The scenario run was resumed
    pub const SCENARIO_RESUMED: &str = "scenario:resumed";

    /// A scenario variable changed value
    pub const VARIABLE_CHANGED: &str = "scenario:variable-changed";

    /// Action lifecycle notifications are published on the bus for
    /// observers but never fed back into trigger matching.
    pub const ACTION_LIFECYCLE: [&str; 3] =
        [ACTION_ATTEMPTED, ACTION_COMPLETED, ACTION_FAILED];

    /// Engine-emitted notifications excluded from trigger matching.
    /// Without this a match-all trigger would refire on its own
    /// trigger-fired notification forever.
    pub const NON_RETRIGGERING: [&str; 4] =
        [ACTION_ATTEMPTED, ACTION_COMPLETED, ACTION_FAILED, TRIGGER_FIRED];

    /// Data for VARIABLE_CHANGED events
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct VariableChangedData {
        pub path: String,
        pub old_value: Option<serde_json::Value>,
        pub new_value: serde_json::Value,
    }

    impl EventData for VariableChangedData {
        fn event_name() -> &'static str {
            VARIABLE_CHANGED
        }
    }

    /// Data for TRIGGER_FIRED events
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TriggerFiredData {
        pub trigger_id: String,
        pub event: String,
    }

    impl EventData for TriggerFiredData {
        fn event_name() -> &'static str {
            TRIGGER_FIRED
        }
    }

    /// Data for STAGE_ENTERED / STAGE_COMPLETED events
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct StageData {
        pub scenario_id: String,
        pub stage_id: String,
    }
}
