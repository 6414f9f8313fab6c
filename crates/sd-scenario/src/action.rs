//! Action types
//!
//! Actions are declarative commands executed for their side effects on
//! the desktop collaborators and the scenario run: file mutation, UI
//! prompts, app lifecycle, variable mutation, flow control, and the
//! nested `conditional` and `repeat` forms. Unknown `type` tags fall
//! through to the `Custom` variant for externally registered handlers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::condition::Condition;

/// Action errors
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Unknown action type")]
    UnknownType,

    #[error("Invalid action parameters: {0}")]
    InvalidParams(String),
}

/// A scenario action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    /// Create a virtual file (fails if it exists)
    CreateFile {
        path: String,
        #[serde(default)]
        content: String,
    },

    /// Write a virtual file, creating or replacing it
    WriteFile { path: String, content: String },

    /// Append to a virtual file, creating it if missing
    AppendFile { path: String, content: String },

    /// Delete a virtual file
    DeleteFile { path: String },

    /// Add an icon to the desktop
    AddDesktopIcon {
        id: String,
        label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        icon: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },

    /// Remove an icon from the desktop
    RemoveDesktopIcon { id: String },

    /// Show a modal dialog and suspend until it is dismissed
    ShowDialog {
        title: String,
        message: String,
        #[serde(default = "default_buttons")]
        buttons: Vec<String>,
    },

    /// Show a toast notification
    ShowNotification {
        title: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        icon: Option<String>,
    },

    /// Have the desktop assistant say something
    AssistantSay {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mood: Option<String>,
    },

    /// Play a named sound
    PlaySound {
        sound: String,
        #[serde(default)]
        looped: bool,
    },

    /// Stop a named sound, or all sounds
    StopSound {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sound: Option<String>,
    },

    /// Launch an application
    #[serde(rename_all = "camelCase")]
    LaunchApp { app_id: String },

    /// Close an application
    #[serde(rename_all = "camelCase")]
    CloseApp { app_id: String },

    /// Focus an application
    #[serde(rename_all = "camelCase")]
    FocusApp { app_id: String },

    /// Lock an application
    #[serde(rename_all = "camelCase")]
    LockApp { app_id: String },

    /// Unlock an application
    #[serde(rename_all = "camelCase")]
    UnlockApp { app_id: String },

    /// Unlock an achievement
    UnlockAchievement { id: String },

    /// Set a scenario variable at a dot path
    SetVariable { path: String, value: Value },

    /// Mutate a scenario variable in place
    ModifyState {
        path: String,
        operation: StateOp,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },

    /// Publish an arbitrary semantic event
    EmitEvent {
        event: String,
        #[serde(default)]
        data: Value,
    },

    /// Mark the current stage completed and enter another
    AdvanceStage { stage: String },

    /// Complete the scenario
    CompleteScenario,

    /// Fail the scenario
    FailScenario {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Pause the sequence for a fixed duration
    Wait { millis: u64 },

    /// Show a hint (the given message, or the stage's next hint)
    ShowHint {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Play a visual effect
    #[serde(rename_all = "camelCase")]
    PlayEffect {
        effect: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },

    /// Switch the desktop theme
    SetTheme { theme: String },

    /// Enable a feature flag
    EnableFeature { feature: String },

    /// Disable a feature flag
    DisableFeature { feature: String },

    /// Conditional branch over nested action lists
    Conditional {
        condition: Condition,
        #[serde(default)]
        then: Vec<Action>,
        #[serde(default, rename = "else")]
        r#else: Vec<Action>,
    },

    /// Bounded repetition of a nested action list
    Repeat {
        count: u64,
        actions: Vec<Action>,
        /// Optional inter-iteration delay in milliseconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delay: Option<u64>,
    },

    /// Externally registered action type
    #[serde(untagged)]
    Custom(CustomAction),
}

fn default_buttons() -> Vec<String> {
    vec!["OK".to_string()]
}

impl Action {
    /// The `type` tag this action was authored with
    pub fn type_name(&self) -> &str {
        match self {
            Action::CreateFile { .. } => "createFile",
            Action::WriteFile { .. } => "writeFile",
            Action::AppendFile { .. } => "appendFile",
            Action::DeleteFile { .. } => "deleteFile",
            Action::AddDesktopIcon { .. } => "addDesktopIcon",
            Action::RemoveDesktopIcon { .. } => "removeDesktopIcon",
            Action::ShowDialog { .. } => "showDialog",
            Action::ShowNotification { .. } => "showNotification",
            Action::AssistantSay { .. } => "assistantSay",
            Action::PlaySound { .. } => "playSound",
            Action::StopSound { .. } => "stopSound",
            Action::LaunchApp { .. } => "launchApp",
            Action::CloseApp { .. } => "closeApp",
            Action::FocusApp { .. } => "focusApp",
            Action::LockApp { .. } => "lockApp",
            Action::UnlockApp { .. } => "unlockApp",
            Action::UnlockAchievement { .. } => "unlockAchievement",
            Action::SetVariable { .. } => "setVariable",
            Action::ModifyState { .. } => "modifyState",
            Action::EmitEvent { .. } => "emitEvent",
            Action::AdvanceStage { .. } => "advanceStage",
            Action::CompleteScenario => "completeScenario",
            Action::FailScenario { .. } => "failScenario",
            Action::Wait { .. } => "wait",
            Action::ShowHint { .. } => "showHint",
            Action::PlayEffect { .. } => "playEffect",
            Action::SetTheme { .. } => "setTheme",
            Action::EnableFeature { .. } => "enableFeature",
            Action::DisableFeature { .. } => "disableFeature",
            Action::Conditional { .. } => "conditional",
            Action::Repeat { .. } => "repeat",
            Action::Custom(custom) => &custom.kind,
        }
    }
}

/// Variable mutation operator for `modifyState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StateOp {
    /// Add `value` (default 1) to a numeric variable
    Increment,
    /// Subtract `value` (default 1) from a numeric variable
    Decrement,
    /// Multiply a numeric variable by `value`
    Multiply,
    /// Divide a numeric variable by `value`
    Divide,
    /// Push `value` onto an array variable (created if missing)
    Append,
    /// Remove `value` from an array variable, or delete the path when
    /// no value is given
    Remove,
    /// Negate a boolean variable (missing becomes true)
    Toggle,
}

/// An externally registered action, preserved as raw parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomAction {
    /// Registered type name
    #[serde(rename = "type")]
    pub kind: String,

    /// Remaining parameters as authored
    #[serde(flatten)]
    pub params: Map<String, Value>,
}
