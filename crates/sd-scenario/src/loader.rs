//! Scenario loading and validation
//!
//! Parses scenario definitions from YAML or JSON, applies defaults
//! (serde-side), and performs structural validation. Errors are
//! collected as `{field, message}` pairs and a failed load installs
//! nothing, unless the caller explicitly opts to ignore errors.

use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::action::Action;
use crate::scenario::{ScenarioDefinition, TriggerDef};

/// One structural problem found during validation
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LoadError {
    pub field: String,
    pub message: String,
}

impl LoadError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Load failure: parse error or collected validation errors
#[derive(Debug, Error)]
pub enum LoadFailure {
    #[error("Scenario failed to parse: {0}")]
    Parse(String),

    #[error("Scenario failed validation ({} problem(s))", .0.len())]
    Invalid(Vec<LoadError>),
}

impl LoadFailure {
    /// The first human-readable error message, for user-facing surfaces
    pub fn first_message(&self) -> String {
        match self {
            LoadFailure::Parse(message) => message.clone(),
            LoadFailure::Invalid(errors) => errors
                .first()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "invalid scenario".to_string()),
        }
    }
}

/// Parse and validate a scenario from YAML (or JSON, which YAML accepts)
pub fn load_str(text: &str) -> Result<ScenarioDefinition, LoadFailure> {
    let definition: ScenarioDefinition =
        serde_yaml::from_str(text).map_err(|e| LoadFailure::Parse(e.to_string()))?;
    finish(definition, false)
}

/// Parse and validate a scenario from a JSON value
pub fn load_value(value: serde_json::Value) -> Result<ScenarioDefinition, LoadFailure> {
    let definition: ScenarioDefinition =
        serde_json::from_value(value).map_err(|e| LoadFailure::Parse(e.to_string()))?;
    finish(definition, false)
}

/// Like [`load_value`], but installs the definition even when validation
/// finds problems (they are logged instead)
pub fn load_value_ignoring_errors(
    value: serde_json::Value,
) -> Result<ScenarioDefinition, LoadFailure> {
    let definition: ScenarioDefinition =
        serde_json::from_value(value).map_err(|e| LoadFailure::Parse(e.to_string()))?;
    finish(definition, true)
}

fn finish(
    mut definition: ScenarioDefinition,
    ignore_errors: bool,
) -> Result<ScenarioDefinition, LoadFailure> {
    let errors = validate(&definition);
    if !errors.is_empty() {
        if !ignore_errors {
            return Err(LoadFailure::Invalid(errors));
        }
        for error in &errors {
            warn!(%error, "Scenario problem ignored at caller's request");
        }
    }

    apply_defaults(&mut definition);
    debug!(
        scenario = %definition.id,
        stages = definition.stages.len(),
        "Scenario loaded"
    );
    Ok(definition)
}

/// Structural validation, collecting every problem found
pub fn validate(definition: &ScenarioDefinition) -> Vec<LoadError> {
    let mut errors = Vec::new();

    if definition.id.is_empty() {
        errors.push(LoadError::new("id", "scenario id is required"));
    }
    if definition.name.is_empty() {
        errors.push(LoadError::new("name", "scenario name is required"));
    }
    if definition.stages.is_empty() {
        errors.push(LoadError::new("stages", "at least one stage is required"));
    }

    let mut stage_ids = HashSet::new();
    let mut initial_count = 0;
    for (index, stage) in definition.stages.iter().enumerate() {
        let field = format!("stages[{}]", index);
        if stage.id.is_empty() {
            errors.push(LoadError::new(format!("{}.id", field), "stage id is required"));
        } else if !stage_ids.insert(stage.id.clone()) {
            errors.push(LoadError::new(
                format!("{}.id", field),
                format!("duplicate stage id '{}'", stage.id),
            ));
        }
        if stage.initial {
            initial_count += 1;
        }
    }
    if initial_count > 1 {
        errors.push(LoadError::new(
            "stages",
            "at most one stage may be flagged initial",
        ));
    }

    // advanceStage targets must name stages that exist
    let known: HashSet<&str> = definition.stages.iter().map(|s| s.id.as_str()).collect();
    let mut check_actions = |field: &str, actions: &[Action]| {
        for target in stage_targets(actions) {
            if !known.contains(target.as_str()) {
                errors.push(LoadError::new(
                    field.to_string(),
                    format!("advanceStage targets unknown stage '{}'", target),
                ));
            }
        }
    };
    for (index, stage) in definition.stages.iter().enumerate() {
        check_actions(&format!("stages[{}].onEnter", index), &stage.on_enter);
        check_actions(&format!("stages[{}].onExit", index), &stage.on_exit);
        for (t, trigger) in stage.triggers.iter().enumerate() {
            check_actions(
                &format!("stages[{}].triggers[{}].actions", index, t),
                &trigger.actions,
            );
        }
    }
    for (t, trigger) in definition.global_triggers.iter().enumerate() {
        check_actions(&format!("globalTriggers[{}].actions", t), &trigger.actions);
    }
    check_actions("onStart", &definition.on_start);

    errors
}

/// Stage ids referenced by advanceStage actions, recursively
fn stage_targets(actions: &[Action]) -> Vec<String> {
    let mut targets = Vec::new();
    for action in actions {
        match action {
            Action::AdvanceStage { stage } => targets.push(stage.clone()),
            Action::Conditional { then, r#else, .. } => {
                targets.extend(stage_targets(then));
                targets.extend(stage_targets(r#else));
            }
            Action::Repeat { actions, .. } => targets.extend(stage_targets(actions)),
            _ => {}
        }
    }
    targets
}

/// Fill in defaults serde cannot: generated trigger ids, duplicate-id warnings
fn apply_defaults(definition: &mut ScenarioDefinition) {
    let mut seen = HashSet::new();
    let mut fill = |trigger: &mut TriggerDef| {
        if trigger.id.is_empty() {
            trigger.id = Ulid::new().to_string();
        }
        if !seen.insert(trigger.id.clone()) {
            warn!(trigger = %trigger.id, "Duplicate trigger id in scenario");
        }
    };

    for trigger in &mut definition.global_triggers {
        fill(trigger);
    }
    for stage in &mut definition.stages {
        for trigger in &mut stage.triggers {
            fill(trigger);
        }
    }
}
