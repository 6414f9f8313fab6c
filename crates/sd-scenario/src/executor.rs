//! Action executor
//!
//! Executes declarative actions against the desktop collaborators and
//! the scenario run state. Sequential execution runs actions strictly in
//! order, each fully finishing (including suspensions such as a modal
//! dialog) before the next starts; parallel execution runs all branches
//! concurrently and collects every result.
//!
//! The executor does not import the condition evaluator: `conditional`
//! actions go through the [`EvaluateCondition`] interface injected at
//! construction, and flow-control actions go through [`ScenarioFlow`].

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use sd_core::events::{self, VariableChangedData};
use sd_core::{path, Context};
use sd_desktop::{
    AchievementStore, Desktop, DesktopIcon, DesktopShell, DialogService, FeatureFlags,
    SoundService, VirtualFs, WindowManager,
};
use sd_event_bus::EventBus;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::action::{Action, ActionError, StateOp};
use crate::condition::Condition;
use crate::runtime::{ContextBuilder, EvalContext, EventRecord, SharedRunState};

/// Built-in action type names, used to warn when an extension overrides one
const BUILTIN_ACTION_TYPES: [&str; 31] = [
    "createFile",
    "writeFile",
    "appendFile",
    "deleteFile",
    "addDesktopIcon",
    "removeDesktopIcon",
    "showDialog",
    "showNotification",
    "assistantSay",
    "playSound",
    "stopSound",
    "launchApp",
    "closeApp",
    "focusApp",
    "lockApp",
    "unlockApp",
    "unlockAchievement",
    "setVariable",
    "modifyState",
    "emitEvent",
    "advanceStage",
    "completeScenario",
    "failScenario",
    "wait",
    "showHint",
    "playEffect",
    "setTheme",
    "enableFeature",
    "disableFeature",
    "conditional",
    "repeat",
];

/// Evaluation interface the executor depends on
///
/// The condition evaluator implements this; the executor never imports
/// it directly, which breaks the cycle between `conditional` actions and
/// condition evaluation.
pub trait EvaluateCondition: Send + Sync {
    /// Whether the condition holds, fail-closed
    fn passes(&self, condition: &Condition, ctx: &EvalContext) -> bool;
}

/// Flow errors surfaced by scenario flow-control actions
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("No scenario is running")]
    NotRunning,

    #[error("Unknown stage: {0}")]
    UnknownStage(String),
}

/// Scenario flow control, implemented by the orchestrator
///
/// Held as a weak reference: once the orchestrator is gone, flow actions
/// fail instead of keeping a dead run alive.
#[async_trait]
pub trait ScenarioFlow: Send + Sync {
    /// Mark the current stage completed and enter the given stage
    async fn advance_to_stage(&self, stage_id: &str) -> Result<(), FlowError>;

    /// Complete the scenario
    async fn complete_scenario(&self) -> Result<(), FlowError>;

    /// Fail the scenario
    async fn fail_scenario(&self, reason: Option<String>) -> Result<(), FlowError>;

    /// Show a hint: the given message, or the current stage's next hint
    async fn show_hint(&self, message: Option<String>) -> Result<(), FlowError>;
}

/// Result of executing one action
#[derive(Debug, Clone, serde::Serialize)]
pub struct ActionOutcome {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    /// Successful outcome with no result value
    pub fn ok() -> Self {
        Self {
            success: true,
            result: None,
            error: None,
        }
    }

    /// Successful outcome carrying a result value
    pub fn with_result(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Failed outcome
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Execution context threaded through an action sequence
///
/// Carries the triggering event and trigger id so nested conditions and
/// notifications can reference them.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// The event that started this sequence (if any)
    pub event: Option<EventRecord>,

    /// The trigger that fired (if any)
    pub trigger_id: Option<String>,
}

impl ExecutionContext {
    /// Create an empty execution context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with a triggering event
    pub fn with_event(event: EventRecord) -> Self {
        Self {
            event: Some(event),
            trigger_id: None,
        }
    }

    /// Set the trigger id
    pub fn with_trigger(mut self, trigger_id: impl Into<String>) -> Self {
        self.trigger_id = Some(trigger_id.into());
        self
    }
}

/// A custom action handler: raw authored parameters plus the evaluation context
pub type CustomHandler = Arc<dyn Fn(&Map<String, Value>, &EvalContext) -> ActionOutcome + Send + Sync>;

/// Registry of externally provided action types
///
/// Injected at construction; a name registered here wins over the
/// built-in of the same name, with a logged warning.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: DashMap<String, CustomHandler>,
}

impl ActionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a type name
    pub fn register<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Map<String, Value>, &EvalContext) -> ActionOutcome + Send + Sync + 'static,
    {
        let name = name.into();
        if BUILTIN_ACTION_TYPES.contains(&name.as_str()) {
            warn!(name = %name, "Custom action overrides a built-in type");
        } else if self.handlers.contains_key(&name) {
            warn!(name = %name, "Custom action replaces a previous registration");
        }
        self.handlers.insert(name, Arc::new(handler));
    }

    /// Look up a handler by type name
    pub fn get(&self, name: &str) -> Option<CustomHandler> {
        self.handlers.get(name).map(|h| h.value().clone())
    }
}

/// Action executor
///
/// Executes actions with access to the desktop collaborators, the run
/// state, and the injected evaluation and flow interfaces.
pub struct ActionExecutor {
    vfs: Arc<VirtualFs>,
    windows: Arc<WindowManager>,
    achievements: Arc<AchievementStore>,
    features: Arc<FeatureFlags>,
    dialogs: Arc<DialogService>,
    shell: Arc<DesktopShell>,
    sounds: Arc<SoundService>,
    event_bus: Arc<EventBus>,
    run: SharedRunState,
    contexts: ContextBuilder,
    evaluator: Arc<dyn EvaluateCondition>,
    flow: Weak<dyn ScenarioFlow>,
    registry: Arc<ActionRegistry>,
}

impl ActionExecutor {
    /// Create a new executor over the desktop collaborators
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        desktop: &Desktop,
        event_bus: Arc<EventBus>,
        run: SharedRunState,
        contexts: ContextBuilder,
        evaluator: Arc<dyn EvaluateCondition>,
        flow: Weak<dyn ScenarioFlow>,
        registry: Arc<ActionRegistry>,
    ) -> Self {
        Self {
            vfs: desktop.vfs.clone(),
            windows: desktop.windows.clone(),
            achievements: desktop.achievements.clone(),
            features: desktop.features.clone(),
            dialogs: desktop.dialogs.clone(),
            shell: desktop.shell.clone(),
            sounds: desktop.sounds.clone(),
            event_bus,
            run,
            contexts,
            evaluator,
            flow,
            registry,
        }
    }

    /// Execute a single action
    ///
    /// Emits attempted/completed/failed lifecycle notifications around
    /// the handler. Handler failures become `{success: false, error}`;
    /// they never propagate as errors.
    pub fn execute<'a>(
        &'a self,
        action: &'a Action,
        scope: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = ActionOutcome> + Send + 'a>> {
        Box::pin(async move {
            trace!(action = action.type_name(), "Executing action");
            self.notify(events::ACTION_ATTEMPTED, action, scope, None);

            let outcome = self.dispatch(action, scope).await;

            if outcome.success {
                self.notify(events::ACTION_COMPLETED, action, scope, Some(&outcome));
            } else {
                debug!(
                    action = action.type_name(),
                    error = outcome.error.as_deref().unwrap_or(""),
                    "Action failed"
                );
                self.notify(events::ACTION_FAILED, action, scope, Some(&outcome));
            }

            outcome
        })
    }

    /// Execute actions strictly in order
    ///
    /// Each action fully finishes (including any suspension) before the
    /// next starts. With `stop_on_failure` the remaining actions are
    /// skipped after the first failure; otherwise all actions run.
    pub async fn execute_sequence(
        &self,
        actions: &[Action],
        scope: &ExecutionContext,
        stop_on_failure: bool,
    ) -> Vec<ActionOutcome> {
        debug!(count = actions.len(), "Executing action sequence");
        let mut outcomes = Vec::with_capacity(actions.len());

        for action in actions {
            let outcome = self.execute(action, scope).await;
            let failed = !outcome.success;
            outcomes.push(outcome);

            if failed && stop_on_failure {
                debug!("Stopping sequence on failure");
                break;
            }
        }

        outcomes
    }

    /// Execute actions concurrently, collecting all results
    pub async fn execute_parallel(
        &self,
        actions: &[Action],
        scope: &ExecutionContext,
    ) -> Vec<ActionOutcome> {
        debug!(count = actions.len(), "Executing actions in parallel");
        join_all(actions.iter().map(|action| self.execute(action, scope))).await
    }

    // --- Dispatch ---

    async fn dispatch(&self, action: &Action, scope: &ExecutionContext) -> ActionOutcome {
        // A registered handler under this name wins, built-in or not
        if let Some(handler) = self.registry.get(action.type_name()) {
            let ctx = self.eval_context(scope);
            return handler(&action_params(action), &ctx);
        }

        match action {
            Action::CreateFile { path, content } => match self.vfs.create(path, content.clone()) {
                Ok(()) => ActionOutcome::ok(),
                Err(e) => ActionOutcome::failed(e.to_string()),
            },
            Action::WriteFile { path, content } => {
                self.vfs.write(path, content.clone());
                ActionOutcome::ok()
            }
            Action::AppendFile { path, content } => {
                self.vfs.append(path, content);
                ActionOutcome::ok()
            }
            Action::DeleteFile { path } => match self.vfs.delete(path) {
                Ok(()) => ActionOutcome::ok(),
                Err(e) => ActionOutcome::failed(e.to_string()),
            },
            Action::AddDesktopIcon {
                id,
                label,
                icon,
                target,
            } => {
                self.shell.add_icon(DesktopIcon {
                    id: id.clone(),
                    label: label.clone(),
                    icon: icon.clone(),
                    target: target.clone(),
                });
                ActionOutcome::ok()
            }
            Action::RemoveDesktopIcon { id } => {
                if self.shell.remove_icon(id) {
                    ActionOutcome::ok()
                } else {
                    ActionOutcome::failed(format!("No desktop icon with id: {}", id))
                }
            }
            Action::ShowDialog {
                title,
                message,
                buttons,
            } => {
                // Suspends this sequence until the host dismisses the dialog
                match self.dialogs.show(title, message, buttons.clone()).await {
                    Ok(choice) => ActionOutcome::with_result(choice),
                    Err(e) => ActionOutcome::failed(e.to_string()),
                }
            }
            Action::ShowNotification {
                title,
                message,
                icon,
            } => {
                self.shell.notify(title, message, icon.as_deref());
                ActionOutcome::ok()
            }
            Action::AssistantSay { message, mood } => {
                self.shell.assistant_say(message, mood.as_deref());
                ActionOutcome::ok()
            }
            Action::PlaySound { sound, looped } => {
                self.sounds.play(sound, *looped);
                ActionOutcome::ok()
            }
            Action::StopSound { sound } => {
                self.sounds.stop(sound.as_deref());
                ActionOutcome::ok()
            }
            Action::LaunchApp { app_id } => match self.windows.launch(app_id) {
                Ok(()) => ActionOutcome::ok(),
                Err(e) => ActionOutcome::failed(e.to_string()),
            },
            Action::CloseApp { app_id } => match self.windows.close(app_id) {
                Ok(()) => ActionOutcome::ok(),
                Err(e) => ActionOutcome::failed(e.to_string()),
            },
            Action::FocusApp { app_id } => match self.windows.focus(app_id) {
                Ok(()) => ActionOutcome::ok(),
                Err(e) => ActionOutcome::failed(e.to_string()),
            },
            Action::LockApp { app_id } => {
                self.windows.lock(app_id);
                ActionOutcome::ok()
            }
            Action::UnlockApp { app_id } => {
                self.windows.unlock(app_id);
                ActionOutcome::ok()
            }
            Action::UnlockAchievement { id } => {
                let newly = self.achievements.unlock(id);
                ActionOutcome::with_result(json!({"newlyUnlocked": newly}))
            }
            Action::SetVariable { path, value } => self.set_variable(path, value.clone()),
            Action::ModifyState {
                path,
                operation,
                value,
            } => self.modify_state(path, *operation, value.as_ref()),
            Action::EmitEvent { event, data } => {
                let payload = if data.is_null() { json!({}) } else { data.clone() };
                self.event_bus
                    .publish_named(event.as_str(), payload, Context::new());
                ActionOutcome::ok()
            }
            Action::AdvanceStage { stage } => self.flow_result(|flow| {
                let stage = stage.clone();
                async move { flow.advance_to_stage(&stage).await }
            })
            .await,
            Action::CompleteScenario => {
                self.flow_result(|flow| async move { flow.complete_scenario().await })
                    .await
            }
            Action::FailScenario { reason } => {
                let reason = reason.clone();
                self.flow_result(|flow| async move { flow.fail_scenario(reason).await })
                    .await
            }
            Action::Wait { millis } => {
                tokio::time::sleep(Duration::from_millis(*millis)).await;
                ActionOutcome::ok()
            }
            Action::ShowHint { message } => {
                let message = message.clone();
                self.flow_result(|flow| async move { flow.show_hint(message).await })
                    .await
            }
            Action::PlayEffect {
                effect,
                duration_ms,
            } => {
                self.shell.play_effect(effect, *duration_ms);
                ActionOutcome::ok()
            }
            Action::SetTheme { theme } => {
                self.shell.set_theme(theme);
                ActionOutcome::ok()
            }
            Action::EnableFeature { feature } => {
                self.features.enable(feature);
                ActionOutcome::ok()
            }
            Action::DisableFeature { feature } => {
                self.features.disable(feature);
                ActionOutcome::ok()
            }
            Action::Conditional {
                condition,
                then,
                r#else,
            } => {
                let ctx = self.eval_context(scope);
                let branch = self.evaluator.passes(condition, &ctx);
                let (name, actions) = if branch {
                    ("then", then)
                } else {
                    ("else", r#else)
                };
                debug!(branch = name, "Conditional action branch chosen");

                self.execute_sequence(actions, scope, false).await;
                ActionOutcome::with_result(json!({"branch": name}))
            }
            Action::Repeat {
                count,
                actions,
                delay,
            } => {
                for iteration in 0..*count {
                    self.execute_sequence(actions, scope, false).await;
                    if let Some(millis) = delay {
                        if iteration + 1 < *count {
                            tokio::time::sleep(Duration::from_millis(*millis)).await;
                        }
                    }
                }
                ActionOutcome::with_result(json!({"iterations": count}))
            }
            Action::Custom(custom) => match self.registry.get(&custom.kind) {
                Some(handler) => {
                    let ctx = self.eval_context(scope);
                    handler(&custom.params, &ctx)
                }
                None => ActionOutcome::failed(ActionError::UnknownType.to_string()),
            },
        }
    }

    // --- Helpers ---

    fn eval_context(&self, scope: &ExecutionContext) -> EvalContext {
        self.contexts
            .build(scope.event.clone(), scope.trigger_id.clone())
    }

    async fn flow_result<'a, F, Fut>(&'a self, call: F) -> ActionOutcome
    where
        F: FnOnce(Arc<dyn ScenarioFlow>) -> Fut,
        Fut: Future<Output = Result<(), FlowError>> + 'a,
    {
        let Some(flow) = self.flow.upgrade() else {
            return ActionOutcome::failed(FlowError::NotRunning.to_string());
        };
        match call(flow).await {
            Ok(()) => ActionOutcome::ok(),
            Err(e) => ActionOutcome::failed(e.to_string()),
        }
    }

    fn set_variable(&self, var_path: &str, value: Value) -> ActionOutcome {
        match self.run.set_variable(var_path, value.clone()) {
            Ok(old_value) => {
                self.event_bus.publish_typed(
                    VariableChangedData {
                        path: var_path.to_string(),
                        old_value,
                        new_value: value,
                    },
                    Context::new(),
                );
                ActionOutcome::ok()
            }
            Err(e) => ActionOutcome::failed(e),
        }
    }

    fn modify_state(&self, var_path: &str, op: StateOp, operand: Option<&Value>) -> ActionOutcome {
        let current = self.run.get_variable(var_path);

        let new_value = match op {
            StateOp::Increment | StateOp::Decrement => {
                let amount = operand.and_then(path::as_f64).unwrap_or(1.0);
                let base = current.as_ref().and_then(path::as_f64).unwrap_or(0.0);
                let signed = if op == StateOp::Increment {
                    base + amount
                } else {
                    base - amount
                };
                number_value(signed)
            }
            StateOp::Multiply | StateOp::Divide => {
                let Some(amount) = operand.and_then(path::as_f64) else {
                    return ActionOutcome::failed(
                        ActionError::InvalidParams(format!("{:?} requires a numeric value", op))
                            .to_string(),
                    );
                };
                if op == StateOp::Divide && amount == 0.0 {
                    return ActionOutcome::failed(
                        ActionError::InvalidParams("cannot divide by zero".to_string()).to_string(),
                    );
                }
                let base = current.as_ref().and_then(path::as_f64).unwrap_or(0.0);
                let result = if op == StateOp::Multiply {
                    base * amount
                } else {
                    base / amount
                };
                number_value(result)
            }
            StateOp::Append => {
                let Some(item) = operand else {
                    return ActionOutcome::failed("modifyState append requires a value");
                };
                let mut items = match current {
                    Some(Value::Array(items)) => items,
                    Some(_) => {
                        return ActionOutcome::failed(format!(
                            "Variable at '{}' is not an array",
                            var_path
                        ))
                    }
                    None => Vec::new(),
                };
                items.push(item.clone());
                Value::Array(items)
            }
            StateOp::Remove => match operand {
                Some(item) => {
                    let Some(Value::Array(mut items)) = current else {
                        return ActionOutcome::failed(format!(
                            "Variable at '{}' is not an array",
                            var_path
                        ));
                    };
                    items.retain(|existing| existing != item);
                    Value::Array(items)
                }
                None => {
                    let removed = self.run.remove_variable(var_path);
                    self.event_bus.publish_typed(
                        VariableChangedData {
                            path: var_path.to_string(),
                            old_value: removed,
                            new_value: Value::Null,
                        },
                        Context::new(),
                    );
                    return ActionOutcome::ok();
                }
            },
            StateOp::Toggle => match current {
                Some(Value::Bool(b)) => Value::Bool(!b),
                None => Value::Bool(true),
                Some(_) => {
                    return ActionOutcome::failed(format!(
                        "Variable at '{}' is not a boolean",
                        var_path
                    ))
                }
            },
        };

        self.set_variable(var_path, new_value)
    }

    fn notify(
        &self,
        name: &str,
        action: &Action,
        scope: &ExecutionContext,
        outcome: Option<&ActionOutcome>,
    ) {
        let mut payload = json!({
            "actionType": action.type_name(),
            "triggerId": scope.trigger_id,
        });
        if let Some(outcome) = outcome {
            payload["success"] = json!(outcome.success);
            if let Some(error) = &outcome.error {
                payload["error"] = json!(error);
            }
        }
        self.event_bus.publish_named(name, payload, Context::new());
    }
}

/// Finite f64 to JSON number, preserving integers
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < i64::MAX as f64 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

/// The authored parameters of an action, for custom handler dispatch
fn action_params(action: &Action) -> Map<String, Value> {
    match serde_json::to_value(action) {
        Ok(Value::Object(mut map)) => {
            map.remove("type");
            map
        }
        _ => Map::new(),
    }
}
