//! Scenario orchestrator
//!
//! The top-level state machine driving one scenario run:
//!
//! ```text
//! Unloaded -> Loaded -> Running <-> Paused -> {Completed | Failed | Aborted}
//! ```
//!
//! The orchestrator owns the definition, constructs the trigger engine
//! and action executor on `start`, performs stage transitions, runs
//! lifecycle action lists, schedules hints, and persists completion to
//! the durable state store. Flow-control actions reach back into it
//! through the [`ScenarioFlow`] trait held by the executor as a weak
//! reference.

use async_trait::async_trait;
use chrono::Utc;
use sd_core::events;
use sd_core::Context;
use sd_desktop::Desktop;
use sd_event_bus::EventBus;
use sd_state_store::StateStore;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::TriggerEngine;
use crate::eval::ConditionEvaluator;
use crate::executor::{ActionExecutor, ExecutionContext, FlowError, ScenarioFlow};
use crate::loader::{self, LoadFailure};
use crate::runtime::{ContextBuilder, EngineStats, SharedRunState};
use crate::scenario::ScenarioDefinition;
use crate::Extensions;

/// Orchestrator errors
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("No scenario is loaded")]
    NotLoaded,

    #[error("No scenario is running")]
    NotRunning,

    #[error("A scenario is already running")]
    AlreadyRunning,

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error(transparent)]
    Load(#[from] LoadFailure),
}

/// Result type for orchestrator operations
pub type ScenarioResult<T> = Result<T, ScenarioError>;

/// Orchestrator lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioPhase {
    Unloaded,
    Loaded,
    Running,
    Paused,
    Completed,
    Failed,
    Aborted,
}

/// The scenario orchestrator
pub struct ScenarioOrchestrator {
    event_bus: Arc<EventBus>,
    state_store: Arc<StateStore>,
    desktop: Arc<Desktop>,
    extensions: Extensions,

    definition: RwLock<Option<Arc<ScenarioDefinition>>>,
    run: SharedRunState,
    engine: Mutex<Option<Arc<TriggerEngine>>>,
    executor: Mutex<Option<Arc<ActionExecutor>>>,
    phase: Mutex<ScenarioPhase>,
    hint_timer: Mutex<Option<JoinHandle<()>>>,

    weak_self: Weak<ScenarioOrchestrator>,
}

impl ScenarioOrchestrator {
    /// Create an orchestrator over the desktop collaborators
    pub fn new(
        event_bus: Arc<EventBus>,
        state_store: Arc<StateStore>,
        desktop: Arc<Desktop>,
        extensions: Extensions,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            event_bus,
            state_store,
            desktop,
            extensions,
            definition: RwLock::new(None),
            run: SharedRunState::new(),
            engine: Mutex::new(None),
            executor: Mutex::new(None),
            phase: Mutex::new(ScenarioPhase::Unloaded),
            hint_timer: Mutex::new(None),
            weak_self: weak_self.clone(),
        })
    }

    // --- Accessors ---

    /// Current lifecycle phase
    pub fn phase(&self) -> ScenarioPhase {
        *self.phase.lock().expect("phase lock poisoned")
    }

    /// The loaded definition, if any
    pub fn definition(&self) -> Option<Arc<ScenarioDefinition>> {
        self.definition
            .read()
            .expect("definition lock poisoned")
            .clone()
    }

    /// The running engine, if any (hosts may register extra triggers)
    pub fn engine(&self) -> Option<Arc<TriggerEngine>> {
        self.engine.lock().expect("engine lock poisoned").clone()
    }

    /// Snapshot of the scenario variables
    pub fn variables(&self) -> Value {
        self.run.variables()
    }

    /// A scenario variable by dot path
    pub fn get_variable(&self, path: &str) -> Option<Value> {
        self.run.get_variable(path)
    }

    /// Current stage id
    pub fn current_stage(&self) -> Option<String> {
        self.run.current_stage()
    }

    /// Hints shown this run
    pub fn hints_shown(&self) -> u32 {
        self.run.hints_shown()
    }

    pub fn is_running(&self) -> bool {
        self.run.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.run.is_paused()
    }

    // --- Loading ---

    /// Load a scenario from a JSON value
    ///
    /// On failure the previously loaded scenario (if any) stays
    /// installed; the first error message is surfaced in a dialog.
    pub async fn load(&self, source: Value) -> ScenarioResult<()> {
        self.install(loader::load_value(source)).await
    }

    /// Load a scenario from YAML or JSON text
    pub async fn load_str(&self, text: &str) -> ScenarioResult<()> {
        self.install(loader::load_str(text)).await
    }

    /// Load, installing the definition even when validation fails
    pub async fn load_ignoring_errors(&self, source: Value) -> ScenarioResult<()> {
        self.install(loader::load_value_ignoring_errors(source)).await
    }

    async fn install(
        &self,
        loaded: Result<ScenarioDefinition, LoadFailure>,
    ) -> ScenarioResult<()> {
        let definition = match loaded {
            Ok(definition) => definition,
            Err(failure) => {
                warn!(error = %failure, "Scenario load failed");
                // Surface the first problem to the user without blocking
                let dialogs = self.desktop.dialogs.clone();
                let message = failure.first_message();
                tokio::spawn(async move {
                    let _ = dialogs
                        .show("Scenario failed to load", message, vec!["OK".to_string()])
                        .await;
                });
                return Err(failure.into());
            }
        };

        if self.run.is_running() {
            self.stop(false).await;
        }

        info!(scenario = %definition.id, name = %definition.name, "Scenario loaded");
        self.run.reset(definition.variables.clone());

        let payload = json!({
            "scenarioId": definition.id,
            "name": definition.name,
            "version": definition.version,
        });
        *self.definition.write().expect("definition lock poisoned") =
            Some(Arc::new(definition));
        *self.phase.lock().expect("phase lock poisoned") = ScenarioPhase::Loaded;

        self.event_bus
            .publish_named(events::SCENARIO_LOADED, payload, Context::new());
        Ok(())
    }

    // --- Run lifecycle ---

    /// Start a run of the loaded scenario
    pub async fn start(&self) -> ScenarioResult<()> {
        let definition = self.definition().ok_or(ScenarioError::NotLoaded)?;
        if self.run.is_running() {
            return Err(ScenarioError::AlreadyRunning);
        }

        info!(scenario = %definition.id, "Starting scenario");

        // Runs never share state: rebuild variables, history, counters
        self.run.reset(definition.variables.clone());

        let stats = Arc::new(EngineStats::new());
        let contexts = ContextBuilder::new(self.run.clone(), stats.clone());
        let evaluator = Arc::new(ConditionEvaluator::new(
            self.desktop.vfs.clone(),
            self.desktop.windows.clone(),
            self.desktop.achievements.clone(),
            self.desktop.features.clone(),
            self.extensions.conditions.clone(),
        ));

        let flow: Weak<dyn ScenarioFlow> = {
            let strong = self.weak_self.upgrade().expect("orchestrator not in Arc");
            let as_flow: Arc<dyn ScenarioFlow> = strong;
            Arc::downgrade(&as_flow)
        };

        let executor = Arc::new(ActionExecutor::new(
            &self.desktop,
            self.event_bus.clone(),
            self.run.clone(),
            contexts,
            evaluator.clone(),
            flow,
            self.extensions.actions.clone(),
        ));

        let engine = TriggerEngine::new(
            self.event_bus.clone(),
            executor.clone(),
            evaluator,
            self.extensions.matchers.clone(),
            self.run.clone(),
            stats,
        );
        for trigger in definition.global_triggers.iter().cloned() {
            engine.register_trigger(trigger);
        }
        engine.start();

        *self.engine.lock().expect("engine lock poisoned") = Some(engine);
        *self.executor.lock().expect("executor lock poisoned") = Some(executor.clone());

        self.run.mark_started();
        *self.phase.lock().expect("phase lock poisoned") = ScenarioPhase::Running;

        // The config rides along so the host can surface skip/progress
        // affordances for this run
        self.event_bus.publish_named(
            events::SCENARIO_STARTED,
            json!({
                "scenarioId": definition.id,
                "name": definition.name,
                "version": definition.version,
                "config": definition.config,
            }),
            Context::new(),
        );

        executor
            .execute_sequence(&definition.on_start, &ExecutionContext::new(), false)
            .await;

        // onStart may already have completed or failed the run
        if !self.run.is_running() {
            return Ok(());
        }

        match definition.initial_stage() {
            Some(stage) => {
                let stage_id = stage.id.clone();
                self.enter_stage(&stage_id).await
            }
            None => {
                warn!(scenario = %definition.id, "Scenario has no stages");
                Ok(())
            }
        }
    }

    /// Enter a stage, exiting the current one first
    pub async fn enter_stage(&self, stage_id: &str) -> ScenarioResult<()> {
        let definition = self.definition().ok_or(ScenarioError::NotLoaded)?;
        let stage = definition
            .stage(stage_id)
            .ok_or_else(|| ScenarioError::UnknownStage(stage_id.to_string()))?;
        let executor = self.executor().ok_or(ScenarioError::NotRunning)?;
        let engine = self.engine().ok_or(ScenarioError::NotRunning)?;

        if let Some(current_id) = self.run.current_stage() {
            if let Some(current) = definition.stage(&current_id) {
                debug!(stage = %current_id, "Exiting stage");
                executor
                    .execute_sequence(&current.on_exit, &ExecutionContext::new(), false)
                    .await;
            }
            engine.remove_stage_triggers(&current_id);
            self.cancel_hint_timer();
        }

        info!(stage = %stage.id, name = %stage.name, "Entering stage");
        self.run.enter_stage(&stage.id);

        for mut trigger in stage.triggers.iter().cloned() {
            trigger.stage_id = Some(stage.id.clone());
            engine.register_trigger(trigger);
        }

        executor
            .execute_sequence(&stage.on_enter, &ExecutionContext::new(), false)
            .await;

        // An onEnter action may have advanced again (or ended the run);
        // only announce and arm hints if this stage is still current
        if self.run.current_stage().as_deref() != Some(stage_id) || !self.run.is_running() {
            return Ok(());
        }

        self.event_bus.publish_named(
            events::STAGE_ENTERED,
            json!({"scenarioId": definition.id, "stageId": stage.id}),
            Context::new(),
        );

        self.arm_hint_timer(stage_id);
        Ok(())
    }

    /// Mark the current stage completed and enter the given stage
    pub async fn advance_to_stage(&self, stage_id: &str) -> ScenarioResult<()> {
        let definition = self.definition().ok_or(ScenarioError::NotLoaded)?;

        if let Some(current) = self.run.current_stage() {
            self.run.complete_stage(&current);
            self.event_bus.publish_named(
                events::STAGE_COMPLETED,
                json!({"scenarioId": definition.id, "stageId": current}),
                Context::new(),
            );
        }

        if definition.config.auto_save {
            self.save_variables(&definition).await;
        }

        self.enter_stage(stage_id).await
    }

    /// Complete the scenario
    pub async fn complete_scenario(&self) -> ScenarioResult<()> {
        let definition = self.definition().ok_or(ScenarioError::NotLoaded)?;
        if !self.run.is_running() {
            return Err(ScenarioError::NotRunning);
        }
        let executor = self.executor().ok_or(ScenarioError::NotRunning)?;

        if let Some(current) = self.run.current_stage() {
            self.run.complete_stage(&current);
            self.event_bus.publish_named(
                events::STAGE_COMPLETED,
                json!({"scenarioId": definition.id, "stageId": current}),
                Context::new(),
            );
        }

        let duration_ms = self.elapsed_ms();
        let hints_used = self.run.hints_shown();
        info!(scenario = %definition.id, duration_ms, "Scenario completed");

        executor
            .execute_sequence(&definition.on_complete, &ExecutionContext::new(), false)
            .await;

        self.event_bus.publish_named(
            events::SCENARIO_COMPLETED,
            json!({
                "scenarioId": definition.id,
                "durationMs": duration_ms,
                "hintsUsed": hints_used,
            }),
            Context::new(),
        );

        let base = format!("scenarios.{}", definition.id);
        let _ = self.state_store.set(&format!("{}.completed", base), json!(true));
        let _ = self
            .state_store
            .set(&format!("{}.finishedAt", base), json!(Utc::now().to_rfc3339()));
        let _ = self
            .state_store
            .set(&format!("{}.hintsUsed", base), json!(hints_used));
        if let Err(error) = self.state_store.persist().await {
            warn!(%error, "Failed to persist completion state");
        }

        self.teardown();
        *self.phase.lock().expect("phase lock poisoned") = ScenarioPhase::Completed;
        Ok(())
    }

    /// Fail the scenario
    pub async fn fail_scenario(&self, reason: Option<String>) -> ScenarioResult<()> {
        let definition = self.definition().ok_or(ScenarioError::NotLoaded)?;
        if !self.run.is_running() {
            return Err(ScenarioError::NotRunning);
        }
        let executor = self.executor().ok_or(ScenarioError::NotRunning)?;

        let duration_ms = self.elapsed_ms();
        info!(scenario = %definition.id, ?reason, "Scenario failed");

        executor
            .execute_sequence(&definition.on_fail, &ExecutionContext::new(), false)
            .await;

        self.event_bus.publish_named(
            events::SCENARIO_FAILED,
            json!({
                "scenarioId": definition.id,
                "reason": reason,
                "durationMs": duration_ms,
                "hintsUsed": self.run.hints_shown(),
            }),
            Context::new(),
        );

        let base = format!("scenarios.{}", definition.id);
        let _ = self.state_store.set(&format!("{}.failed", base), json!(true));
        let _ = self
            .state_store
            .set(&format!("{}.finishedAt", base), json!(Utc::now().to_rfc3339()));
        if let Err(error) = self.state_store.persist().await {
            warn!(%error, "Failed to persist failure state");
        }

        self.teardown();
        *self.phase.lock().expect("phase lock poisoned") = ScenarioPhase::Failed;
        Ok(())
    }

    /// Stop the run, optionally as an abort
    ///
    /// Aborting additionally runs the `onAbort` actions and emits the
    /// aborted notification. In-flight action sequences are not
    /// cancelled; only pending timers and the event interception are.
    pub async fn stop(&self, abort: bool) {
        if abort {
            if let (Some(definition), Some(executor)) = (self.definition(), self.executor()) {
                executor
                    .execute_sequence(&definition.on_abort, &ExecutionContext::new(), false)
                    .await;
                self.event_bus.publish_named(
                    events::SCENARIO_ABORTED,
                    json!({"scenarioId": definition.id}),
                    Context::new(),
                );
            }
        }

        self.teardown();
        let mut phase = self.phase.lock().expect("phase lock poisoned");
        *phase = if abort {
            ScenarioPhase::Aborted
        } else if self.definition().is_some() {
            ScenarioPhase::Loaded
        } else {
            ScenarioPhase::Unloaded
        };
    }

    /// Pause the run: the hint timer is suppressed, but trigger matching
    /// and firing stay active
    pub fn pause(&self) {
        if !self.run.is_running() || self.run.is_paused() {
            return;
        }
        self.run.set_paused(true);
        *self.phase.lock().expect("phase lock poisoned") = ScenarioPhase::Paused;

        debug!("Scenario paused");
        if let Some(definition) = self.definition() {
            self.event_bus.publish_named(
                events::SCENARIO_PAUSED,
                json!({"scenarioId": definition.id}),
                Context::new(),
            );
        }
    }

    /// Resume a paused run
    pub fn resume(&self) {
        if !self.run.is_paused() {
            return;
        }
        self.run.set_paused(false);
        *self.phase.lock().expect("phase lock poisoned") = ScenarioPhase::Running;

        debug!("Scenario resumed");
        if let Some(definition) = self.definition() {
            self.event_bus.publish_named(
                events::SCENARIO_RESUMED,
                json!({"scenarioId": definition.id}),
                Context::new(),
            );
        }
    }

    // --- Hints ---

    /// Show a hint immediately: the given message, or the current
    /// stage's next unshown hint
    pub async fn show_hint(&self, message: Option<String>) -> ScenarioResult<()> {
        if !self.run.is_running() {
            return Err(ScenarioError::NotRunning);
        }

        let message = match message {
            Some(message) => message,
            None => {
                let Some(message) = self.next_stage_hint() else {
                    debug!("No hint available for current stage");
                    return Ok(());
                };
                self.run.advance_stage_hint_cursor();
                message
            }
        };

        self.emit_hint(&message);
        Ok(())
    }

    fn next_stage_hint(&self) -> Option<String> {
        let definition = self.definition()?;
        let stage_id = self.run.current_stage()?;
        let stage = definition.stage(&stage_id)?;
        stage
            .hints
            .get(self.run.stage_hint_cursor())
            .map(|h| h.message.clone())
    }

    fn emit_hint(&self, message: &str) {
        self.run.record_hint_shown();
        self.desktop.shell.assistant_say(message, Some("hint"));
        self.event_bus.publish_named(
            events::HINT_SHOWN,
            json!({"message": message, "hintsUsed": self.run.hints_shown()}),
            Context::new(),
        );
    }

    /// Arm the timer for the current stage's next unshown hint
    ///
    /// At most one hint timer is live per stage. Once the run's hint cap
    /// is reached no further timers are armed. The callback re-verifies
    /// running/paused/stage at fire time.
    fn arm_hint_timer(&self, stage_id: &str) {
        self.cancel_hint_timer();

        let Some(definition) = self.definition() else {
            return;
        };
        if self.run.hints_shown() >= definition.config.max_hints {
            debug!("Hint cap reached, no more hint timers");
            return;
        }
        let Some(stage) = definition.stage(stage_id) else {
            return;
        };
        let Some(hint) = stage.hints.get(self.run.stage_hint_cursor()) else {
            return;
        };

        let delay = Duration::from_millis(hint.delay.unwrap_or(definition.config.hint_delay));
        let message = hint.message.clone();
        let stage_id = stage_id.to_string();
        let weak = self.weak_self.clone();

        debug!(stage = %stage_id, ?delay, "Hint timer armed");
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let Some(orchestrator) = weak.upgrade() else {
                return;
            };
            // Suppressed while paused or after the run ended; the stage
            // check covers transitions that raced this timer
            if !orchestrator.run.is_running() || orchestrator.run.is_paused() {
                return;
            }
            if orchestrator.run.current_stage().as_deref() != Some(stage_id.as_str()) {
                return;
            }

            orchestrator.run.advance_stage_hint_cursor();
            orchestrator.emit_hint(&message);
            orchestrator.arm_hint_timer(&stage_id);
        });

        *self.hint_timer.lock().expect("hint timer lock poisoned") = Some(handle);
    }

    fn cancel_hint_timer(&self) {
        if let Some(handle) = self
            .hint_timer
            .lock()
            .expect("hint timer lock poisoned")
            .take()
        {
            handle.abort();
        }
    }

    // --- Internals ---

    fn executor(&self) -> Option<Arc<ActionExecutor>> {
        self.executor.lock().expect("executor lock poisoned").clone()
    }

    fn elapsed_ms(&self) -> i64 {
        self.run
            .started_at()
            .map(|started| Utc::now().signed_duration_since(started).num_milliseconds())
            .unwrap_or(0)
    }

    async fn save_variables(&self, definition: &ScenarioDefinition) {
        let key = format!("scenarios.{}.variables", definition.id);
        let _ = self.state_store.set(&key, self.run.variables());
        if let Err(error) = self.state_store.persist().await {
            warn!(%error, "Failed to auto-save variables");
        }
    }

    /// Tear down the engine and reset run flags
    ///
    /// Pending debounce and hint timers are cancelled; an action
    /// sequence already in flight keeps running to completion.
    fn teardown(&self) {
        if let Some(engine) = self.engine.lock().expect("engine lock poisoned").take() {
            engine.stop();
        }
        *self.executor.lock().expect("executor lock poisoned") = None;
        self.cancel_hint_timer();

        self.run.set_running(false);
        self.run.set_paused(false);
        self.run.clear_stage();
    }
}

#[async_trait]
impl ScenarioFlow for ScenarioOrchestrator {
    async fn advance_to_stage(&self, stage_id: &str) -> Result<(), FlowError> {
        ScenarioOrchestrator::advance_to_stage(self, stage_id)
            .await
            .map_err(flow_error)
    }

    async fn complete_scenario(&self) -> Result<(), FlowError> {
        ScenarioOrchestrator::complete_scenario(self)
            .await
            .map_err(flow_error)
    }

    async fn fail_scenario(&self, reason: Option<String>) -> Result<(), FlowError> {
        ScenarioOrchestrator::fail_scenario(self, reason)
            .await
            .map_err(flow_error)
    }

    async fn show_hint(&self, message: Option<String>) -> Result<(), FlowError> {
        ScenarioOrchestrator::show_hint(self, message)
            .await
            .map_err(flow_error)
    }
}

fn flow_error(error: ScenarioError) -> FlowError {
    match error {
        ScenarioError::UnknownStage(stage) => FlowError::UnknownStage(stage),
        _ => FlowError::NotRunning,
    }
}
