//! Scenario Engine
//!
//! This crate provides the declarative scenario system for SimDesk.
//! Scenarios are event-driven, staged experiences: semantic events
//! published anywhere on the desktop are matched against authored
//! triggers, conditions gate, actions execute, and an orchestrator
//! advances the run through its stages.
//!
//! # Architecture
//!
//! ```text
//! EVENT -> TRIGGER ENGINE -> CONDITIONS -> ACTIONS -> side effects
//!                 ^                                        |
//!                 +------- new semantic events <-----------+
//! ```
//!
//! - **Triggers**: event-pattern rules with once/priority/debounce
//!   scheduling ([`TriggerEngine`])
//! - **Conditions**: boolean predicate trees, fail-closed
//!   ([`ConditionEvaluator`])
//! - **Actions**: declarative commands over the desktop collaborators
//!   ([`ActionExecutor`])
//! - **Orchestrator**: the stage state machine owning one run
//!   ([`ScenarioOrchestrator`])
//!
//! Custom condition, action, and pattern-matcher types are injected via
//! [`Extensions`] rather than global registries, so tests and embedders
//! get isolated instances.

pub mod action;
pub mod condition;
pub mod engine;
pub mod eval;
pub mod executor;
pub mod loader;
pub mod orchestrator;
pub mod runtime;
pub mod scenario;
pub mod trigger;

pub use action::{Action, ActionError, CustomAction, StateOp};
pub use condition::{
    CompareOp, Condition, ConditionError, ConditionResult, CustomCondition, MatchOp, ValueSource,
};
pub use engine::{EngineState, TriggerEngine};
pub use eval::{ConditionEvaluator, ConditionRegistry};
pub use executor::{
    ActionExecutor, ActionOutcome, ActionRegistry, EvaluateCondition, ExecutionContext, FlowError,
    ScenarioFlow,
};
pub use loader::{LoadError, LoadFailure};
pub use orchestrator::{ScenarioError, ScenarioOrchestrator, ScenarioPhase, ScenarioResult};
pub use runtime::{ContextBuilder, EngineStats, EvalContext, EventRecord, SharedRunState};
pub use scenario::{Hint, ScenarioConfig, ScenarioDefinition, Stage, TriggerDef};
pub use trigger::MatcherRegistry;

use std::sync::Arc;

/// Extension registries injected into the engine
///
/// Bundles the custom condition, action, and matcher registrations for
/// one engine instance. The default carries the built-in `regex`
/// matcher and nothing else.
#[derive(Clone)]
pub struct Extensions {
    pub conditions: Arc<ConditionRegistry>,
    pub actions: Arc<ActionRegistry>,
    pub matchers: Arc<MatcherRegistry>,
}

impl Default for Extensions {
    fn default() -> Self {
        Self {
            conditions: Arc::new(ConditionRegistry::new()),
            actions: Arc::new(ActionRegistry::new()),
            matchers: Arc::new(MatcherRegistry::with_defaults()),
        }
    }
}
