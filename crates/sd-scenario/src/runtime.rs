//! Run-time state shared across the engine
//!
//! Two pieces of mutable state live here: the scenario RunState
//! (variables, current stage, flags) owned by the orchestrator, and the
//! EngineStats (event history, occurrence counters) owned by the trigger
//! engine. Both are read by condition evaluation and mutated by action
//! handlers; lock scopes are short and never held across awaits.

use chrono::{DateTime, Utc};
use sd_core::path;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

/// One observed event, as kept in the history ring buffer
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EventRecord {
    pub name: String,
    pub data: Value,
    pub time: DateTime<Utc>,
}

/// Scenario run state
#[derive(Debug, Default)]
pub struct RunState {
    /// Scenario-local variables as one JSON object
    variables: Value,
    /// Current stage id
    current_stage: Option<String>,
    /// Stages marked completed this run
    completed_stages: HashSet<String>,
    /// Named reference timestamps (`scenario`, `stage`)
    marks: HashMap<String, DateTime<Utc>>,
    /// Hints shown this run
    hints_shown: u32,
    /// Hints shown for the current stage (resets on stage entry)
    stage_hints_shown: usize,
    running: bool,
    paused: bool,
}

/// Shared, cloneable handle to the run state
#[derive(Clone, Default)]
pub struct SharedRunState {
    inner: Arc<RwLock<RunState>>,
}

impl SharedRunState {
    /// Create a fresh run state
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset everything and install the given initial variables
    pub fn reset(&self, variables: Map<String, Value>) {
        let mut state = self.write();
        *state = RunState {
            variables: Value::Object(variables),
            ..RunState::default()
        };
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RunState> {
        self.inner.read().expect("run state lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RunState> {
        self.inner.write().expect("run state lock poisoned")
    }

    // --- Variables ---

    /// Snapshot of the variable object
    pub fn variables(&self) -> Value {
        self.read().variables.clone()
    }

    /// Get a variable by dot path
    pub fn get_variable(&self, var_path: &str) -> Option<Value> {
        path::resolve(&self.read().variables, var_path).cloned()
    }

    /// Set a variable by dot path, returning the previous value
    ///
    /// Returns Err when the path is malformed or an array index is out
    /// of range.
    pub fn set_variable(&self, var_path: &str, value: Value) -> Result<Option<Value>, String> {
        let mut state = self.write();
        let old = path::resolve(&state.variables, var_path).cloned();
        if !path::set(&mut state.variables, var_path, value) {
            return Err(format!("invalid variable path: {}", var_path));
        }
        Ok(old)
    }

    /// Remove a variable by dot path, returning the removed value
    pub fn remove_variable(&self, var_path: &str) -> Option<Value> {
        path::remove(&mut self.write().variables, var_path)
    }

    // --- Stage & flags ---

    /// Current stage id
    pub fn current_stage(&self) -> Option<String> {
        self.read().current_stage.clone()
    }

    /// Enter a stage: set it current, stamp the `stage` mark, reset the
    /// per-stage hint cursor
    pub fn enter_stage(&self, stage_id: &str) {
        let mut state = self.write();
        state.current_stage = Some(stage_id.to_string());
        state.marks.insert("stage".to_string(), Utc::now());
        state.stage_hints_shown = 0;
    }

    /// Clear the current stage pointer
    pub fn clear_stage(&self) {
        self.write().current_stage = None;
    }

    /// Mark a stage completed
    pub fn complete_stage(&self, stage_id: &str) {
        self.write().completed_stages.insert(stage_id.to_string());
    }

    /// Stages completed so far
    pub fn completed_stages(&self) -> HashSet<String> {
        self.read().completed_stages.clone()
    }

    /// Mark the run started: stamp the `scenario` mark and set running
    pub fn mark_started(&self) {
        let mut state = self.write();
        state.running = true;
        state.paused = false;
        state.marks.insert("scenario".to_string(), Utc::now());
    }

    /// Stamp an arbitrary named reference timestamp
    pub fn mark(&self, name: &str) {
        self.write().marks.insert(name.to_string(), Utc::now());
    }

    /// Named reference timestamps
    pub fn marks(&self) -> HashMap<String, DateTime<Utc>> {
        self.read().marks.clone()
    }

    /// When the run started
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.read().marks.get("scenario").copied()
    }

    pub fn is_running(&self) -> bool {
        self.read().running
    }

    pub fn is_paused(&self) -> bool {
        self.read().paused
    }

    pub fn set_running(&self, running: bool) {
        self.write().running = running;
    }

    pub fn set_paused(&self, paused: bool) {
        self.write().paused = paused;
    }

    // --- Hints ---

    /// Total hints shown this run
    pub fn hints_shown(&self) -> u32 {
        self.read().hints_shown
    }

    /// Index of the next not-yet-shown hint of the current stage
    pub fn stage_hint_cursor(&self) -> usize {
        self.read().stage_hints_shown
    }

    /// Record one shown hint in the run total
    pub fn record_hint_shown(&self) {
        self.write().hints_shown += 1;
    }

    /// Advance past one hint of the current stage's list
    pub fn advance_stage_hint_cursor(&self) {
        self.write().stage_hints_shown += 1;
    }
}

/// Engine runtime state: the bounded event history and per-name counters
///
/// Reset fully between runs; `clear` is called on engine stop.
pub struct EngineStats {
    history: Mutex<VecDeque<EventRecord>>,
    counts: Mutex<HashMap<String, u64>>,
    capacity: usize,
}

/// Default history ring capacity
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

impl EngineStats {
    /// Create with the default history capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create with a specific history capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            counts: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Record an observed event: append to history (evicting the oldest
    /// past capacity) and bump its occurrence counter
    pub fn record(&self, record: EventRecord) {
        let mut history = self.history.lock().expect("history lock poisoned");
        if history.len() == self.capacity {
            history.pop_front();
        }
        let name = record.name.clone();
        history.push_back(record);
        drop(history);

        *self
            .counts
            .lock()
            .expect("counts lock poisoned")
            .entry(name)
            .or_insert(0) += 1;
    }

    /// Snapshot of the history in arrival order
    pub fn history(&self) -> Vec<EventRecord> {
        self.history
            .lock()
            .expect("history lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Number of events currently in the history ring
    pub fn history_len(&self) -> usize {
        self.history.lock().expect("history lock poisoned").len()
    }

    /// How many times the named event has been observed
    pub fn count(&self, event: &str) -> u64 {
        self.counts
            .lock()
            .expect("counts lock poisoned")
            .get(event)
            .copied()
            .unwrap_or(0)
    }

    /// Snapshot of all counters
    pub fn counts(&self) -> HashMap<String, u64> {
        self.counts.lock().expect("counts lock poisoned").clone()
    }

    /// Drop all history and counters
    pub fn clear(&self) {
        self.history.lock().expect("history lock poisoned").clear();
        self.counts.lock().expect("counts lock poisoned").clear();
    }
}

impl Default for EngineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Context for condition evaluation
///
/// A point-in-time bundle of everything a condition may inspect: the
/// triggering event, a snapshot of scenario variables, the event
/// history, occurrence counts, and named reference timestamps. The time
/// and random overrides exist for deterministic tests.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    /// The event being processed (if any)
    pub event: Option<EventRecord>,

    /// Id of the trigger under evaluation (if any)
    pub trigger_id: Option<String>,

    /// Snapshot of the scenario variable object
    pub variables: Value,

    /// Snapshot of the event history in arrival order
    pub history: Vec<EventRecord>,

    /// Snapshot of per-event-name occurrence counts
    pub counts: HashMap<String, u64>,

    /// Named reference timestamps (`scenario`, `stage`)
    pub marks: HashMap<String, DateTime<Utc>>,

    /// Override for current time (for testing)
    pub time_override: Option<DateTime<chrono::Local>>,

    /// Override for the uniform random draw (for testing)
    pub random_override: Option<f64>,
}

impl EvalContext {
    /// Create a new empty evaluation context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context around a triggering event
    pub fn with_event(event: EventRecord) -> Self {
        Self {
            event: Some(event),
            ..Self::default()
        }
    }

    /// Set the trigger under evaluation
    pub fn with_trigger(mut self, trigger_id: impl Into<String>) -> Self {
        self.trigger_id = Some(trigger_id.into());
        self
    }

    /// Add a variable to the context
    pub fn with_var(mut self, key: impl Into<String>, value: Value) -> Self {
        if !self.variables.is_object() {
            self.variables = Value::Object(Map::new());
        }
        if let Some(map) = self.variables.as_object_mut() {
            map.insert(key.into(), value);
        }
        self
    }

    /// Set time override for testing
    pub fn with_time(mut self, time: DateTime<chrono::Local>) -> Self {
        self.time_override = Some(time);
        self
    }

    /// Set the random draw override for testing
    pub fn with_random(mut self, draw: f64) -> Self {
        self.random_override = Some(draw);
        self
    }

    /// Get current time (or override if set)
    pub fn now(&self) -> DateTime<chrono::Local> {
        self.time_override.unwrap_or_else(chrono::Local::now)
    }
}

/// Builds evaluation contexts from the live run state and engine stats
///
/// The engine uses it per trigger-condition check; the action executor
/// uses it for `conditional` branches so mid-sequence mutations are
/// visible.
#[derive(Clone)]
pub struct ContextBuilder {
    run: SharedRunState,
    stats: Arc<EngineStats>,
}

impl ContextBuilder {
    /// Create a builder over the given run state and stats
    pub fn new(run: SharedRunState, stats: Arc<EngineStats>) -> Self {
        Self { run, stats }
    }

    /// Snapshot a fresh evaluation context
    pub fn build(&self, event: Option<EventRecord>, trigger_id: Option<String>) -> EvalContext {
        EvalContext {
            event,
            trigger_id,
            variables: self.run.variables(),
            history: self.stats.history(),
            counts: self.stats.counts(),
            marks: self.run.marks(),
            time_override: None,
            random_override: None,
        }
    }
}
