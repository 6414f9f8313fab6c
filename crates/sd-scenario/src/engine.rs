//! Trigger engine
//!
//! Owns event interception, pattern matching, and trigger scheduling
//! (once/priority/debounce). The engine registers an interceptor on the
//! event bus so every publication is observed exactly once, then matches
//! each event against registered triggers, checks their conditions, and
//! runs their actions through the executor.
//!
//! Candidates matched by one inbound event are processed sequentially in
//! priority order; handling of *different* inbound events is spawned per
//! event and may interleave at suspension points (a known ordering
//! hazard for sequences that await a modal dialog).

use sd_core::events::{TriggerFiredData, NON_RETRIGGERING};
use sd_core::{Context, Event};
use sd_event_bus::{EventBus, InterceptorId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use ulid::Ulid;

use crate::eval::ConditionEvaluator;
use crate::executor::{ActionExecutor, ExecutionContext};
use crate::runtime::{ContextBuilder, EngineStats, EventRecord, SharedRunState};
use crate::scenario::TriggerDef;
use crate::trigger::{pattern_matches, validate, MatcherRegistry, WILDCARD};

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Started,
    Stopped,
}

/// A trigger as held by the engine
///
/// `seq` is the registration sequence number; ties on priority fire in
/// registration order.
struct RegisteredTrigger {
    def: TriggerDef,
    seq: u64,
}

impl RegisteredTrigger {
    fn debounce_ms(&self) -> u64 {
        self.def.debounce.max(0) as u64
    }
}

/// The trigger engine
pub struct TriggerEngine {
    event_bus: Arc<EventBus>,
    executor: Arc<ActionExecutor>,
    evaluator: Arc<ConditionEvaluator>,
    matchers: Arc<MatcherRegistry>,
    run: SharedRunState,
    stats: Arc<EngineStats>,
    contexts: ContextBuilder,

    /// Triggers indexed by exact event-name pattern
    exact: RwLock<HashMap<String, Vec<Arc<RegisteredTrigger>>>>,
    /// Triggers with glob or custom-matcher patterns
    patterned: RwLock<Vec<(String, Arc<RegisteredTrigger>)>>,
    /// Triggers on the match-all pattern
    global: RwLock<Vec<Arc<RegisteredTrigger>>>,

    /// Ids of `once` triggers already fired this run
    fired_once: Mutex<HashSet<String>>,
    /// Pending debounce timers by trigger id
    debounces: Mutex<HashMap<String, JoinHandle<()>>>,

    next_seq: AtomicU64,
    state: Mutex<EngineState>,
    interception: Mutex<Option<(InterceptorId, JoinHandle<()>)>>,
}

impl TriggerEngine {
    /// Create an engine over the given collaborators
    pub fn new(
        event_bus: Arc<EventBus>,
        executor: Arc<ActionExecutor>,
        evaluator: Arc<ConditionEvaluator>,
        matchers: Arc<MatcherRegistry>,
        run: SharedRunState,
        stats: Arc<EngineStats>,
    ) -> Arc<Self> {
        let contexts = ContextBuilder::new(run.clone(), stats.clone());
        Arc::new(Self {
            event_bus,
            executor,
            evaluator,
            matchers,
            run,
            stats,
            contexts,
            exact: RwLock::new(HashMap::new()),
            patterned: RwLock::new(Vec::new()),
            global: RwLock::new(Vec::new()),
            fired_once: Mutex::new(HashSet::new()),
            debounces: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            state: Mutex::new(EngineState::Idle),
            interception: Mutex::new(None),
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        *self.state.lock().expect("engine state lock poisoned")
    }

    /// Install the bus interceptor and begin processing events
    ///
    /// Starting again after `stop` begins from a clean slate; nothing
    /// from the previous run is retained.
    pub fn start(self: &Arc<Self>) {
        let mut state = self.state.lock().expect("engine state lock poisoned");
        if *state == EngineState::Started {
            warn!("Trigger engine already started");
            return;
        }
        *state = EngineState::Started;
        drop(state);

        let (id, mut rx) = self.event_bus.intercept();
        let engine = Arc::clone(self);
        let pump = tokio::spawn(async move {
            // One handler task per event: candidates for a single event run
            // sequentially inside it, while distinct events may interleave
            while let Some(event) = rx.recv().await {
                tokio::spawn(Arc::clone(&engine).handle_event(event));
            }
        });

        *self.interception.lock().expect("interception lock poisoned") = Some((id, pump));
        debug!("Trigger engine started");
    }

    /// Remove the interceptor, cancel pending timers, and clear all state
    pub fn stop(&self) {
        *self.state.lock().expect("engine state lock poisoned") = EngineState::Stopped;

        if let Some((id, pump)) = self
            .interception
            .lock()
            .expect("interception lock poisoned")
            .take()
        {
            self.event_bus.remove_interceptor(id);
            pump.abort();
        }

        let mut debounces = self.debounces.lock().expect("debounce lock poisoned");
        for (_, handle) in debounces.drain() {
            handle.abort();
        }
        drop(debounces);

        self.exact.write().expect("trigger lock poisoned").clear();
        self.patterned.write().expect("trigger lock poisoned").clear();
        self.global.write().expect("trigger lock poisoned").clear();
        self.fired_once
            .lock()
            .expect("fired-once lock poisoned")
            .clear();
        self.stats.clear();

        debug!("Trigger engine stopped");
    }

    /// Register a trigger definition
    ///
    /// Invalid definitions are registered anyway with logged warnings;
    /// a missing id is generated. Pattern lists stay sorted by
    /// descending priority.
    pub fn register_trigger(&self, mut def: TriggerDef) {
        for problem in validate(&def) {
            warn!(trigger = %def.id, %problem, "Trigger definition problem (registered anyway)");
        }
        if def.id.is_empty() {
            def.id = Ulid::new().to_string();
        }

        trace!(trigger = %def.id, events = ?def.events, "Registering trigger");
        let registered = Arc::new(RegisteredTrigger {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            def,
        });

        for pattern in registered.def.events.clone() {
            if pattern == WILDCARD {
                let mut global = self.global.write().expect("trigger lock poisoned");
                insert_by_priority(&mut global, Arc::clone(&registered));
            } else if pattern.contains('*') || self.matchers.handles(&pattern) {
                let mut patterned = self.patterned.write().expect("trigger lock poisoned");
                let at = patterned
                    .partition_point(|(_, t)| t.def.priority >= registered.def.priority);
                patterned.insert(at, (pattern, Arc::clone(&registered)));
            } else {
                let mut exact = self.exact.write().expect("trigger lock poisoned");
                insert_by_priority(
                    exact.entry(pattern).or_default(),
                    Arc::clone(&registered),
                );
            }
        }
    }

    /// Remove a trigger by id, cancelling any pending debounce
    pub fn unregister_trigger(&self, id: &str) {
        self.remove_where(|def| def.id == id);
    }

    /// Remove all triggers scoped to a stage (on stage exit)
    pub fn remove_stage_triggers(&self, stage_id: &str) {
        debug!(stage_id, "Removing stage-scoped triggers");
        self.remove_where(|def| def.stage_id.as_deref() == Some(stage_id));
    }

    fn remove_where(&self, predicate: impl Fn(&TriggerDef) -> bool) {
        let mut removed: Vec<String> = Vec::new();

        let mut exact = self.exact.write().expect("trigger lock poisoned");
        for list in exact.values_mut() {
            list.retain(|t| {
                let gone = predicate(&t.def);
                if gone {
                    removed.push(t.def.id.clone());
                }
                !gone
            });
        }
        exact.retain(|_, list| !list.is_empty());
        drop(exact);

        self.patterned
            .write()
            .expect("trigger lock poisoned")
            .retain(|(_, t)| {
                let gone = predicate(&t.def);
                if gone {
                    removed.push(t.def.id.clone());
                }
                !gone
            });
        self.global
            .write()
            .expect("trigger lock poisoned")
            .retain(|t| {
                let gone = predicate(&t.def);
                if gone {
                    removed.push(t.def.id.clone());
                }
                !gone
            });

        // A discarded trigger must not fire from a pending debounce
        let mut debounces = self.debounces.lock().expect("debounce lock poisoned");
        for id in removed {
            if let Some(handle) = debounces.remove(&id) {
                handle.abort();
            }
        }
    }

    /// Number of registered triggers (for diagnostics and tests)
    pub fn trigger_count(&self) -> usize {
        let mut ids = HashSet::new();
        for list in self.exact.read().expect("trigger lock poisoned").values() {
            ids.extend(list.iter().map(|t| t.def.id.clone()));
        }
        ids.extend(
            self.patterned
                .read()
                .expect("trigger lock poisoned")
                .iter()
                .map(|(_, t)| t.def.id.clone()),
        );
        ids.extend(
            self.global
                .read()
                .expect("trigger lock poisoned")
                .iter()
                .map(|t| t.def.id.clone()),
        );
        ids.len()
    }

    // --- Event handling ---

    async fn handle_event(self: Arc<Self>, event: Event<serde_json::Value>) {
        if self.state() != EngineState::Started {
            return;
        }
        let name = event.name.as_str().to_string();

        let record = EventRecord {
            name: name.clone(),
            data: event.data,
            time: event.published_at,
        };
        self.stats.record(record.clone());
        debug!(event = %name, "Engine observed event");

        // The engine's own notifications are observed (history, counts)
        // but never re-enter matching
        if NON_RETRIGGERING.contains(&name.as_str()) {
            return;
        }

        let candidates = self.collect_candidates(&name);
        if candidates.is_empty() {
            return;
        }

        let current_stage = self.run.current_stage();
        let mut eligible: Vec<Arc<RegisteredTrigger>> = candidates
            .into_iter()
            .filter(|t| t.def.enabled)
            .filter(|t| {
                t.def.stage_id.is_none() || t.def.stage_id.as_deref() == current_stage.as_deref()
            })
            .collect();
        eligible.sort_by(|a, b| {
            b.def
                .priority
                .cmp(&a.def.priority)
                .then(a.seq.cmp(&b.seq))
        });

        for trigger in eligible {
            let id = trigger.def.id.clone();

            if trigger.def.once
                && self
                    .fired_once
                    .lock()
                    .expect("fired-once lock poisoned")
                    .contains(&id)
            {
                trace!(trigger = %id, "Skipping consumed once-trigger");
                continue;
            }

            if let Some(condition) = &trigger.def.conditions {
                let ctx = self.contexts.build(Some(record.clone()), Some(id.clone()));
                let passed = self.evaluator.check(condition, &ctx);
                debug!(trigger = %id, event = %name, passed, "Trigger condition evaluated");
                if !passed {
                    continue;
                }
            }

            if trigger.debounce_ms() > 0 {
                self.schedule_debounce(Arc::clone(&trigger), record.clone());
            } else {
                self.fire_trigger(&trigger, record.clone()).await;
            }
        }
    }

    fn collect_candidates(&self, name: &str) -> Vec<Arc<RegisteredTrigger>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates = Vec::new();

        let exact = self.exact.read().expect("trigger lock poisoned");
        for prefix in segment_prefixes(name) {
            if let Some(list) = exact.get(prefix) {
                for trigger in list {
                    if seen.insert(trigger.def.id.clone()) {
                        candidates.push(Arc::clone(trigger));
                    }
                }
            }
        }
        drop(exact);

        for (pattern, trigger) in self.patterned.read().expect("trigger lock poisoned").iter() {
            if pattern_matches(pattern, name, &self.matchers)
                && seen.insert(trigger.def.id.clone())
            {
                candidates.push(Arc::clone(trigger));
            }
        }

        for trigger in self.global.read().expect("trigger lock poisoned").iter() {
            if seen.insert(trigger.def.id.clone()) {
                candidates.push(Arc::clone(trigger));
            }
        }

        candidates
    }

    /// (Re)schedule a debounced firing, replacing any pending timer
    ///
    /// Rapid qualifying events collapse into one firing that happens a
    /// quiet period after the last of them, carrying that last event.
    fn schedule_debounce(self: &Arc<Self>, trigger: Arc<RegisteredTrigger>, record: EventRecord) {
        let id = trigger.def.id.clone();
        let delay = Duration::from_millis(trigger.debounce_ms());

        let mut debounces = self.debounces.lock().expect("debounce lock poisoned");
        if let Some(previous) = debounces.remove(&id) {
            trace!(trigger = %id, "Debounce timer replaced");
            previous.abort();
        }

        let engine = Arc::clone(self);
        let timer_id = id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine
                .debounces
                .lock()
                .expect("debounce lock poisoned")
                .remove(&timer_id);
            engine.fire_trigger(&trigger, record).await;
        });
        debounces.insert(id, handle);
    }

    async fn fire_trigger(&self, trigger: &RegisteredTrigger, record: EventRecord) {
        let id = &trigger.def.id;

        if trigger.def.once {
            // Claim the once-slot atomically; a debounced firing racing a
            // direct one must not run the actions twice
            if !self
                .fired_once
                .lock()
                .expect("fired-once lock poisoned")
                .insert(id.clone())
            {
                return;
            }
        }

        debug!(trigger = %id, event = %record.name, "Trigger fired");
        self.event_bus.publish_typed(
            TriggerFiredData {
                trigger_id: id.clone(),
                event: record.name.clone(),
            },
            Context::new(),
        );

        let scope = ExecutionContext::with_event(record).with_trigger(id.clone());
        self.executor
            .execute_sequence(&trigger.def.actions, &scope, false)
            .await;
    }
}

/// Insert keeping the list sorted by descending priority; equal
/// priorities keep registration order
fn insert_by_priority(list: &mut Vec<Arc<RegisteredTrigger>>, trigger: Arc<RegisteredTrigger>) {
    let at = list.partition_point(|t| t.def.priority >= trigger.def.priority);
    list.insert(at, trigger);
}

/// The event name and every segment prefix of it (`a:b:c` -> `a:b:c`,
/// `a:b`, `a`), for the exact-index lookup with the prefix rule
fn segment_prefixes(name: &str) -> impl Iterator<Item = &str> {
    std::iter::once(name).chain(
        name.char_indices()
            .rev()
            .filter(|(_, c)| *c == ':')
            .map(move |(i, _)| &name[..i]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::ConditionRegistry;
    use crate::executor::{ActionRegistry, FlowError, ScenarioFlow};
    use async_trait::async_trait;
    use sd_desktop::Desktop;
    use serde_json::{json, Map, Value};

    struct NoFlow;

    #[async_trait]
    impl ScenarioFlow for NoFlow {
        async fn advance_to_stage(&self, _stage_id: &str) -> Result<(), FlowError> {
            Err(FlowError::NotRunning)
        }
        async fn complete_scenario(&self) -> Result<(), FlowError> {
            Err(FlowError::NotRunning)
        }
        async fn fail_scenario(&self, _reason: Option<String>) -> Result<(), FlowError> {
            Err(FlowError::NotRunning)
        }
        async fn show_hint(&self, _message: Option<String>) -> Result<(), FlowError> {
            Err(FlowError::NotRunning)
        }
    }

    struct Fixture {
        engine: Arc<TriggerEngine>,
        bus: Arc<EventBus>,
        run: SharedRunState,
        _flow: Arc<dyn ScenarioFlow>,
    }

    fn make_engine() -> Fixture {
        let bus = Arc::new(EventBus::new());
        let desktop = Arc::new(Desktop::new(bus.clone()));
        let run = SharedRunState::new();
        run.reset(Map::new());
        let stats = Arc::new(EngineStats::new());

        let evaluator = Arc::new(ConditionEvaluator::new(
            desktop.vfs.clone(),
            desktop.windows.clone(),
            desktop.achievements.clone(),
            desktop.features.clone(),
            Arc::new(ConditionRegistry::new()),
        ));
        let flow: Arc<dyn ScenarioFlow> = Arc::new(NoFlow);
        let executor = Arc::new(ActionExecutor::new(
            &desktop,
            bus.clone(),
            run.clone(),
            ContextBuilder::new(run.clone(), stats.clone()),
            evaluator.clone(),
            Arc::downgrade(&flow),
            Arc::new(ActionRegistry::new()),
        ));

        let engine = TriggerEngine::new(
            bus.clone(),
            executor,
            evaluator,
            Arc::new(MatcherRegistry::with_defaults()),
            run.clone(),
            stats,
        );

        Fixture {
            engine,
            bus,
            run,
            _flow: flow,
        }
    }

    fn trigger(json: Value) -> TriggerDef {
        serde_json::from_value(json).unwrap()
    }

    fn fire(bus: &EventBus, name: &str, data: Value) {
        bus.publish_named(name, data, Context::new());
    }

    /// Let spawned handler tasks run to completion under paused time
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_once_trigger_fires_exactly_once() {
        let fx = make_engine();
        fx.engine.register_trigger(trigger(json!({
            "id": "once-t",
            "event": "app:launched",
            "once": true,
            "actions": [{"type": "modifyState", "path": "fires", "operation": "increment"}]
        })));
        fx.engine.start();

        fire(&fx.bus, "app:launched", json!({}));
        fire(&fx.bus, "app:launched", json!({}));
        settle().await;

        assert_eq!(fx.run.get_variable("fires"), Some(json!(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_ordering() {
        let fx = make_engine();
        fx.engine.register_trigger(trigger(json!({
            "id": "low",
            "event": "tick",
            "priority": 0,
            "actions": [{"type": "modifyState", "path": "order", "operation": "append", "value": "low"}]
        })));
        fx.engine.register_trigger(trigger(json!({
            "id": "high",
            "event": "tick",
            "priority": 10,
            "actions": [{"type": "modifyState", "path": "order", "operation": "append", "value": "high"}]
        })));
        fx.engine.start();

        fire(&fx.bus, "tick", json!({}));
        settle().await;

        assert_eq!(fx.run.get_variable("order"), Some(json!(["high", "low"])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_scoped_trigger_ignored_in_other_stage() {
        let fx = make_engine();
        fx.engine.register_trigger(trigger(json!({
            "id": "scoped",
            "event": "tick",
            "stageId": "A",
            "actions": [{"type": "modifyState", "path": "fires", "operation": "increment"}]
        })));
        fx.engine.start();

        fx.run.enter_stage("B");
        fire(&fx.bus, "tick", json!({}));
        settle().await;
        assert_eq!(fx.run.get_variable("fires"), None);

        fx.run.enter_stage("A");
        fire(&fx.bus, "tick", json!({}));
        settle().await;
        assert_eq!(fx.run.get_variable("fires"), Some(json!(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_condition_gates_firing() {
        let fx = make_engine();
        fx.engine.register_trigger(trigger(json!({
            "id": "gated",
            "event": "calculator:result",
            "conditions": {"type": "eventMatch", "field": "result", "value": 42},
            "actions": [{"type": "modifyState", "path": "fires", "operation": "increment"}]
        })));
        fx.engine.start();

        fire(&fx.bus, "calculator:result", json!({"result": 41}));
        settle().await;
        assert_eq!(fx.run.get_variable("fires"), None);

        fire(&fx.bus, "calculator:result", json!({"result": 42}));
        settle().await;
        assert_eq!(fx.run.get_variable("fires"), Some(json!(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_collapses_rapid_events() {
        let fx = make_engine();
        fx.engine.register_trigger(trigger(json!({
            "id": "debounced",
            "event": "typed",
            "debounce": 300,
            "actions": [{"type": "modifyState", "path": "fires", "operation": "increment"}]
        })));
        fx.engine.start();

        for _ in 0..5 {
            fire(&fx.bus, "typed", json!({}));
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        // Still inside the quiet period
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fx.run.get_variable("fires"), None);

        // Quiet period elapses after the last event
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fx.run.get_variable("fires"), Some(json!(1)));
    }

    /// Drain trigger-fired notifications, counting them per trigger id
    fn drain_fired(
        rx: &mut tokio::sync::broadcast::Receiver<Event<Value>>,
    ) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        while let Ok(event) = rx.try_recv() {
            let id = event.data["triggerId"].as_str().unwrap_or("").to_string();
            *counts.entry(id).or_insert(0) += 1;
        }
        counts
    }

    #[tokio::test(start_paused = true)]
    async fn test_wildcard_prefix_and_global_matching() {
        let fx = make_engine();
        let mut fired = fx.bus.subscribe(sd_core::events::TRIGGER_FIRED);

        // Wait-only actions keep wildcard triggers from chasing the
        // variable-changed events their own actions would emit
        fx.engine.register_trigger(trigger(json!({
            "id": "glob",
            "event": "app:*",
            "actions": [{"type": "wait", "millis": 0}]
        })));
        fx.engine.register_trigger(trigger(json!({
            "id": "prefix",
            "event": "app",
            "actions": [{"type": "wait", "millis": 0}]
        })));
        fx.engine.register_trigger(trigger(json!({
            "id": "all",
            "event": "*",
            "actions": [{"type": "wait", "millis": 0}]
        })));
        fx.engine.start();

        fire(&fx.bus, "app:launched", json!({}));
        fire(&fx.bus, "fs:written", json!({}));
        settle().await;

        let counts = drain_fired(&mut fired);
        assert_eq!(counts.get("glob"), Some(&1));
        assert_eq!(counts.get("prefix"), Some(&1));
        assert_eq!(counts.get("all"), Some(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_notifications_excluded_from_matching() {
        let fx = make_engine();
        fx.engine.register_trigger(trigger(json!({
            "id": "worker",
            "event": "tick",
            "actions": [{"type": "modifyState", "path": "fires", "operation": "increment"}]
        })));
        // Listeners on the engine's own notifications must never fire
        fx.engine.register_trigger(trigger(json!({
            "id": "sniff-completed",
            "event": "scenario:action-completed",
            "actions": [{"type": "modifyState", "path": "leaked", "operation": "increment"}]
        })));
        fx.engine.register_trigger(trigger(json!({
            "id": "sniff-fired",
            "event": "scenario:trigger-fired",
            "actions": [{"type": "modifyState", "path": "leaked", "operation": "increment"}]
        })));
        fx.engine.start();

        fire(&fx.bus, "tick", json!({}));
        settle().await;

        assert_eq!(fx.run.get_variable("fires"), Some(json!(1)));
        assert_eq!(fx.run.get_variable("leaked"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_trigger_never_fires() {
        let fx = make_engine();
        fx.engine.register_trigger(trigger(json!({
            "id": "off",
            "event": "tick",
            "enabled": false,
            "actions": [{"type": "modifyState", "path": "fires", "operation": "increment"}]
        })));
        fx.engine.start();

        fire(&fx.bus, "tick", json!({}));
        settle().await;

        assert_eq!(fx.run.get_variable("fires"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_bounded_at_capacity() {
        let fx = make_engine();
        fx.engine.start();

        for i in 0..150 {
            fire(&fx.bus, &format!("evt:{}", i), json!({}));
        }
        settle().await;

        let history = fx.engine.stats.history();
        assert_eq!(history.len(), 100);
        assert_eq!(history.first().unwrap().name, "evt:50");
        assert_eq!(history.last().unwrap().name, "evt:149");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_clears_state_and_stops_observing() {
        let fx = make_engine();
        fx.engine.register_trigger(trigger(json!({
            "id": "t",
            "event": "tick",
            "actions": [{"type": "modifyState", "path": "fires", "operation": "increment"}]
        })));
        fx.engine.start();

        fire(&fx.bus, "tick", json!({}));
        settle().await;
        assert_eq!(fx.run.get_variable("fires"), Some(json!(1)));

        fx.engine.stop();
        assert_eq!(fx.engine.state(), EngineState::Stopped);
        assert_eq!(fx.engine.trigger_count(), 0);
        assert_eq!(fx.engine.stats.history_len(), 0);

        fire(&fx.bus, "tick", json!({}));
        settle().await;
        assert_eq!(fx.run.get_variable("fires"), Some(json!(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_debounce() {
        let fx = make_engine();
        fx.engine.register_trigger(trigger(json!({
            "id": "debounced",
            "event": "typed",
            "debounce": 300,
            "actions": [{"type": "modifyState", "path": "fires", "operation": "increment"}]
        })));
        fx.engine.start();

        fire(&fx.bus, "typed", json!({}));
        tokio::time::sleep(Duration::from_millis(100)).await;
        fx.engine.stop();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fx.run.get_variable("fires"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_trigger_still_registered() {
        let fx = make_engine();
        // No event patterns, negative debounce: warned about, kept anyway
        fx.engine.register_trigger(trigger(json!({"id": "odd", "debounce": -10})));
        assert_eq!(fx.engine.trigger_count(), 0); // no patterns, nothing indexed

        fx.engine.register_trigger(trigger(json!({
            "id": "odd2",
            "event": "tick",
            "debounce": -10,
            "actions": [{"type": "modifyState", "path": "fires", "operation": "increment"}]
        })));
        assert_eq!(fx.engine.trigger_count(), 1);
        fx.engine.start();

        // Negative debounce clamps to immediate firing
        fire(&fx.bus, "tick", json!({}));
        settle().await;
        assert_eq!(fx.run.get_variable("fires"), Some(json!(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_multi_pattern_trigger_fires_once_per_event() {
        let fx = make_engine();
        fx.engine.register_trigger(trigger(json!({
            "id": "multi",
            "events": ["app:launched", "app:*"],
            "actions": [{"type": "modifyState", "path": "fires", "operation": "increment"}]
        })));
        fx.engine.start();

        fire(&fx.bus, "app:launched", json!({}));
        settle().await;

        // Both patterns match, but the trigger is one candidate
        assert_eq!(fx.run.get_variable("fires"), Some(json!(1)));
    }
}
