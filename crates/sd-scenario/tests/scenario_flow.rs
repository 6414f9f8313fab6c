//! End-to-end scenario engine tests
//!
//! Drives full runs through the orchestrator over real collaborators:
//! events published on the bus, triggers matching, conditions gating,
//! actions mutating the run, stages advancing.

use sd_core::{events, Context};
use sd_desktop::Desktop;
use sd_event_bus::EventBus;
use sd_scenario::{Extensions, ScenarioOrchestrator, ScenarioPhase};
use sd_state_store::StateStore;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    bus: Arc<EventBus>,
    desktop: Arc<Desktop>,
    store: Arc<StateStore>,
    orchestrator: Arc<ScenarioOrchestrator>,
    _dir: TempDir,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let bus = Arc::new(EventBus::new());
    let desktop = Arc::new(Desktop::new(bus.clone()));
    let store = Arc::new(StateStore::new(dir.path(), bus.clone()));
    let orchestrator = ScenarioOrchestrator::new(
        bus.clone(),
        store.clone(),
        desktop.clone(),
        Extensions::default(),
    );

    Harness {
        bus,
        desktop,
        store,
        orchestrator,
        _dir: dir,
    }
}

fn fire(bus: &EventBus, name: &str, data: Value) {
    bus.publish_named(name, data, Context::new());
}

/// Let spawned trigger-handler tasks run to completion under paused time
async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

fn calculator_scenario() -> Value {
    json!({
        "id": "calc-tutorial",
        "name": "Calculator Tutorial",
        "variables": {"completions": 0},
        "stages": [
            {
                "id": "intro",
                "name": "Open the calculator",
                "onExit": [
                    {"type": "modifyState", "path": "trace", "operation": "append", "value": "exit:intro"}
                ],
                "triggers": [{
                    "id": "t-launch",
                    "event": "app:launched",
                    "conditions": {"type": "eventMatch", "field": "appId", "value": "calculator"},
                    "actions": [{"type": "advanceStage", "stage": "solve"}]
                }]
            },
            {
                "id": "solve",
                "name": "Compute 42",
                "onEnter": [
                    {"type": "modifyState", "path": "trace", "operation": "append", "value": "enter:solve"}
                ],
                "triggers": [{
                    "id": "t-result",
                    "event": "calculator:result",
                    "conditions": {"type": "eventMatch", "field": "result", "value": 42},
                    "actions": [{"type": "completeScenario"}]
                }]
            }
        ],
        "onComplete": [
            {"type": "modifyState", "path": "completions", "operation": "increment"}
        ]
    })
}

#[tokio::test(start_paused = true)]
async fn calculator_walkthrough_completes_once() {
    let h = harness();
    h.orchestrator.load(calculator_scenario()).await.unwrap();
    assert_eq!(h.orchestrator.phase(), ScenarioPhase::Loaded);

    h.orchestrator.start().await.unwrap();
    assert_eq!(h.orchestrator.current_stage().as_deref(), Some("intro"));

    // Wrong app: condition filters it out
    h.desktop.windows.launch("notepad").unwrap();
    settle().await;
    assert_eq!(h.orchestrator.current_stage().as_deref(), Some("intro"));

    // Right app advances to "solve"
    h.desktop.windows.launch("calculator").unwrap();
    settle().await;
    assert_eq!(h.orchestrator.current_stage().as_deref(), Some("solve"));
    assert_eq!(
        h.orchestrator.get_variable("trace"),
        Some(json!(["exit:intro", "enter:solve"]))
    );

    // Wrong result does nothing
    fire(&h.bus, "calculator:result", json!({"result": 41}));
    settle().await;
    assert_eq!(h.orchestrator.phase(), ScenarioPhase::Running);

    // Right result completes the scenario, onComplete runs exactly once
    fire(&h.bus, "calculator:result", json!({"result": 42}));
    settle().await;
    assert_eq!(h.orchestrator.phase(), ScenarioPhase::Completed);
    assert_eq!(h.orchestrator.get_variable("completions"), Some(json!(1)));
    assert!(!h.orchestrator.is_running());

    // Completion was persisted to durable state
    assert_eq!(
        h.store.get("scenarios.calc-tutorial.completed"),
        Some(json!(true))
    );
    assert!(h.store.get("scenarios.calc-tutorial.finishedAt").is_some());

    // A late qualifying event is no longer observed
    fire(&h.bus, "calculator:result", json!({"result": 42}));
    settle().await;
    assert_eq!(h.orchestrator.get_variable("completions"), Some(json!(1)));
}

#[tokio::test(start_paused = true)]
async fn debounced_trigger_increments_once() {
    let h = harness();
    h.orchestrator
        .load(json!({
            "id": "debounce-demo",
            "name": "Debounce Demo",
            "variables": {"attempts": 0},
            "stages": [{"id": "only"}],
            "globalTriggers": [{
                "id": "t-debounced",
                "event": "keyboard:typed",
                "debounce": 500,
                "actions": [{"type": "modifyState", "path": "attempts", "operation": "increment"}]
            }]
        }))
        .await
        .unwrap();
    h.orchestrator.start().await.unwrap();

    for _ in 0..3 {
        fire(&h.bus, "keyboard:typed", json!({}));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Quiet period has not elapsed yet
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.orchestrator.get_variable("attempts"), Some(json!(0)));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.orchestrator.get_variable("attempts"), Some(json!(1)));
}

#[tokio::test(start_paused = true)]
async fn hints_fire_on_schedule_and_respect_cap() {
    let h = harness();
    h.orchestrator
        .load(json!({
            "id": "hint-demo",
            "name": "Hint Demo",
            "config": {"hintDelay": 1000, "maxHints": 2},
            "stages": [{
                "id": "stuck",
                "hints": [
                    {"message": "Try the start menu"},
                    {"delay": 2000, "message": "It's the button on the left"},
                    {"message": "This one is over the cap"}
                ]
            }]
        }))
        .await
        .unwrap();

    let mut shown = h.bus.subscribe(events::HINT_SHOWN);
    h.orchestrator.start().await.unwrap();

    // First hint uses the scenario-wide default delay
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(h.orchestrator.hints_shown(), 1);
    let event = shown.recv().await.unwrap();
    assert_eq!(event.data["message"], "Try the start menu");

    // Second hint uses its own delay
    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(h.orchestrator.hints_shown(), 2);
    let event = shown.recv().await.unwrap();
    assert_eq!(event.data["message"], "It's the button on the left");

    // Cap reached: the third hint is never armed
    tokio::time::sleep(Duration::from_millis(5000)).await;
    assert_eq!(h.orchestrator.hints_shown(), 2);
    assert!(shown.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn pause_suppresses_hints_but_not_triggers() {
    let h = harness();
    h.orchestrator
        .load(json!({
            "id": "pause-demo",
            "name": "Pause Demo",
            "config": {"hintDelay": 500},
            "stages": [{
                "id": "only",
                "hints": [{"message": "You won't see this while paused"}],
                "triggers": [{
                    "id": "t-tick",
                    "event": "tick",
                    "actions": [{"type": "modifyState", "path": "ticks", "operation": "increment"}]
                }]
            }]
        }))
        .await
        .unwrap();
    h.orchestrator.start().await.unwrap();

    h.orchestrator.pause();
    assert_eq!(h.orchestrator.phase(), ScenarioPhase::Paused);

    // The hint timer fires during the pause and is suppressed
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(h.orchestrator.hints_shown(), 0);

    // Trigger processing stays fully active while paused
    fire(&h.bus, "tick", json!({}));
    settle().await;
    assert_eq!(h.orchestrator.get_variable("ticks"), Some(json!(1)));

    h.orchestrator.resume();
    assert_eq!(h.orchestrator.phase(), ScenarioPhase::Running);
}

#[tokio::test(start_paused = true)]
async fn once_bookkeeping_resets_between_runs() {
    let h = harness();
    let definition = json!({
        "id": "once-demo",
        "name": "Once Demo",
        "variables": {"count": 0},
        "stages": [{"id": "only"}],
        "globalTriggers": [{
            "id": "t-once",
            "event": "ping",
            "once": true,
            "actions": [{"type": "modifyState", "path": "count", "operation": "increment"}]
        }]
    });
    h.orchestrator.load(definition).await.unwrap();

    h.orchestrator.start().await.unwrap();
    fire(&h.bus, "ping", json!({}));
    fire(&h.bus, "ping", json!({}));
    settle().await;
    assert_eq!(h.orchestrator.get_variable("count"), Some(json!(1)));

    h.orchestrator.stop(false).await;
    assert_eq!(h.orchestrator.phase(), ScenarioPhase::Loaded);

    // A fresh run starts from a clean slate: variables reset and the
    // once-trigger may fire again
    h.orchestrator.start().await.unwrap();
    fire(&h.bus, "ping", json!({}));
    settle().await;
    assert_eq!(h.orchestrator.get_variable("count"), Some(json!(1)));
}

#[tokio::test(start_paused = true)]
async fn abort_runs_on_abort_actions() {
    let h = harness();
    h.orchestrator
        .load(json!({
            "id": "abort-demo",
            "name": "Abort Demo",
            "stages": [{"id": "only"}],
            "onAbort": [{"type": "writeFile", "path": "/tmp/aborted", "content": "yes"}]
        }))
        .await
        .unwrap();

    let mut aborted = h.bus.subscribe(events::SCENARIO_ABORTED);
    h.orchestrator.start().await.unwrap();
    h.orchestrator.stop(true).await;

    assert_eq!(h.orchestrator.phase(), ScenarioPhase::Aborted);
    assert!(h.desktop.vfs.exists("/tmp/aborted"));
    assert_eq!(
        aborted.recv().await.unwrap().data["scenarioId"],
        "abort-demo"
    );
}

#[tokio::test(start_paused = true)]
async fn failed_load_keeps_previous_scenario_and_opens_dialog() {
    let h = harness();
    h.orchestrator.load(calculator_scenario()).await.unwrap();

    let mut dialogs = h.bus.subscribe(sd_desktop::dialogs::events::DIALOG_OPENED);
    let result = h
        .orchestrator
        .load(json!({"id": "", "name": "", "stages": []}))
        .await;
    assert!(result.is_err());

    // The prior definition is untouched
    assert_eq!(
        h.orchestrator.definition().unwrap().id.as_str(),
        "calc-tutorial"
    );

    // The first error message surfaces in a dialog
    let event = dialogs.recv().await.unwrap();
    assert_eq!(event.data["title"], "Scenario failed to load");
}

#[tokio::test(start_paused = true)]
async fn auto_save_snapshots_variables_on_stage_transition() {
    let h = harness();
    h.orchestrator
        .load(json!({
            "id": "autosave-demo",
            "name": "Autosave Demo",
            "config": {"autoSave": true},
            "variables": {"progress": 0},
            "stages": [
                {
                    "id": "first",
                    "triggers": [{
                        "id": "t-next",
                        "event": "next",
                        "actions": [
                            {"type": "setVariable", "path": "progress", "value": 1},
                            {"type": "advanceStage", "stage": "second"}
                        ]
                    }]
                },
                {"id": "second"}
            ]
        }))
        .await
        .unwrap();
    h.orchestrator.start().await.unwrap();

    fire(&h.bus, "next", json!({}));
    settle().await;

    assert_eq!(h.orchestrator.current_stage().as_deref(), Some("second"));
    assert_eq!(
        h.store.get("scenarios.autosave-demo.variables.progress"),
        Some(json!(1))
    );
}

#[tokio::test(start_paused = true)]
async fn stage_scoped_trigger_dies_with_its_stage() {
    let h = harness();
    h.orchestrator
        .load(json!({
            "id": "scope-demo",
            "name": "Scope Demo",
            "stages": [
                {
                    "id": "a",
                    "triggers": [{
                        "id": "t-a",
                        "event": "poke",
                        "actions": [{"type": "modifyState", "path": "aPokes", "operation": "increment"}]
                    }]
                },
                {"id": "b"}
            ],
            "globalTriggers": [{
                "id": "t-advance",
                "event": "go",
                "actions": [{"type": "advanceStage", "stage": "b"}]
            }]
        }))
        .await
        .unwrap();
    h.orchestrator.start().await.unwrap();

    fire(&h.bus, "poke", json!({}));
    settle().await;
    assert_eq!(h.orchestrator.get_variable("aPokes"), Some(json!(1)));

    fire(&h.bus, "go", json!({}));
    settle().await;
    assert_eq!(h.orchestrator.current_stage().as_deref(), Some("b"));

    // The stage-A trigger was discarded on exit
    fire(&h.bus, "poke", json!({}));
    settle().await;
    assert_eq!(h.orchestrator.get_variable("aPokes"), Some(json!(1)));
}

#[tokio::test(start_paused = true)]
async fn fail_scenario_records_failure() {
    let h = harness();
    h.orchestrator
        .load(json!({
            "id": "fail-demo",
            "name": "Fail Demo",
            "stages": [{"id": "only"}],
            "globalTriggers": [{
                "id": "t-boom",
                "event": "boom",
                "actions": [{"type": "failScenario", "reason": "exploded"}]
            }],
            "onFail": [{"type": "writeFile", "path": "/tmp/failed", "content": "x"}]
        }))
        .await
        .unwrap();

    let mut failed = h.bus.subscribe(events::SCENARIO_FAILED);
    h.orchestrator.start().await.unwrap();

    fire(&h.bus, "boom", json!({}));
    settle().await;

    assert_eq!(h.orchestrator.phase(), ScenarioPhase::Failed);
    assert!(h.desktop.vfs.exists("/tmp/failed"));
    assert_eq!(h.store.get("scenarios.fail-demo.failed"), Some(json!(true)));

    let event = failed.recv().await.unwrap();
    assert_eq!(event.data["reason"], "exploded");
}
