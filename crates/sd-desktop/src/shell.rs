//! Desktop shell surface
//!
//! Icons on the desktop, toast notifications, assistant messages, visual
//! effects, and the active theme. Purely presentational state; scenarios
//! drive it through actions and the host renders it.

use indexmap::IndexMap;
use sd_core::Context;
use sd_event_bus::EventBus;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Shell event names
pub mod events {
    pub const ICON_ADDED: &str = "desktop:icon-added";
    pub const ICON_REMOVED: &str = "desktop:icon-removed";
    pub const NOTIFICATION_SHOWN: &str = "notification:shown";
    pub const ASSISTANT_MESSAGE: &str = "assistant:message";
    pub const EFFECT_PLAYED: &str = "effect:played";
    pub const THEME_CHANGED: &str = "theme:changed";
}

/// A desktop icon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesktopIcon {
    pub id: String,
    pub label: String,
    /// Icon asset name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// App or file the icon opens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// The desktop shell
pub struct DesktopShell {
    /// Icons in placement order
    icons: RwLock<IndexMap<String, DesktopIcon>>,
    theme: RwLock<String>,
    event_bus: Arc<EventBus>,
}

impl DesktopShell {
    /// Create a shell with the default theme
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            icons: RwLock::new(IndexMap::new()),
            theme: RwLock::new("default".to_string()),
            event_bus,
        }
    }

    /// Add (or replace) a desktop icon
    pub fn add_icon(&self, icon: DesktopIcon) {
        let id = icon.id.clone();
        self.icons
            .write()
            .expect("shell lock poisoned")
            .insert(id.clone(), icon);

        debug!(icon_id = %id, "Desktop icon added");
        self.event_bus
            .publish_named(events::ICON_ADDED, json!({"iconId": id}), Context::new());
    }

    /// Remove a desktop icon
    pub fn remove_icon(&self, id: &str) -> bool {
        let removed = self
            .icons
            .write()
            .expect("shell lock poisoned")
            .shift_remove(id)
            .is_some();

        if removed {
            debug!(icon_id = id, "Desktop icon removed");
            self.event_bus
                .publish_named(events::ICON_REMOVED, json!({"iconId": id}), Context::new());
        }
        removed
    }

    /// Current icons in placement order
    pub fn icons(&self) -> Vec<DesktopIcon> {
        self.icons
            .read()
            .expect("shell lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Show a toast notification
    pub fn notify(&self, title: &str, message: &str, icon: Option<&str>) {
        debug!(title, "Notification shown");
        self.event_bus.publish_named(
            events::NOTIFICATION_SHOWN,
            json!({"title": title, "message": message, "icon": icon}),
            Context::new(),
        );
    }

    /// Have the desktop assistant say something
    pub fn assistant_say(&self, message: &str, mood: Option<&str>) {
        debug!(message, "Assistant message");
        self.event_bus.publish_named(
            events::ASSISTANT_MESSAGE,
            json!({"message": message, "mood": mood}),
            Context::new(),
        );
    }

    /// Play a visual effect (confetti, screen shake, ...)
    pub fn play_effect(&self, effect: &str, duration_ms: Option<u64>) {
        debug!(effect, "Effect played");
        self.event_bus.publish_named(
            events::EFFECT_PLAYED,
            json!({"effect": effect, "durationMs": duration_ms}),
            Context::new(),
        );
    }

    /// Switch the desktop theme
    pub fn set_theme(&self, theme: &str) {
        *self.theme.write().expect("shell lock poisoned") = theme.to_string();

        debug!(theme, "Theme changed");
        self.event_bus
            .publish_named(events::THEME_CHANGED, json!({"theme": theme}), Context::new());
    }

    /// The active theme
    pub fn theme(&self) -> String {
        self.theme.read().expect("shell lock poisoned").clone()
    }
}
