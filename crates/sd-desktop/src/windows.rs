//! Window and application manager
//!
//! Tracks which applications are open, focused, or locked, and which
//! windows exist. Every transition fires a semantic event on the bus;
//! these are the events most scenarios are written against.

use dashmap::DashMap;
use sd_core::Context;
use sd_event_bus::EventBus;
use serde_json::json;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::debug;
use ulid::Ulid;

/// Window manager event names
pub mod events {
    pub const APP_LAUNCHED: &str = "app:launched";
    pub const APP_CLOSED: &str = "app:closed";
    pub const APP_FOCUSED: &str = "app:focused";
    pub const APP_LOCKED: &str = "app:locked";
    pub const APP_UNLOCKED: &str = "app:unlocked";
    pub const WINDOW_OPENED: &str = "window:opened";
    pub const WINDOW_CLOSED: &str = "window:closed";
    pub const WINDOW_MINIMIZED: &str = "window:minimized";
    pub const WINDOW_RESTORED: &str = "window:restored";
}

/// Window manager errors
#[derive(Debug, Error)]
pub enum WindowError {
    #[error("App not open: {0}")]
    AppNotOpen(String),

    #[error("App is locked: {0}")]
    AppLocked(String),

    #[error("Window not found: {0}")]
    WindowNotFound(String),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// A window belonging to an app
#[derive(Debug, Clone)]
pub struct Window {
    pub id: String,
    pub app_id: String,
    pub minimized: bool,
}

/// The window and application manager
pub struct WindowManager {
    /// Apps currently open
    open_apps: DashMap<String, ()>,
    /// Apps locked (refusing launch) even while closed
    locked_apps: DashMap<String, ()>,
    /// Windows by window id
    windows: DashMap<String, Window>,
    /// Currently focused app, if any
    focused: RwLock<Option<String>>,
    event_bus: Arc<EventBus>,
}

impl WindowManager {
    /// Create a new window manager
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            open_apps: DashMap::new(),
            locked_apps: DashMap::new(),
            windows: DashMap::new(),
            focused: RwLock::new(None),
            event_bus,
        }
    }

    /// Launch an app: opens it, gives it a main window, and focuses it
    ///
    /// Launching a locked app fails. Launching an already-open app only
    /// refocuses it.
    pub fn launch(&self, app_id: &str) -> WindowResult<()> {
        if self.locked_apps.contains_key(app_id) {
            return Err(WindowError::AppLocked(app_id.to_string()));
        }

        if !self.open_apps.contains_key(app_id) {
            self.open_apps.insert(app_id.to_string(), ());
            let window = Window {
                id: Ulid::new().to_string(),
                app_id: app_id.to_string(),
                minimized: false,
            };
            let window_id = window.id.clone();
            self.windows.insert(window_id.clone(), window);

            debug!(app_id, "App launched");
            self.event_bus.publish_named(
                events::APP_LAUNCHED,
                json!({"appId": app_id, "windowId": window_id}),
                Context::new(),
            );
            self.event_bus.publish_named(
                events::WINDOW_OPENED,
                json!({"appId": app_id, "windowId": window_id}),
                Context::new(),
            );
        }

        self.focus(app_id)
    }

    /// Close an app and all of its windows
    pub fn close(&self, app_id: &str) -> WindowResult<()> {
        self.open_apps
            .remove(app_id)
            .ok_or_else(|| WindowError::AppNotOpen(app_id.to_string()))?;

        let closed: Vec<String> = self
            .windows
            .iter()
            .filter(|w| w.app_id == app_id)
            .map(|w| w.id.clone())
            .collect();
        for window_id in &closed {
            self.windows.remove(window_id);
            self.event_bus.publish_named(
                events::WINDOW_CLOSED,
                json!({"appId": app_id, "windowId": window_id}),
                Context::new(),
            );
        }

        let mut focused = self.focused.write().expect("focus lock poisoned");
        if focused.as_deref() == Some(app_id) {
            *focused = None;
        }
        drop(focused);

        debug!(app_id, "App closed");
        self.event_bus
            .publish_named(events::APP_CLOSED, json!({"appId": app_id}), Context::new());
        Ok(())
    }

    /// Focus an open app
    pub fn focus(&self, app_id: &str) -> WindowResult<()> {
        if !self.open_apps.contains_key(app_id) {
            return Err(WindowError::AppNotOpen(app_id.to_string()));
        }

        *self.focused.write().expect("focus lock poisoned") = Some(app_id.to_string());
        self.event_bus
            .publish_named(events::APP_FOCUSED, json!({"appId": app_id}), Context::new());
        Ok(())
    }

    /// Lock an app, refusing further launches until unlocked
    pub fn lock(&self, app_id: &str) {
        self.locked_apps.insert(app_id.to_string(), ());
        debug!(app_id, "App locked");
        self.event_bus
            .publish_named(events::APP_LOCKED, json!({"appId": app_id}), Context::new());
    }

    /// Unlock an app
    pub fn unlock(&self, app_id: &str) {
        self.locked_apps.remove(app_id);
        debug!(app_id, "App unlocked");
        self.event_bus
            .publish_named(events::APP_UNLOCKED, json!({"appId": app_id}), Context::new());
    }

    /// Minimize a window
    pub fn minimize(&self, window_id: &str) -> WindowResult<()> {
        let mut window = self
            .windows
            .get_mut(window_id)
            .ok_or_else(|| WindowError::WindowNotFound(window_id.to_string()))?;
        window.minimized = true;

        self.event_bus.publish_named(
            events::WINDOW_MINIMIZED,
            json!({"appId": window.app_id, "windowId": window_id}),
            Context::new(),
        );
        Ok(())
    }

    /// Restore a minimized window
    pub fn restore(&self, window_id: &str) -> WindowResult<()> {
        let mut window = self
            .windows
            .get_mut(window_id)
            .ok_or_else(|| WindowError::WindowNotFound(window_id.to_string()))?;
        window.minimized = false;

        self.event_bus.publish_named(
            events::WINDOW_RESTORED,
            json!({"appId": window.app_id, "windowId": window_id}),
            Context::new(),
        );
        Ok(())
    }

    // --- Queries used by condition evaluation ---

    /// Whether an app is open
    pub fn is_open(&self, app_id: &str) -> bool {
        self.open_apps.contains_key(app_id)
    }

    /// Whether an app has focus
    pub fn is_focused(&self, app_id: &str) -> bool {
        self.focused.read().expect("focus lock poisoned").as_deref() == Some(app_id)
    }

    /// Whether an app is locked
    pub fn is_locked(&self, app_id: &str) -> bool {
        self.locked_apps.contains_key(app_id)
    }

    /// Whether a window exists, by window id or by owning app id
    pub fn window_exists(&self, id: &str) -> bool {
        self.windows.contains_key(id) || self.windows.iter().any(|w| w.app_id == id)
    }

    /// Whether a window is minimized, by window id or by owning app id
    pub fn window_minimized(&self, id: &str) -> bool {
        if let Some(window) = self.windows.get(id) {
            return window.minimized;
        }
        self.windows.iter().any(|w| w.app_id == id && w.minimized)
    }

    /// Ids of all open apps
    pub fn open_apps(&self) -> Vec<String> {
        self.open_apps.iter().map(|a| a.key().clone()).collect()
    }

    /// Windows belonging to an app
    pub fn app_windows(&self, app_id: &str) -> Vec<Window> {
        self.windows
            .iter()
            .filter(|w| w.app_id == app_id)
            .map(|w| w.value().clone())
            .collect()
    }
}
