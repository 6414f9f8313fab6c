//! Modal dialog service
//!
//! A dialog suspends the caller until the host dismisses it: `show`
//! returns a future that resolves only when `dismiss` is called with the
//! dialog's id. The scenario engine's `showDialog` action awaits this,
//! which is what suspends an action sequence mid-run.

use dashmap::DashMap;
use sd_core::Context;
use sd_event_bus::EventBus;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;
use ulid::Ulid;

/// Dialog event names
pub mod events {
    pub const DIALOG_OPENED: &str = "dialog:opened";
    pub const DIALOG_DISMISSED: &str = "dialog:dismissed";
}

/// Dialog errors
#[derive(Debug, Error)]
pub enum DialogError {
    #[error("No open dialog with id: {0}")]
    NotFound(String),

    #[error("Dialog was dropped before dismissal")]
    Cancelled,
}

/// Result type for dialog operations
pub type DialogResult<T> = Result<T, DialogError>;

/// A dialog waiting for dismissal
#[derive(Debug, Clone)]
pub struct DialogRequest {
    pub id: String,
    pub title: String,
    pub message: String,
    pub buttons: Vec<String>,
}

/// The modal dialog service
pub struct DialogService {
    pending: DashMap<String, oneshot::Sender<Value>>,
    event_bus: Arc<EventBus>,
}

impl DialogService {
    /// Create a new dialog service
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            pending: DashMap::new(),
            event_bus,
        }
    }

    /// Open a dialog and wait for the host to dismiss it
    ///
    /// Resolves to the dismissal value (typically the chosen button).
    /// Awaiting this is what suspends a scenario action sequence while
    /// a dialog is open.
    pub async fn show(
        &self,
        title: impl Into<String>,
        message: impl Into<String>,
        buttons: Vec<String>,
    ) -> DialogResult<Value> {
        let request = DialogRequest {
            id: Ulid::new().to_string(),
            title: title.into(),
            message: message.into(),
            buttons,
        };

        let (tx, rx) = oneshot::channel();
        self.pending.insert(request.id.clone(), tx);

        debug!(dialog_id = %request.id, title = %request.title, "Dialog opened");
        self.event_bus.publish_named(
            events::DIALOG_OPENED,
            json!({
                "dialogId": request.id,
                "title": request.title,
                "message": request.message,
                "buttons": request.buttons,
            }),
            Context::new(),
        );

        rx.await.map_err(|_| DialogError::Cancelled)
    }

    /// Dismiss an open dialog, resuming whoever is awaiting it
    pub fn dismiss(&self, dialog_id: &str, value: Value) -> DialogResult<()> {
        let (_, tx) = self
            .pending
            .remove(dialog_id)
            .ok_or_else(|| DialogError::NotFound(dialog_id.to_string()))?;

        debug!(dialog_id, "Dialog dismissed");
        self.event_bus.publish_named(
            events::DIALOG_DISMISSED,
            json!({"dialogId": dialog_id, "value": value}),
            Context::new(),
        );

        // Receiver may already be gone if the awaiting task was aborted
        let _ = tx.send(value);
        Ok(())
    }

    /// Ids of dialogs still waiting for dismissal
    pub fn open_dialogs(&self) -> Vec<String> {
        self.pending.iter().map(|d| d.key().clone()).collect()
    }
}
