//! Achievement store
//!
//! Unlocked achievements for the current user. Unlocking is idempotent
//! and fires `achievement:unlocked` on the first unlock only.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sd_core::Context;
use sd_event_bus::EventBus;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Event fired when an achievement is first unlocked
pub const ACHIEVEMENT_UNLOCKED: &str = "achievement:unlocked";

/// The achievement store
pub struct AchievementStore {
    unlocked: DashMap<String, DateTime<Utc>>,
    event_bus: Arc<EventBus>,
}

impl AchievementStore {
    /// Create an empty achievement store
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            unlocked: DashMap::new(),
            event_bus,
        }
    }

    /// Unlock an achievement
    ///
    /// Returns true if this call performed the unlock, false if it was
    /// already unlocked.
    pub fn unlock(&self, id: &str) -> bool {
        if self.unlocked.contains_key(id) {
            return false;
        }
        self.unlocked.insert(id.to_string(), Utc::now());

        debug!(id, "Achievement unlocked");
        self.event_bus.publish_named(
            ACHIEVEMENT_UNLOCKED,
            json!({"achievementId": id}),
            Context::new(),
        );
        true
    }

    /// Whether an achievement is unlocked
    pub fn is_unlocked(&self, id: &str) -> bool {
        self.unlocked.contains_key(id)
    }

    /// When an achievement was unlocked
    pub fn unlocked_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.unlocked.get(id).map(|a| *a.value())
    }

    /// Ids of all unlocked achievements
    pub fn all_unlocked(&self) -> Vec<String> {
        self.unlocked.iter().map(|a| a.key().clone()).collect()
    }
}
