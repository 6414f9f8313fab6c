//! Feature flags
//!
//! Named toggles that scenarios flip to gate host functionality (e.g.
//! revealing a hidden app after a puzzle is solved).

use dashmap::DashMap;
use sd_core::Context;
use sd_event_bus::EventBus;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Feature flag event names
pub mod events {
    pub const FEATURE_ENABLED: &str = "feature:enabled";
    pub const FEATURE_DISABLED: &str = "feature:disabled";
}

/// The feature flag store
pub struct FeatureFlags {
    enabled: DashMap<String, ()>,
    event_bus: Arc<EventBus>,
}

impl FeatureFlags {
    /// Create an empty flag store
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            enabled: DashMap::new(),
            event_bus,
        }
    }

    /// Enable a feature
    pub fn enable(&self, feature: &str) {
        if self.enabled.insert(feature.to_string(), ()).is_none() {
            debug!(feature, "Feature enabled");
            self.event_bus.publish_named(
                events::FEATURE_ENABLED,
                json!({"feature": feature}),
                Context::new(),
            );
        }
    }

    /// Disable a feature
    pub fn disable(&self, feature: &str) {
        if self.enabled.remove(feature).is_some() {
            debug!(feature, "Feature disabled");
            self.event_bus.publish_named(
                events::FEATURE_DISABLED,
                json!({"feature": feature}),
                Context::new(),
            );
        }
    }

    /// Whether a feature is enabled
    pub fn is_enabled(&self, feature: &str) -> bool {
        self.enabled.contains_key(feature)
    }
}
