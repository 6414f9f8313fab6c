//! Semantic events and their names

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Context;

/// Typed payload for a well-known event name
///
/// Implemented by payload structs that are always published under the
/// same name, enabling typed subscriptions on the bus.
pub trait EventData: Clone + Send + Sync + 'static {
    /// The event name this payload is published under
    fn event_name() -> &'static str;
}

/// A namespaced semantic event name
///
/// Names use `:`-separated segments, e.g. `app:launched` or
/// `fs:written`; the leading segment identifies the publishing
/// subsystem. The single-character name `*` is reserved as the
/// wildcard that matches every event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventName(String);

impl EventName {
    /// Reserved wildcard name matching every event
    pub const WILDCARD: &'static str = "*";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The wildcard name
    pub fn wildcard() -> Self {
        Self(Self::WILDCARD.to_owned())
    }

    /// Whether this name is the reserved wildcard
    pub fn is_wildcard(&self) -> bool {
        self.0 == Self::WILDCARD
    }

    /// The subsystem segment of the name (everything before the first `:`)
    pub fn namespace(&self) -> &str {
        match self.0.split_once(':') {
            Some((ns, _)) => ns,
            None => &self.0,
        }
    }
}

impl From<&str> for EventName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for EventName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A semantic event as it travels over the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T = serde_json::Value> {
    pub name: EventName,

    /// The event payload
    pub data: T,

    /// When the event was published
    pub published_at: DateTime<Utc>,

    /// Causality chain back to whatever initiated this event
    pub context: Context,
}

impl<T> Event<T> {
    /// Wrap a payload into an event stamped with the current time
    pub fn new(name: impl Into<EventName>, data: T, context: Context) -> Self {
        Event {
            name: name.into(),
            data,
            published_at: Utc::now(),
            context,
        }
    }
}

impl<T: EventData> Event<T> {
    /// Build an event carrying a typed payload under its well-known name
    pub fn typed(data: T, context: Context) -> Self {
        Self::new(T::event_name(), data, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_name_namespace() {
        assert_eq!(EventName::new("app:launched").namespace(), "app");
        assert_eq!(EventName::new("tick").namespace(), "tick");
    }

    #[test]
    fn test_wildcard() {
        assert!(EventName::wildcard().is_wildcard());
        assert!(!EventName::new("app:launched").is_wildcard());
    }

    #[test]
    fn test_event_roundtrip() {
        let event = Event::new("app:launched", json!({"appId": "calculator"}), Context::new());
        let text = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&text).unwrap();

        assert_eq!(back.name.as_str(), "app:launched");
        assert_eq!(back.data["appId"], "calculator");
    }
}
