//! Semantic event bus for SimDesk
//!
//! Every subsystem of the simulated desktop — applications, the virtual
//! file system, the scenario engine — communicates through events
//! published here. Subscribers listen to a single event name or to the
//! `*` wildcard.
//!
//! Besides subscriptions, the bus supports interceptors: an interceptor
//! observes every publication exactly once, whether or not anything
//! subscribed to that name. The trigger engine relies on this to match
//! wildcard and prefix patterns without maintaining per-name
//! subscriptions.

use dashmap::DashMap;
use sd_core::{Context, Event, EventData, EventName};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace};

/// Broadcast buffer size for each subscription channel
const CHANNEL_CAPACITY: usize = 1024;

type JsonEvent = Event<serde_json::Value>;

/// Handle identifying a registered interceptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterceptorId(u64);

/// Central publish/subscribe broker for semantic events
pub struct EventBus {
    /// Per-name broadcast channels, created lazily on first subscribe
    channels: DashMap<EventName, broadcast::Sender<JsonEvent>>,
    /// Channel feeding wildcard subscribers
    any_tx: broadcast::Sender<JsonEvent>,
    /// Interceptors observe every publication; unbounded channels so an
    /// interceptor never misses an event under load
    interceptors: DashMap<InterceptorId, mpsc::UnboundedSender<JsonEvent>>,
    next_interceptor: AtomicU64,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            any_tx: broadcast::channel(capacity).0,
            interceptors: DashMap::new(),
            next_interceptor: AtomicU64::new(1),
            capacity,
        }
    }

    /// Publish an event to interceptors and all matching subscribers
    pub fn publish(&self, event: JsonEvent) {
        debug!(event = %event.name, "publishing event");

        self.interceptors.retain(|_, tx| tx.send(event.clone()).is_ok());

        if let Some(tx) = self.channels.get(&event.name) {
            // A send error only means no subscriber is currently live
            let _ = tx.send(event.clone());
        }
        let _ = self.any_tx.send(event);
    }

    /// Publish a JSON payload under a name, wrapping it into an event
    pub fn publish_named(
        &self,
        name: impl Into<EventName>,
        data: serde_json::Value,
        context: Context,
    ) {
        self.publish(Event::new(name, data, context));
    }

    /// Publish a typed payload under its well-known event name
    pub fn publish_typed<T: EventData + serde::Serialize>(&self, data: T, context: Context) {
        let data = serde_json::to_value(&data).unwrap_or_default();
        self.publish(Event::new(T::event_name(), data, context));
    }

    /// Subscribe to one event name, or to `*` for everything
    pub fn subscribe(&self, name: impl Into<EventName>) -> broadcast::Receiver<JsonEvent> {
        let name = name.into();
        trace!(event = %name, "new subscription");

        if name.is_wildcard() {
            self.any_tx.subscribe()
        } else {
            self.channels
                .entry(name)
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        }
    }

    /// Subscribe to every event regardless of name
    pub fn subscribe_any(&self) -> broadcast::Receiver<JsonEvent> {
        self.any_tx.subscribe()
    }

    /// Subscribe to a well-known event name with payload deserialization
    pub fn subscribe_typed<T>(&self) -> TypedSubscription<T>
    where
        T: EventData + serde::de::DeserializeOwned,
    {
        TypedSubscription {
            rx: self.subscribe(T::event_name()),
            _marker: PhantomData,
        }
    }

    /// Register an interceptor observing every publication
    ///
    /// Returns the handle used to remove it and the receiving end of its
    /// channel. Delivery happens before any subscriber sees the event.
    pub fn intercept(&self) -> (InterceptorId, mpsc::UnboundedReceiver<JsonEvent>) {
        let id = InterceptorId(self.next_interceptor.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::unbounded_channel();
        self.interceptors.insert(id, tx);
        debug!(?id, "interceptor registered");
        (id, rx)
    }

    /// Remove a previously registered interceptor
    pub fn remove_interceptor(&self, id: InterceptorId) {
        if self.interceptors.remove(&id).is_some() {
            debug!(?id, "interceptor removed");
        }
    }

    /// Number of event names with an active subscription channel
    pub fn subscription_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of registered interceptors
    pub fn interceptor_count(&self) -> usize {
        self.interceptors.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscription yielding events whose payload deserializes as `T`
pub struct TypedSubscription<T> {
    rx: broadcast::Receiver<JsonEvent>,
    _marker: PhantomData<T>,
}

impl<T> TypedSubscription<T>
where
    T: EventData + serde::de::DeserializeOwned,
{
    /// Next event with a well-formed `T` payload; malformed payloads
    /// under the same name are skipped
    pub async fn recv(&mut self) -> Result<Event<T>, broadcast::error::RecvError> {
        loop {
            let raw = self.rx.recv().await?;
            if let Ok(data) = serde_json::from_value(raw.data.clone()) {
                return Ok(Event {
                    name: raw.name,
                    data,
                    published_at: raw.published_at,
                    context: raw.context,
                });
            }
        }
    }
}

/// Thread-safe handle used by collaborators and the engine
pub type SharedEventBus = Arc<EventBus>;
