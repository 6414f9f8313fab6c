//! Sound service
//!
//! Tracks which named sounds are playing. The host does the actual
//! playback; this service is the source of truth scenarios interact with.

use dashmap::DashMap;
use sd_core::Context;
use sd_event_bus::EventBus;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Sound event names
pub mod events {
    pub const SOUND_PLAYED: &str = "sound:played";
    pub const SOUND_STOPPED: &str = "sound:stopped";
}

/// The sound service
pub struct SoundService {
    playing: DashMap<String, bool>,
    event_bus: Arc<EventBus>,
}

impl SoundService {
    /// Create a new sound service
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            playing: DashMap::new(),
            event_bus,
        }
    }

    /// Start playing a named sound
    pub fn play(&self, sound: &str, looped: bool) {
        self.playing.insert(sound.to_string(), looped);

        debug!(sound, looped, "Sound playing");
        self.event_bus.publish_named(
            events::SOUND_PLAYED,
            json!({"sound": sound, "looped": looped}),
            Context::new(),
        );
    }

    /// Stop a named sound, or all sounds when `sound` is None
    pub fn stop(&self, sound: Option<&str>) {
        let stopped: Vec<String> = match sound {
            Some(name) => self
                .playing
                .remove(name)
                .map(|(name, _)| name)
                .into_iter()
                .collect(),
            None => {
                let all: Vec<String> = self.playing.iter().map(|s| s.key().clone()).collect();
                self.playing.clear();
                all
            }
        };

        for name in stopped {
            debug!(sound = %name, "Sound stopped");
            self.event_bus
                .publish_named(events::SOUND_STOPPED, json!({"sound": name}), Context::new());
        }
    }

    /// Whether a sound is currently playing
    pub fn is_playing(&self, sound: &str) -> bool {
        self.playing.contains_key(sound)
    }
}
