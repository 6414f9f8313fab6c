//! Simulated desktop collaborators for SimDesk
//!
//! The services in this crate are the side-effect surface the scenario
//! engine acts on: a virtual file system, a window/app manager, an
//! achievement store, feature flags, blocking modal dialogs, the desktop
//! shell, and sound playback. Each service fires semantic events on the
//! shared event bus, which is how scenarios observe user and system
//! activity.

pub mod achievements;
pub mod audio;
pub mod dialogs;
pub mod features;
pub mod shell;
pub mod vfs;
pub mod windows;

pub use achievements::{AchievementStore, ACHIEVEMENT_UNLOCKED};
pub use audio::SoundService;
pub use dialogs::{DialogError, DialogRequest, DialogResult, DialogService};
pub use features::FeatureFlags;
pub use shell::{DesktopIcon, DesktopShell};
pub use vfs::{VfsError, VfsResult, VirtualFs};
pub use windows::{Window, WindowError, WindowManager, WindowResult};

use sd_event_bus::EventBus;
use std::sync::Arc;

/// The full set of desktop collaborators, constructed over one bus
///
/// Convenience bundle for hosts and tests; the scenario engine takes the
/// individual Arcs it needs.
pub struct Desktop {
    pub vfs: Arc<VirtualFs>,
    pub windows: Arc<WindowManager>,
    pub achievements: Arc<AchievementStore>,
    pub features: Arc<FeatureFlags>,
    pub dialogs: Arc<DialogService>,
    pub shell: Arc<DesktopShell>,
    pub sounds: Arc<SoundService>,
}

impl Desktop {
    /// Construct every collaborator over the given bus
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            vfs: Arc::new(VirtualFs::new(event_bus.clone())),
            windows: Arc::new(WindowManager::new(event_bus.clone())),
            achievements: Arc::new(AchievementStore::new(event_bus.clone())),
            features: Arc::new(FeatureFlags::new(event_bus.clone())),
            dialogs: Arc::new(DialogService::new(event_bus.clone())),
            shell: Arc::new(DesktopShell::new(event_bus.clone())),
            sounds: Arc::new(SoundService::new(event_bus)),
        }
    }
}
