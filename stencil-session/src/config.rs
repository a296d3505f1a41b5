use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PRIVATE_KEY: &str = "stencil.state";
pub const DEFAULT_SNAPSHOT_KEY: &str = "stencil.library";
pub const DEFAULT_META_KEY: &str = "stencil.library.meta";
pub const DEFAULT_DEBOUNCE_MS: u64 = 1500;
pub const DEFAULT_INTENT_QUEUE: usize = 64;
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 64;

/// Queue depth of debounce-timer fires; only the latest one is ever acted on.
pub(crate) const FIRE_QUEUE: usize = 8;

/// Host-supplied session settings. Every field has a default, so an empty
/// JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Private-store key of the persisted record.
    pub private_key: String,
    /// Shared-store key of the library snapshot.
    pub snapshot_key: String,
    /// Shared-store key of the library metadata blob.
    pub meta_key: String,
    /// Auto-sync quiet period.
    pub debounce_ms: u64,
    /// Actor name used when the persisted settings carry none.
    pub actor: Option<String>,
    pub intent_queue: usize,
    pub notification_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            private_key: DEFAULT_PRIVATE_KEY.into(),
            snapshot_key: DEFAULT_SNAPSHOT_KEY.into(),
            meta_key: DEFAULT_META_KEY.into(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            actor: None,
            intent_queue: DEFAULT_INTENT_QUEUE,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }
}

impl SessionConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
