//! The single owner of a session's [`ApplicationState`].
//!
//! `load` never fails: an empty read yields defaults, a failed read yields
//! defaults with a report saying so, anything else goes through the migrator. `save` is best-effort: a failed write is logged
//! and remembered (see [`StateStore::save_error`]) while the in-memory state
//! stays authoritative.

use std::sync::Arc;

use crate::kv::KvStore;
use crate::migrate::{migrate_with_report, MigrationReport, ResetReason};
use crate::state::ApplicationState;

/// Well-known key holding the persisted record.
pub const DEFAULT_STATE_KEY: &str = "stencil.state";

pub struct StateStore {
    host: Arc<dyn KvStore>,
    key: String,
    state: ApplicationState,
    save_error: Option<String>,
}

impl StateStore {
    /// A store holding default state. Call [`StateStore::load`] to read the host.
    pub fn new(host: Arc<dyn KvStore>, key: impl Into<String>) -> Self {
        Self {
            host,
            key: key.into(),
            state: ApplicationState::default(),
            save_error: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> &ApplicationState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ApplicationState {
        &mut self.state
    }

    /// Swap in a whole new state (used after a pull).
    pub fn replace(&mut self, state: ApplicationState) {
        self.state = state;
    }

    /// Read and migrate the persisted record, replacing the in-memory state.
    pub async fn load(&mut self) -> MigrationReport {
        let raw = match self.host.get(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!("no persisted state under '{}'; using defaults", self.key);
                self.state = ApplicationState::default();
                return MigrationReport::default();
            }
            Err(err) => {
                tracing::warn!("reading persisted state failed ({err}); using defaults");
                self.state = ApplicationState::default();
                return MigrationReport {
                    reset: Some(ResetReason::ReadFailed {
                        error: err.to_string(),
                    }),
                    ..MigrationReport::default()
                };
            }
        };

        let migrated = migrate_with_report(&raw);
        if !migrated.report.is_clean() {
            tracing::warn!("{}", migrated.report.summary());
        }
        self.state = ApplicationState::from_record(migrated.record);
        migrated.report
    }

    /// Persist the current state. Returns whether the write succeeded.
    pub async fn save(&mut self) -> bool {
        let record = self.state.to_record();
        let value = match serde_json::to_value(&record) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("serializing state failed: {err}");
                self.save_error = Some(err.to_string());
                return false;
            }
        };
        match self.host.set(&self.key, value).await {
            Ok(()) => {
                self.save_error = None;
                true
            }
            Err(err) => {
                tracing::warn!("saving state failed; keeping in-memory copy: {err}");
                self.save_error = Some(err.to_string());
                false
            }
        }
    }

    /// The error of the most recent save, if it failed.
    pub fn save_error(&self) -> Option<&str> {
        self.save_error.as_deref()
    }
}
