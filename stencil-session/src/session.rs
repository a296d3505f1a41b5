//! Intent handling for one session.
//!
//! [`Session::dispatch`] handles one intent to completion, awaited host I/O
//! included, then publishes a [`StateSnapshot`]. Nothing else mutates the
//! state: the runtime loop feeds intents and debounce fires through here one
//! at a time.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};

use stencil_core::state::BusyFlags;
use stencil_core::types::ExportStatus;
use stencil_core::{generated, library, ApplicationState, ConflictNotice, KvStore, StateStore};
use stencil_sync::{classify, ConflictChoice, Resolution, SyncCoordinator, SyncStatus};

use crate::config::{SessionConfig, FIRE_QUEUE};
use crate::error::SessionError;
use crate::protocol::{Intent, Notification, StateSnapshot};
use crate::scheduler::AutoSyncScheduler;

pub struct Session {
    config: SessionConfig,
    store: StateStore,
    sync: SyncCoordinator,
    scheduler: AutoSyncScheduler,
    notifications: broadcast::Sender<Notification>,
}

impl Session {
    /// Build a session over a private and a shared store. The receiver yields
    /// debounce fires; pass each one to [`Session::on_auto_sync_fire`].
    pub fn new(
        config: SessionConfig,
        private: Arc<dyn KvStore>,
        shared: Arc<dyn KvStore>,
    ) -> (Self, mpsc::Receiver<u64>) {
        let (fire_tx, fire_rx) = mpsc::channel(FIRE_QUEUE);
        let (notifications, _) = broadcast::channel(config.notification_capacity.max(1));
        let session = Self {
            store: StateStore::new(private, config.private_key.clone()),
            sync: SyncCoordinator::with_keys(
                shared,
                config.snapshot_key.clone(),
                config.meta_key.clone(),
            ),
            scheduler: AutoSyncScheduler::new(config.debounce(), fire_tx),
            notifications,
            config,
        };
        (session, fire_rx)
    }

    pub fn state(&self) -> &ApplicationState {
        self.store.state()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub(crate) fn notifier(&self) -> broadcast::Sender<Notification> {
        self.notifications.clone()
    }

    pub fn auto_sync_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    /// Handle one intent and publish the resulting state, whether or not the
    /// intent succeeded.
    pub async fn dispatch(&mut self, intent: Intent) -> Result<StateSnapshot, SessionError> {
        let label = intent.label();
        let outcome = self.handle(intent).await;
        match &outcome {
            Ok(()) => tracing::debug!(intent = label, "intent handled"),
            Err(err) if err.is_conflict() => {
                tracing::info!(intent = label, error = %err, "intent blocked by conflict")
            }
            Err(err) => tracing::warn!(intent = label, error = %err, "intent failed"),
        }
        let snapshot = self.publish_state()?;
        outcome.map(|()| snapshot)
    }

    /// Run the auto-sync write for a debounce fire.
    ///
    /// Stale fires and fires arriving after auto-sync was switched off are
    /// ignored (`Ok(None)`). Failures never propagate: a conflict raises the
    /// conflict notice, anything else becomes an advisory. On success only
    /// the sync metadata changes.
    pub async fn on_auto_sync_fire(
        &mut self,
        generation: u64,
    ) -> Result<Option<StateSnapshot>, SessionError> {
        if !self.scheduler.take_fire(generation) {
            tracing::debug!(generation, "ignoring superseded auto-sync fire");
            return Ok(None);
        }
        let state = self.store.state();
        if !state.settings.auto_sync {
            return Ok(None);
        }
        if state.pending_conflict.is_some() {
            tracing::debug!("auto-sync skipped while a conflict is pending");
            return Ok(None);
        }

        let at_fire = state.clone();
        match self.sync.sync_to_shared(&at_fire).await {
            Ok(meta) => {
                tracing::info!(generation, "auto-sync wrote shared library");
                self.store.state_mut().sync_meta = meta;
                self.store.save().await;
                if let Some(err) = self.store.save_error() {
                    let message =
                        format!("Library synced, but saving this session's state failed: {err}");
                    self.advise(message);
                }
            }
            Err(err) => match err.conflict_notice() {
                Some(notice) => self.raise_conflict(notice),
                None => {
                    tracing::warn!(error = %err, "auto-sync failed");
                    self.advise(format!("Auto-sync failed: {err}"));
                }
            },
        }
        self.publish_state().map(Some)
    }

    /// Drop any pending auto-sync timer.
    pub fn shutdown(&mut self) {
        if self.scheduler.cancel() {
            tracing::debug!("pending auto-sync cancelled on shutdown");
        }
    }

    // -----------------------------------------------------------------------
    // Intent handlers
    // -----------------------------------------------------------------------

    async fn handle(&mut self, intent: Intent) -> Result<(), SessionError> {
        let library_mutation = intent.is_library_mutation();
        let state = self.store.state_mut();
        match intent {
            Intent::Initialize => return self.initialize().await,
            Intent::ChangeLocale { locale } => library::set_locale(state, locale)?,
            Intent::ChangeTone { tone } => library::set_tone(state, tone)?,
            Intent::SelectEntity { id } => library::select_entity(state, &id)?,
            Intent::SetLayoutMode { mode } => library::set_layout_mode(state, mode),
            Intent::ToggleResolvedIssue { index } => {
                library::toggle_resolved_issue(state, index);
            }
            Intent::CreateCustomEntity { from, name } => {
                library::create_custom_entity(state, &from, name)?;
            }
            Intent::RenameEntity { id, name } => library::rename_entity(state, &id, name)?,
            Intent::DeleteEntity { id } => library::delete_entity(state, &id)?,
            Intent::AddLocale { id, locale } => library::add_locale(state, &id, locale)?,
            Intent::EditVariant {
                id,
                locale,
                variant,
                payload,
            } => library::edit_variant(state, &id, &locale, variant, payload)?,
            Intent::Generate => return self.generate(),
            Intent::Export => return self.export(false),
            Intent::InsertIntoCanvas => return self.export(true),
            Intent::RequestSyncToShared => return self.sync_now().await,
            Intent::RequestPullFromShared => return self.pull().await,
            Intent::ResolveConflict { choice } => return self.resolve(choice).await,
            Intent::SetAutoSync { enabled } => return self.set_auto_sync(enabled).await,
            Intent::SetActor { name } => state.settings.actor = name,
        }

        self.store.save().await;
        if library_mutation && self.store.state().settings.auto_sync {
            self.scheduler.schedule();
        }
        Ok(())
    }

    async fn initialize(&mut self) -> Result<(), SessionError> {
        self.scheduler.cancel();
        let report = self.store.load().await;
        let state = self.store.state_mut();
        if state.settings.actor.is_none() {
            state.settings.actor = self.config.actor.clone();
        }
        if !report.is_clean() {
            self.advise(report.summary());
        }
        tracing::info!(
            entities = self.store.state().catalog.len(),
            upgraded = report.upgraded.len(),
            "session initialized"
        );
        Ok(())
    }

    fn generate(&mut self) -> Result<(), SessionError> {
        self.set_busy(|busy| busy.generating = true)?;
        let state = self.store.state_mut();
        let result = generated::source_variants(state)
            .and_then(|variants| generated::generate(state, variants).map(|_| ()));
        state.busy.generating = false;
        Ok(result?)
    }

    /// Hand the generated record to the host (export) or renderer (insert).
    fn export(&mut self, insert: bool) -> Result<(), SessionError> {
        let state = self.store.state_mut();
        let record = generated::require_fresh(state)?.clone();
        let entity_id = record.entity_id.clone();
        let at = Utc::now();
        let notification = if insert {
            state.export_status = Some(ExportStatus::Inserted { entity_id, at });
            Notification::InsertRequested { record }
        } else {
            state.export_status = Some(ExportStatus::Exported { entity_id, at });
            Notification::Exported { record }
        };
        let _ = self.notifications.send(notification);
        Ok(())
    }

    async fn sync_now(&mut self) -> Result<(), SessionError> {
        self.scheduler.cancel();
        self.set_busy(|busy| busy.syncing = true)?;
        let result = self.sync.sync_to_shared(self.store.state()).await;
        let state = self.store.state_mut();
        state.busy.syncing = false;
        match result {
            Ok(meta) => {
                state.sync_meta = meta;
                state.pending_conflict = None;
                self.store.save().await;
                Ok(())
            }
            Err(err) => {
                if let Some(notice) = err.conflict_notice() {
                    self.raise_conflict(notice);
                }
                Err(err.into())
            }
        }
    }

    async fn pull(&mut self) -> Result<(), SessionError> {
        self.scheduler.cancel();
        self.set_busy(|busy| busy.pulling = true)?;
        let result = self.sync.pull_from_shared(self.store.state()).await;
        self.store.state_mut().busy.pulling = false;
        self.adopt_pulled(result?).await;
        Ok(())
    }

    async fn resolve(&mut self, choice: ConflictChoice) -> Result<(), SessionError> {
        if self.store.state().pending_conflict.is_none() {
            return Err(SessionError::NoPendingConflict);
        }
        self.scheduler.cancel();
        self.set_busy(|busy| match choice {
            ConflictChoice::Pull => busy.pulling = true,
            ConflictChoice::Overwrite => busy.syncing = true,
        })?;
        let result = self.sync.resolve_conflict(self.store.state(), choice).await;
        self.store.state_mut().busy = BusyFlags::default();
        match result? {
            Resolution::Pulled(pulled) => self.adopt_pulled(*pulled).await,
            Resolution::Overwritten(meta) => {
                let state = self.store.state_mut();
                state.sync_meta = meta;
                state.pending_conflict = None;
                self.store.save().await;
            }
        }
        tracing::info!(?choice, "conflict resolved");
        Ok(())
    }

    async fn set_auto_sync(&mut self, enabled: bool) -> Result<(), SessionError> {
        self.store.state_mut().settings.auto_sync = enabled;
        self.store.save().await;
        if !enabled {
            self.scheduler.cancel();
        } else if classify(self.store.state())? == SyncStatus::LocallyModified {
            self.scheduler.schedule();
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn adopt_pulled(&mut self, mut pulled: ApplicationState) {
        pulled.busy = BusyFlags::default();
        self.store.replace(pulled);
        self.store.save().await;
    }

    /// Set busy flags and publish them before shared I/O starts.
    fn set_busy(&mut self, set: impl FnOnce(&mut BusyFlags)) -> Result<(), SessionError> {
        set(&mut self.store.state_mut().busy);
        self.publish_state().map(|_| ())
    }

    fn raise_conflict(&mut self, notice: ConflictNotice) {
        tracing::info!(
            remote_updated_at = %notice.remote_updated_at,
            remote_updated_by = notice.remote_updated_by.as_deref().unwrap_or("unknown"),
            "shared library changed elsewhere"
        );
        self.store.state_mut().pending_conflict = Some(notice.clone());
        let _ = self.notifications.send(Notification::Conflict(notice));
    }

    fn advise(&self, message: String) {
        let _ = self.notifications.send(Notification::Advisory { message });
    }

    fn publish_state(&self) -> Result<StateSnapshot, SessionError> {
        let snapshot = StateSnapshot::capture(self.store.state())?;
        let _ = self
            .notifications
            .send(Notification::State(Box::new(snapshot.clone())));
        Ok(snapshot)
    }
}

