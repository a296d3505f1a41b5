//! Debounced auto-sync timer.
//!
//! One pending-timer slot. [`AutoSyncScheduler::schedule`] aborts whatever
//! sits in the slot and replaces it, so rapid edits coalesce into a single
//! fire. A fire carries the generation it was scheduled under; the session
//! loop acts only on the latest generation, which also discards a fire that
//! was already queued when its timer got replaced.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct AutoSyncScheduler {
    quiet: Duration,
    fire_tx: mpsc::Sender<u64>,
    pending: Option<JoinHandle<()>>,
    generation: u64,
}

impl AutoSyncScheduler {
    pub fn new(quiet: Duration, fire_tx: mpsc::Sender<u64>) -> Self {
        Self {
            quiet,
            fire_tx,
            pending: None,
            generation: 0,
        }
    }

    /// Cancel any pending timer and start a new one. Returns its generation.
    pub fn schedule(&mut self) -> u64 {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        let quiet = self.quiet;
        let fire_tx = self.fire_tx.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            let _ = fire_tx.send(generation).await;
        }));
        tracing::debug!(generation, quiet_ms = quiet.as_millis() as u64, "auto-sync scheduled");
        generation
    }

    /// Drop the pending timer, if any. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Claim a fire. True only for the latest, still-pending generation.
    pub fn take_fire(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.pending.is_none() {
            return false;
        }
        self.pending = None;
        true
    }
}

impl Drop for AutoSyncScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
