use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use stencil_core::KvStore;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::protocol::{Intent, Notification, StateSnapshot};
use crate::session::Session;

struct IntentJob {
    intent: Intent,
    respond_to: oneshot::Sender<Result<StateSnapshot, SessionError>>,
}

/// Cloneable front door of a running session.
#[derive(Clone)]
pub struct SessionHandle {
    intents: mpsc::Sender<IntentJob>,
    notifications: broadcast::Sender<Notification>,
    shutdown: broadcast::Sender<()>,
}

impl SessionHandle {
    /// Queue an intent and wait for it to be handled.
    pub async fn send(&self, intent: Intent) -> Result<StateSnapshot, SessionError> {
        let (respond_to, response) = oneshot::channel();
        self.intents
            .send(IntentJob { intent, respond_to })
            .await
            .map_err(|_| SessionError::ChannelClosed("intent queue"))?;
        response
            .await
            .map_err(|_| SessionError::ChannelClosed("intent response"))?
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Ask the loop to stop after the intent in progress.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }
}

/// Start a session loop on the current tokio runtime.
pub fn spawn(
    config: SessionConfig,
    private: Arc<dyn KvStore>,
    shared: Arc<dyn KvStore>,
) -> (SessionHandle, JoinHandle<Result<(), SessionError>>) {
    let (intent_tx, intent_rx) = mpsc::channel::<IntentJob>(config.intent_queue.max(1));
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(4);
    let (session, fire_rx) = Session::new(config, private, shared);

    let handle = SessionHandle {
        intents: intent_tx,
        notifications: session.notifier(),
        shutdown: shutdown_tx,
    };
    let join = tokio::spawn(run(session, intent_rx, fire_rx, shutdown_rx));
    (handle, join)
}

async fn run(
    mut session: Session,
    mut intents: mpsc::Receiver<IntentJob>,
    mut fires: mpsc::Receiver<u64>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), SessionError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            job = intents.recv() => {
                let Some(job) = job else { break };
                let outcome = session.dispatch(job.intent).await;
                let _ = job.respond_to.send(outcome);
            }
            fire = fires.recv() => {
                let Some(generation) = fire else { break };
                if let Err(err) = session.on_auto_sync_fire(generation).await {
                    tracing::warn!(error = %err, "auto-sync fire handling failed");
                }
            }
        }
    }

    session.shutdown();
    tracing::info!("session loop stopped");
    Ok(())
}

/// Install a `fmt` subscriber filtered by `RUST_LOG`, defaulting to `info`.
/// Records from crates logging through `log` are forwarded too.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Like [`init_tracing`], with one JSON object per line.
pub fn init_json_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().json().with_env_filter(filter).try_init();
}
