//! Session runtime: intent dispatch, auto-sync debounce, notifications.

pub mod config;
mod error;
pub mod protocol;
pub mod scheduler;
mod runtime;
mod session;

pub use config::SessionConfig;
pub use error::SessionError;
pub use protocol::{Intent, Notification, StateSnapshot};
pub use runtime::{init_json_tracing, init_tracing, spawn, SessionHandle};
pub use session::Session;
