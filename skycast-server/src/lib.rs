//! skycast push server: WebSocket connections, subscriptions and the
//! refresh loop that drives every activated feed.

pub mod config;
pub mod connection;
mod error;
pub mod outbox;
pub mod protocol;
pub mod runtime;
pub mod scheduler;
pub mod stats;
pub mod timer;
pub mod tracker;

pub use config::{ConfigOverrides, ServerConfig};
pub use connection::{Connection, Flow};
pub use error::{ProtocolError, ServerError};
pub use outbox::{Frame, Outbox, Outgoing};
pub use protocol::ControlMessage;
pub use runtime::{init_tracing, router, run, serve, start_blocking, AppState, ServeOptions};
pub use scheduler::{Subscription, SubscriptionState};
pub use stats::{Shared, StatusSnapshot};
pub use timer::{Timer, TimerGauge};
pub use tracker::PersistTracker;

#[cfg(test)]
pub(crate) mod testing;
