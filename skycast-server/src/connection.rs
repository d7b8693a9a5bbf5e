//! One client connection: control-message handling and the subscription
//! map.
//!
//! The handler is transport-agnostic. It consumes decoded text messages and
//! writes envelopes through an [`Outbox`]; the runtime owns the socket.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use skycast_core::{FeedId, FeedKind, Params, SourceFactory};

use crate::error::ProtocolError;
use crate::outbox::Outbox;
use crate::protocol::ControlMessage;
use crate::scheduler::Subscription;
use crate::stats::Shared;

/// Legacy text command asking the server to close the connection.
pub const CLOSE_COMMAND: &str = "close";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

pub struct Connection {
    peer: String,
    factory: Arc<dyn SourceFactory>,
    outbox: Outbox,
    shared: Shared,
    subscriptions: HashMap<FeedId, Subscription>,
    open: bool,
}

impl Connection {
    pub fn new(
        peer: impl Into<String>,
        factory: Arc<dyn SourceFactory>,
        outbox: Outbox,
        shared: Shared,
    ) -> Self {
        shared.stats.connection_opened();
        Self {
            peer: peer.into(),
            factory,
            outbox,
            shared,
            subscriptions: HashMap::new(),
            open: true,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Handle one inbound text message. Protocol errors are logged and the
    /// connection stays open.
    pub async fn handle_text(&mut self, text: &str) -> Flow {
        if !self.open || text.trim() == CLOSE_COMMAND {
            return Flow::Close;
        }
        let result = match ControlMessage::parse(text) {
            Ok(message) => self.apply(message).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            warn!(peer = %self.peer, error = %err, "protocol error");
        }
        Flow::Continue
    }

    pub async fn apply(&mut self, message: ControlMessage) -> Result<(), ProtocolError> {
        match message {
            ControlMessage::Activate { kind, params } => {
                self.activate(kind, &params)?;
            }
            ControlMessage::Deactivate { handler } => {
                self.deactivate(&handler).await;
            }
        }
        Ok(())
    }

    /// Build the Data Source and start its refresh loop. Activating a feed id
    /// that is already live keeps the running subscription.
    pub fn activate(&mut self, kind: FeedKind, params: &Params) -> Result<FeedId, ProtocolError> {
        let source = self.factory.build(kind, params)?;
        let id = source.id().clone();
        if self.subscriptions.contains_key(&id) {
            debug!(peer = %self.peer, feed = %id, "already active");
            return Ok(id);
        }

        let subscription = Subscription::spawn(source, self.outbox.clone(), self.shared.clone());
        self.subscriptions.insert(id.clone(), subscription);
        self.shared.stats.subscription_added();
        info!(peer = %self.peer, feed = %id, kind = %kind, "activated");
        Ok(id)
    }

    /// Remove the subscription and wait for its loop to stop. Returns
    /// `false` when no such feed was active.
    pub async fn deactivate(&mut self, id: &FeedId) -> bool {
        let Some(subscription) = self.subscriptions.remove(id) else {
            debug!(peer = %self.peer, feed = %id, "deactivate for inactive feed");
            return false;
        };
        subscription.cancel().await;
        self.shared.stats.subscriptions_removed(1);
        info!(peer = %self.peer, feed = %id, "deactivated");
        true
    }

    /// Cancel every subscription. When this returns no timer owned by this
    /// connection is armed.
    pub async fn close(&mut self) {
        self.open = false;
        let drained: Vec<Subscription> = self.subscriptions.drain().map(|(_, s)| s).collect();
        let count = drained.len();
        join_all(drained.into_iter().map(Subscription::cancel)).await;
        self.shared.stats.subscriptions_removed(count);
        debug!(peer = %self.peer, cancelled = count, "connection closed");
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn subscription(&self, id: &FeedId) -> Option<&Subscription> {
        self.subscriptions.get(id)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Remaining subscriptions cancel themselves through their drop guards.
        self.shared
            .stats
            .subscriptions_removed(self.subscriptions.len());
        self.shared.stats.connection_closed();
    }
}
