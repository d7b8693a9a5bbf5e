//! The single serialization point between subscriptions and the socket.
//!
//! Subscriptions push [`Outgoing`] items into a bounded channel; the
//! connection's writer task turns each envelope into a [`Frame`]. Feed ids
//! under a compressed prefix go out as zlib-compressed binary frames,
//! everything else as JSON text.

use tokio::sync::mpsc;

use skycast_core::Envelope;
use skycast_sources::encode::zlib;

use crate::error::{io_err, ServerError};

/// Feed-id prefixes delivered as compressed binary frames.
pub const COMPRESSED_PREFIXES: [&str; 3] = ["radar.", "vector.", "obs."];

#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Deliver(Envelope),
    Close { code: u16, reason: String },
}

/// Cloneable sending side of one connection's outbound queue.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Outgoing>,
}

impl Outbox {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Outgoing>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    /// Queue an envelope. Returns `false` once the writer has gone away.
    pub async fn deliver(&self, envelope: Envelope) -> bool {
        self.tx.send(Outgoing::Deliver(envelope)).await.is_ok()
    }

    pub async fn close(&self, code: u16, reason: impl Into<String>) -> bool {
        self.tx
            .send(Outgoing::Close {
                code,
                reason: reason.into(),
            })
            .await
            .is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the writer has dropped its end of the queue.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    pub fn encode(envelope: &Envelope) -> Result<Frame, ServerError> {
        let doc = envelope.to_value();
        let compressed = COMPRESSED_PREFIXES
            .iter()
            .any(|prefix| envelope.handler().has_prefix(prefix));
        if !compressed {
            return Ok(Frame::Text(serde_json::to_string(&doc)?));
        }

        let json = serde_json::to_vec(&doc)?;
        let bytes = zlib(&json).map_err(|e| io_err("zlib frame", e))?;
        Ok(Frame::Binary(bytes))
    }
}
