//! Application-facing events and their fan-out.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::connection::ConnectionId;
use crate::message::Message;

/// Event emitted by a [`Server`](crate::Server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Handshake completed; the connection is open and registered.
    Connect {
        connection_id: ConnectionId,
        connection_url: String,
    },
    /// Transport ended; the connection has left the registry.
    Disconnect {
        connection_id: ConnectionId,
        connection_url: String,
    },
    /// A complete message arrived.
    Message {
        connection_id: ConnectionId,
        connection_url: String,
        message: Message,
    },
}

impl ServerEvent {
    /// Connection the event belongs to.
    #[must_use]
    pub fn connection_id(&self) -> &ConnectionId {
        match self {
            ServerEvent::Connect { connection_id, .. }
            | ServerEvent::Disconnect { connection_id, .. }
            | ServerEvent::Message { connection_id, .. } => connection_id,
        }
    }

    /// `ws://host/path` of the connection.
    #[must_use]
    pub fn connection_url(&self) -> &str {
        match self {
            ServerEvent::Connect { connection_url, .. }
            | ServerEvent::Disconnect { connection_url, .. }
            | ServerEvent::Message { connection_url, .. } => connection_url,
        }
    }

    /// Raw message bytes, for `Message` events.
    #[must_use]
    pub fn buffer(&self) -> Option<&[u8]> {
        match self {
            ServerEvent::Message { message, .. } => Some(message.as_bytes()),
            _ => None,
        }
    }
}

/// Event emitted by a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Handshake completed.
    Open,
    /// Transport ended. Always the last event.
    Close,
    /// Connection or handshake failure; a `Close` follows.
    Error(String),
    /// A complete message arrived.
    Message(Message),
}

/// Fan-out of events to any number of subscribers.
///
/// Every live subscriber sees every event, in emission order. A subscriber
/// whose receiver has been dropped is forgotten on the next emit.
#[derive(Debug)]
pub struct Subscribers<E> {
    senders: Mutex<Vec<mpsc::UnboundedSender<E>>>,
}

impl<E> Default for Subscribers<E> {
    fn default() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }
}

impl<E: Clone> Subscribers<E> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber.
    pub fn emit(&self, event: E) {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of registered subscribers, live or not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nobody is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
