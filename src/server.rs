//! WebSocket server façade.
//!
//! Accepts connections, runs the server side of the handshake, keeps the
//! registry of open connections, and publishes [`ServerEvent`]s.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::connection::driver::{self, Session};
use crate::connection::{ConnectionId, ConnectionState, Registry, Role, TransportKey};
use crate::error::{Error, Result};
use crate::event::{ServerEvent, Subscribers};
use crate::message::{CloseCode, Message};
use crate::protocol::{HandshakeRequest, HandshakeResponse, HttpVersion, negotiate};

#[derive(Debug)]
struct Inner {
    config: Config,
    registry: Registry<Arc<Session>>,
    events: Subscribers<ServerEvent>,
    next_key: AtomicU64,
}

/// A WebSocket server holding any number of concurrent connections.
///
/// Cloning is cheap; clones share the registry and subscribers.
#[derive(Debug, Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

impl Default for Server {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Server {
    /// Create a server with no connections.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                registry: Registry::new(),
                events: Subscribers::new(),
                next_key: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribe to connect, disconnect and message events.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ServerEvent> {
        self.inner.events.subscribe()
    }

    /// Send a message to one connection.
    ///
    /// Strings are sent as text, bytes as binary.
    ///
    /// # Errors
    ///
    /// - `Error::UnknownConnection` if no connection has this id
    /// - `Error::InvalidState` if the connection is not open
    pub fn send(&self, connection_id: &ConnectionId, message: impl Into<Message>) -> Result<()> {
        self.session(connection_id)?.send(message.into())
    }

    /// Send a message to every open connection.
    ///
    /// Connections that are not open are skipped. Returns how many
    /// connections the message was queued for.
    pub fn broadcast(&self, message: impl Into<Message>) -> usize {
        let message = message.into();
        self.inner
            .registry
            .entries()
            .into_iter()
            .filter(|(_, session)| session.send(message.clone()).is_ok())
            .count()
    }

    /// Start the closing handshake on one connection.
    ///
    /// # Errors
    ///
    /// - `Error::UnknownConnection` if no connection has this id
    /// - `Error::InvalidState` if the connection is not open
    /// - `Error::InvalidCloseCode` for a status that may not be sent
    pub fn close(&self, connection_id: &ConnectionId, status: Option<CloseCode>) -> Result<()> {
        self.session(connection_id)?.close(status)?;
        tracing::debug!(%connection_id, ?status, "closing handshake started");
        Ok(())
    }

    /// Ready-state of a registered connection.
    #[must_use]
    pub fn ready_state(&self, connection_id: &ConnectionId) -> Option<ConnectionState> {
        self.inner
            .registry
            .get(connection_id)
            .map(|session| session.state())
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Identifiers of all registered connections.
    #[must_use]
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.inner.registry.ids()
    }

    fn session(&self, connection_id: &ConnectionId) -> Result<Arc<Session>> {
        self.inner
            .registry
            .get(connection_id)
            .ok_or_else(|| Error::UnknownConnection(connection_id.to_string()))
    }

    /// Accept TCP connections forever, one task per connection.
    ///
    /// # Errors
    ///
    /// Returns an error only if the listener's address cannot be read.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!("websocket server listening on {local_addr}");

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let server = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.accept(stream, false).await {
                            tracing::debug!(%peer_addr, "connection ended: {e}");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("accept error: {e}");
                }
            }
        }
    }

    /// Run one connection to completion: handshake, then the session.
    ///
    /// `secure` selects the `wss:` scheme for the connection URL; the stream
    /// itself is used as given.
    ///
    /// # Errors
    ///
    /// Returns the handshake error for rejected upgrades (after the 400 or
    /// 426 response has been written) and `Error::Io` if the transport
    /// fails. Ending the session normally is `Ok(())`.
    pub async fn accept<S>(&self, mut stream: S, secure: bool) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        // One key per accepted stream; keys are never reused.
        let key = TransportKey(self.inner.next_key.fetch_add(1, Ordering::Relaxed));
        let limits = &self.inner.config.limits;

        let request = match driver::read_head(&mut stream, limits).await {
            Ok((head, leftover)) => HandshakeRequest::parse(&head).map(|req| (req, leftover)),
            Err(err @ Error::Io(_)) => return Err(err),
            Err(err) => Err(err),
        };
        let (request, leftover) = match request {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(error = %err, "unreadable upgrade request");
                reject(&mut stream, HandshakeResponse::bad_request(HttpVersion::HTTP_11)).await;
                return Err(err);
            }
        };

        let response = negotiate(&request, self.inner.registry.contains_key(key));
        if !response.is_success() {
            let status = response.status;
            tracing::warn!(status, path = %request.path, "handshake rejected");
            reject(&mut stream, response).await;
            return Err(Error::InvalidHandshake(format!(
                "upgrade rejected with status {status}"
            )));
        }
        driver::write_head(&mut stream, &response).await?;

        let connection_id = ConnectionId::generate()?;
        let connection_url = request.connection_url(secure);
        let (session, outbound) = Session::new(Role::Server, limits.clone());
        let session = Arc::new(session);
        let early = session.open(&leftover)?;

        if !self
            .inner
            .registry
            .insert(connection_id.clone(), key, Arc::clone(&session))
        {
            return Err(Error::InvalidHandshake(format!(
                "connection {connection_id} already registered"
            )));
        }
        tracing::info!(%connection_id, %connection_url, "connection opened");
        self.inner.events.emit(ServerEvent::Connect {
            connection_id: connection_id.clone(),
            connection_url: connection_url.clone(),
        });

        let emit_message = |message: Message| {
            self.inner.events.emit(ServerEvent::Message {
                connection_id: connection_id.clone(),
                connection_url: connection_url.clone(),
                message,
            });
        };
        early.into_iter().for_each(emit_message);

        let result = driver::run(
            stream,
            &session,
            outbound,
            self.inner.config.read_buffer_size,
            emit_message,
        )
        .await;

        session.transport_closed();
        self.inner.registry.remove_by_key(key);
        match &result {
            Ok(()) => tracing::info!(%connection_id, "connection closed"),
            Err(err) => tracing::warn!(%connection_id, error = %err, "connection failed"),
        }
        self.inner.events.emit(ServerEvent::Disconnect {
            connection_id,
            connection_url,
        });
        result
    }
}

async fn reject<S>(stream: &mut S, response: HandshakeResponse)
where
    S: AsyncWrite + Unpin,
{
    if let Err(err) = driver::write_head(stream, &response).await {
        tracing::debug!(error = %err, "could not deliver handshake rejection");
    }
    let _ = stream.shutdown().await;
}
