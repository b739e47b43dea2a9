//! WebSocket client façade.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::config::{Config, Limits};
use crate::connection::driver::{self, Outbound, Session};
use crate::connection::{ConnectionState, Role};
use crate::error::{Error, Result};
use crate::event::{ClientEvent, Subscribers};
use crate::message::{CloseCode, Message};
use crate::protocol::{ClientHandshake, HandshakeResponse, WsUrl};

#[derive(Debug)]
struct Inner {
    url: WsUrl,
    config: Config,
    events: Subscribers<ClientEvent>,
    session: Mutex<Option<Arc<Session>>>,
}

/// One outgoing WebSocket connection.
///
/// A client connects once. Until then its ready-state is `Connecting`;
/// `send` and `close` fail with `Error::InvalidState`.
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Create a client for `url` without connecting.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` unless `url` is a `ws://` or `wss://` URL.
    pub fn new(url: &str, config: Config) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(Inner {
                url: WsUrl::parse(url)?,
                config,
                events: Subscribers::new(),
                session: Mutex::new(None),
            }),
        })
    }

    /// The parsed target URL.
    #[must_use]
    pub fn url(&self) -> &WsUrl {
        &self.inner.url
    }

    /// Subscribe to open, close, error and message events.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn ready_state(&self) -> ConnectionState {
        self.session()
            .map_or(ConnectionState::Connecting, |session| session.state())
    }

    /// Send a text or binary message.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` unless the connection is open.
    pub fn send(&self, message: impl Into<Message>) -> Result<()> {
        self.open_session()?.send(message.into())
    }

    /// Start the closing handshake.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` unless the connection is open, and
    /// `Error::InvalidCloseCode` for a status that may not be sent.
    pub fn close(&self, status: Option<CloseCode>) -> Result<()> {
        self.open_session()?.close(status)?;
        tracing::debug!(url = %self.inner.url.authority, ?status, "closing handshake started");
        Ok(())
    }

    /// Dial the URL over plain TCP and perform the handshake.
    ///
    /// Returns once the connection is open; a background task then runs it
    /// until the transport ends. On failure an `Error` event and a `Close`
    /// event are emitted and the ready-state becomes `Closed`.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidUrl` for `wss:` URLs; use
    ///   [`connect_with_stream`](Self::connect_with_stream) with a TLS stream
    /// - `Error::InvalidState` if this client already connected
    /// - `Error::Io` if the TCP connection fails
    /// - `Error::InvalidHandshake` if the server does not accept the upgrade
    pub async fn connect(&self) -> Result<()> {
        let url = &self.inner.url;
        if url.secure {
            return Err(Error::InvalidUrl(format!(
                "wss://{} needs a TLS stream passed to connect_with_stream",
                url.authority
            )));
        }

        let (session, outbound) = self.begin()?;
        let stream = match TcpStream::connect((url.host.as_str(), url.port)).await {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail(&session, e.into())),
        };
        self.establish(stream, session, outbound).await
    }

    /// Perform the handshake over an already established stream.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect), except that the scheme is not
    /// checked.
    pub async fn connect_with_stream<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (session, outbound) = self.begin()?;
        self.establish(stream, session, outbound).await
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<Session>>> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self) -> Option<Arc<Session>> {
        self.slot().clone()
    }

    fn open_session(&self) -> Result<Arc<Session>> {
        self.session()
            .ok_or(Error::InvalidState(ConnectionState::Connecting))
    }

    fn begin(&self) -> Result<(Arc<Session>, mpsc::UnboundedReceiver<Outbound>)> {
        let mut slot = self.slot();
        if let Some(existing) = slot.as_ref() {
            return Err(Error::InvalidState(existing.state()));
        }
        let (session, outbound) = Session::new(Role::Client, self.inner.config.limits.clone());
        let session = Arc::new(session);
        *slot = Some(Arc::clone(&session));
        Ok((session, outbound))
    }

    async fn establish<S>(
        &self,
        mut stream: S,
        session: Arc<Session>,
        outbound: mpsc::UnboundedReceiver<Outbound>,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let url = &self.inner.url;
        let early = match handshake(&mut stream, url, &self.inner.config.limits).await {
            Ok(leftover) => session.open(&leftover),
            Err(err) => Err(err),
        };
        let early = match early {
            Ok(early) => early,
            Err(err) => return Err(self.fail(&session, err)),
        };

        tracing::info!(host = %url.authority, resource = %url.resource, "handshake completed");
        self.inner.events.emit(ClientEvent::Open);
        for message in early {
            self.inner.events.emit(ClientEvent::Message(message));
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = driver::run(
                stream,
                &session,
                outbound,
                inner.config.read_buffer_size,
                |message| inner.events.emit(ClientEvent::Message(message)),
            )
            .await;

            session.transport_closed();
            match result {
                Ok(()) => tracing::info!(host = %inner.url.authority, "connection closed"),
                Err(err) => {
                    tracing::warn!(host = %inner.url.authority, error = %err, "connection failed");
                    inner.events.emit(ClientEvent::Error(err.to_string()));
                }
            }
            inner.events.emit(ClientEvent::Close);
        });
        Ok(())
    }

    fn fail(&self, session: &Session, err: Error) -> Error {
        session.transport_closed();
        tracing::warn!(host = %self.inner.url.authority, error = %err, "connection attempt failed");
        self.inner.events.emit(ClientEvent::Error(err.to_string()));
        self.inner.events.emit(ClientEvent::Close);
        err
    }
}

/// Write the upgrade request, read and verify the response.
///
/// Returns the bytes that followed the response head.
async fn handshake<S>(stream: &mut S, url: &WsUrl, limits: &Limits) -> Result<Bytes>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handshake = ClientHandshake::new()?;
    let mut request = Vec::with_capacity(256);
    handshake.write_request(url, &mut request)?;
    stream.write_all(&request).await?;
    stream.flush().await?;

    let (head, leftover) = driver::read_head(stream, limits).await?;
    let response = HandshakeResponse::parse(&head)?;
    handshake.verify(&response)?;
    Ok(leftover)
}
