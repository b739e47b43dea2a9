//! Test clients: the `wsline` client, and a raw TCP peer for wire-level
//! checks.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use wsline::{Client, ClientEvent, CloseCode, Config, Error, Message, Result};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A `wsline` client plus its event stream.
pub struct TestClient {
    client: Client,
    events: mpsc::UnboundedReceiver<ClientEvent>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with_id(addr, 0).await
    }

    pub async fn connect_with_id(addr: SocketAddr, id: usize) -> Result<Self> {
        let client = Client::new(&format!("ws://{addr}/client/{id}"), Config::default())?;
        let mut events = client.subscribe();
        client.connect().await?;
        match next_event(&mut events).await {
            Some(ClientEvent::Open) => Ok(Self { client, events }),
            other => Err(Error::InvalidHandshake(format!("expected open, got {other:?}"))),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.client.send(text)
    }

    pub async fn send_binary(&mut self, data: &[u8]) -> Result<()> {
        self.client.send(data)
    }

    /// Next message, or `None` once the connection has closed.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        loop {
            match next_event(&mut self.events).await {
                Some(ClientEvent::Message(message)) => return Ok(Some(message)),
                Some(ClientEvent::Error(reason)) => return Err(Error::Io(reason)),
                Some(ClientEvent::Open) => continue,
                Some(ClientEvent::Close) | None => return Ok(None),
            }
        }
    }

    pub async fn recv_text(&mut self) -> Result<Option<String>> {
        Ok(self.recv().await?.and_then(Message::into_text))
    }

    /// Run the closing handshake and wait for the transport to end.
    pub async fn close(mut self) -> Result<()> {
        self.client.close(Some(CloseCode::Normal))?;
        while let Some(event) = next_event(&mut self.events).await {
            if event == ClientEvent::Close {
                return Ok(());
            }
        }
        Err(Error::Io("connection did not close".into()))
    }
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<ClientEvent>) -> Option<ClientEvent> {
    timeout(EVENT_TIMEOUT, events.recv()).await.ok().flatten()
}

/// A bare TCP peer that speaks the handshake by hand.
pub struct RawClient {
    pub stream: TcpStream,
}

impl RawClient {
    /// Send an upgrade request with the given `Sec-WebSocket-Version` and
    /// return the response head as text.
    pub async fn upgrade(addr: SocketAddr, version: &str) -> (Self, String) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET /raw HTTP/1.1\r\n\
             Host: {addr}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
             Sec-WebSocket-Version: {version}\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut head = Vec::new();
        while !head.ends_with(b"\r\n\r\n") {
            let mut byte = [0u8; 1];
            let n = timeout(EVENT_TIMEOUT, stream.read(&mut byte))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(n, 1, "connection closed inside response head");
            head.push(byte[0]);
        }
        (Self { stream }, String::from_utf8(head).unwrap())
    }

    pub async fn write(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    pub async fn read_exact(&mut self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        timeout(EVENT_TIMEOUT, self.stream.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        buf
    }

    /// Read until the server ends the stream, returning everything received.
    pub async fn read_to_end(&mut self) -> Vec<u8> {
        let mut buf = Vec::new();
        timeout(EVENT_TIMEOUT, self.stream.read_to_end(&mut buf))
            .await
            .unwrap()
            .unwrap();
        buf
    }
}
