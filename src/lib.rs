//! # wsline - RFC 6455 WebSocket endpoints
//!
//! `wsline` implements both ends of the WebSocket protocol: the frame codec,
//! the HTTP/1.1 upgrade handshake, and the per-connection state machine
//! (fragment reassembly, control frames, the closing handshake).
//!
//! ## Layers
//!
//! - [`protocol`] - frame encoding/decoding, masking, handshake parsing
//! - [`connection`] - the sans-I/O [`StateMachine`] and the server
//!   [`Registry`]
//! - [`Server`] / [`Client`] - tokio façades publishing events through
//!   `mpsc` receivers (feature `async-tokio`, on by default)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wsline::{Config, Server, ServerEvent};
//!
//! let server = Server::new(Config::default());
//! let mut events = server.subscribe();
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! tokio::spawn({
//!     let server = server.clone();
//!     async move { server.serve(listener).await }
//! });
//!
//! while let Some(event) = events.recv().await {
//!     if let ServerEvent::Message { connection_id, message, .. } = event {
//!         server.send(&connection_id, message)?;
//!     }
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod protocol;

#[cfg(feature = "async-tokio")]
mod client;
#[cfg(feature = "async-tokio")]
pub mod event;
#[cfg(feature = "async-tokio")]
mod server;

pub use config::{Config, Limits};
pub use connection::{
    Action, ConnectionId, ConnectionState, Registry, Role, StateMachine, TransportKey,
};
pub use error::{Error, Result};
pub use message::{CloseCode, CloseFrame, Message};
pub use protocol::{
    ClientHandshake, Frame, HandshakeRequest, HandshakeResponse, OpCode, WS_GUID, WsUrl,
    compute_accept_key,
};

#[cfg(feature = "async-tokio")]
pub use client::Client;
#[cfg(feature = "async-tokio")]
pub use event::{ClientEvent, ServerEvent};
#[cfg(feature = "async-tokio")]
pub use server::Server;
