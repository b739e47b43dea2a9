//! WebSocket connection state and management.
//!
//! ## Connection Lifecycle
//!
//! 1. **Connecting** - Handshake in progress
//! 2. **Open** - Handshake completed, data flows both ways
//! 3. **Closing** - A Close frame has been sent
//! 4. **Closed** - Transport ended
//!
//! [`StateMachine`] implements the protocol without any I/O. With the
//! `async-tokio` feature a driver task runs it over any async stream.

pub mod machine;
pub mod registry;
mod role;
mod state;

#[cfg(feature = "async-tokio")]
pub(crate) mod driver;

pub use machine::{Action, StateMachine};
pub use registry::{ConnectionId, Registry, TransportKey};
pub use role::Role;
pub use state::ConnectionState;
