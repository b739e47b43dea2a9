//! WebSocket connection role (client or server).

use crate::error::{Error, Result};

/// WebSocket connection role.
///
/// Determines masking behavior per RFC 6455.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Client role - must mask outgoing frames.
    Client,
    /// Server role - must not mask outgoing frames.
    Server,
}

impl Role {
    /// Check if this role must mask outgoing frames.
    ///
    /// Clients mask every frame they send, including echoed Close and Pong
    /// frames. Servers never mask.
    #[inline]
    #[must_use]
    pub const fn must_mask(&self) -> bool {
        matches!(self, Role::Client)
    }

    /// Check if this role expects incoming frames to be masked.
    ///
    /// Servers expect masked frames from clients.
    #[inline]
    #[must_use]
    pub const fn expects_masked(&self) -> bool {
        matches!(self, Role::Server)
    }

    /// Verify the mask bit of an inbound frame.
    ///
    /// # Errors
    ///
    /// - `Error::UnmaskedClientFrame` when a server receives an unmasked frame
    /// - `Error::MaskedServerFrame` when a client receives a masked frame
    pub const fn check_inbound_mask(&self, masked: bool) -> Result<()> {
        match (self, masked) {
            (Role::Server, false) => Err(Error::UnmaskedClientFrame),
            (Role::Client, true) => Err(Error::MaskedServerFrame),
            _ => Ok(()),
        }
    }

    /// Reason text placed after the status code of a locally initiated Close.
    #[must_use]
    pub const fn close_reason(&self) -> &'static str {
        match self {
            Role::Client => "Connection closed by client.",
            Role::Server => "Connection closed by server.",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client => write!(f, "Client"),
            Role::Server => write!(f, "Server"),
        }
    }
}
