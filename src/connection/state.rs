//! WebSocket ready-state as defined in RFC 6455.

/// WebSocket connection ready-state.
///
/// `Connecting -> Open -> Closing -> Closed`, with `Connecting -> Closed`
/// when the handshake fails. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ConnectionState {
    /// Connection is being established (handshake in progress).
    #[default]
    Connecting,
    /// Connection is open and ready for data transfer.
    Open,
    /// A Close frame has been sent; the transport is about to end.
    Closing,
    /// Connection is fully closed.
    Closed,
}

impl ConnectionState {
    /// Check if the connection is in an active state.
    ///
    /// Returns `true` for `Connecting`, `Open`, or `Closing` states.
    #[must_use]
    #[inline]
    pub const fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Closed)
    }

    /// Check if sending data is allowed in this state.
    ///
    /// Returns `true` only for `Open` state.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Check if receiving frames is allowed in this state.
    ///
    /// Returns `true` for `Open` or `Closing` states.
    #[must_use]
    #[inline]
    pub const fn can_receive(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Closing)
    }

    /// Numeric ready-state as exposed by browser WebSocket objects (0-3).
    #[must_use]
    pub const fn as_u8(&self) -> u8 {
        match self {
            ConnectionState::Connecting => 0,
            ConnectionState::Open => 1,
            ConnectionState::Closing => 2,
            ConnectionState::Closed => 3,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::Closing => write!(f, "Closing"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}
