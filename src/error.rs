//! Error types for the WebSocket protocol implementation.
//!
//! Every failure the crate can report lives in one enum. The variants fall
//! into a few families that callers treat differently:
//!
//! - [`Error::IncompleteFrame`] is not a failure of the stream, only a signal
//!   that more bytes are needed before a frame can be decoded.
//! - [`Error::InvalidFrame`] is a malformed encoding; the stream can no longer
//!   be trusted and the connection is aborted.
//! - Protocol violations (reserved bits, masking direction, opcode ordering,
//!   control frame rules) abort the connection, some after a best-effort
//!   close frame (see [`Error::close_code`]).
//! - [`Error::InvalidState`] and [`Error::UnknownConnection`] are usage
//!   errors reported to the caller without touching the connection.

use crate::connection::ConnectionState;
use crate::message::CloseCode;
use thiserror::Error;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during WebSocket operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Incomplete frame data.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed before decoding can progress.
        needed: usize,
    },

    /// Invalid frame encoding (non-minimal length, oversized 64-bit length).
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Frame size exceeds the encodable ceiling or the configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size.
        size: u64,
        /// Maximum allowed size.
        max: u64,
    },

    /// Message size exceeds configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Too many fragments in a single message.
    #[error("Too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Actual fragment count.
        count: usize,
        /// Maximum allowed fragments.
        max: usize,
    },

    /// Reserved bits set without extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Unmasked client frame.
    #[error("Client frame must be masked")]
    UnmaskedClientFrame,

    /// Masked server frame.
    #[error("Server frame must not be masked")]
    MaskedServerFrame,

    /// Continuation frame arrived with no message in progress.
    #[error("Unexpected continuation frame")]
    UnexpectedContinuation,

    /// New data frame arrived while a fragmented message is in progress.
    #[error("Expected continuation frame")]
    ExpectedContinuation,

    /// Control frame fragmented.
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Invalid UTF-8 in text message.
    #[error("Invalid UTF-8 in text message")]
    InvalidUtf8,

    /// Operation is not allowed in the connection's current state.
    #[error("Invalid state: expected Open, connection is {0}")]
    InvalidState(ConnectionState),

    /// No registered connection has this identifier.
    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    /// Invalid close code.
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// Invalid WebSocket handshake.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Handshake head exceeds configured maximum.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Actual handshake size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Header value contains characters that would break the HTTP head.
    #[error("Invalid header value for {header}: {reason}")]
    InvalidHeaderValue {
        /// Header name.
        header: String,
        /// Why the value was refused.
        reason: String,
    },

    /// Malformed or unsupported WebSocket URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Random source unavailable.
    #[error("Random source failure: {0}")]
    Random(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Whether this error only means "wait for more bytes".
    #[must_use]
    pub const fn is_incomplete(&self) -> bool {
        matches!(self, Error::IncompleteFrame { .. })
    }

    /// Close status to send before aborting, if the peer should get one.
    ///
    /// Returns `None` for errors after which the byte stream is no longer
    /// trustworthy (invalid encoding, reserved bits, masking direction,
    /// continuation ordering); those connections are aborted silently.
    #[must_use]
    pub const fn close_code(&self) -> Option<CloseCode> {
        match self {
            Error::FragmentedControlFrame
            | Error::ControlFrameTooLarge(_)
            | Error::ReservedOpcode(_) => Some(CloseCode::ProtocolError),
            Error::InvalidUtf8 => Some(CloseCode::InvalidPayload),
            Error::FrameTooLarge { .. }
            | Error::MessageTooLarge { .. }
            | Error::TooManyFragments { .. } => Some(CloseCode::MessageTooBig),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

impl From<getrandom::Error> for Error {
    fn from(err: getrandom::Error) -> Self {
        Error::Random(err.to_string())
    }
}
