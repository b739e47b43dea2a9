//! Message fragmentation and reassembly for WebSocket (RFC 6455).

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::{Frame, OpCode};

/// Reassembles fragmented WebSocket messages.
///
/// Data frames are pushed in arrival order. Control frames are not the
/// assembler's concern and pass through without touching the buffer.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    fragment_count: usize,
    opcode: Option<OpCode>,
    limits: Limits,
}

impl MessageAssembler {
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            fragment_count: 0,
            opcode: None,
            limits,
        }
    }

    /// Add a data frame to the message being assembled.
    ///
    /// Returns `Some(message)` once a frame with FIN=1 completes it.
    ///
    /// # Errors
    ///
    /// - `Error::UnexpectedContinuation` for a continuation with nothing in progress
    /// - `Error::ExpectedContinuation` for a new text/binary frame mid-message
    /// - `Error::TooManyFragments` / `Error::MessageTooLarge` on limit breaches
    /// - `Error::InvalidUtf8` if a completed text message is not UTF-8
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>> {
        if frame.opcode.is_control() {
            return Ok(None);
        }

        match frame.opcode {
            OpCode::Continuation => {
                if self.opcode.is_none() {
                    return Err(Error::UnexpectedContinuation);
                }
            }
            OpCode::Text | OpCode::Binary => {
                if self.opcode.is_some() {
                    return Err(Error::ExpectedContinuation);
                }
            }
            other => return Err(Error::ReservedOpcode(other.as_u8())),
        }

        self.limits
            .check_fragment_count(self.fragment_count + 1)?;

        let new_size = self.buffer.len() + frame.payload().len();
        self.limits.check_message_size(new_size)?;

        if frame.opcode != OpCode::Continuation {
            self.opcode = Some(frame.opcode);
        }
        self.buffer.extend_from_slice(frame.payload());
        self.fragment_count += 1;

        if !frame.fin {
            return Ok(None);
        }

        let payload = self.buffer.split().freeze();
        let opcode = self.opcode.take();
        self.fragment_count = 0;

        match opcode {
            Some(OpCode::Text) => String::from_utf8(payload.to_vec())
                .map(|text| Some(Message::Text(text)))
                .map_err(|_| Error::InvalidUtf8),
            _ => Ok(Some(Message::Binary(payload))),
        }
    }

    /// Whether a fragmented message is in progress.
    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }

    /// Number of payload bytes buffered so far.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial message.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.fragment_count = 0;
        self.opcode = None;
    }
}
