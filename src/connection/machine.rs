//! Per-connection protocol state machine.
//!
//! [`StateMachine`] never touches a socket. The transport driver hands it
//! every chunk of bytes that arrives and carries out the [`Action`]s it
//! returns, in order. Outbound frames produced by [`StateMachine::send`] and
//! [`StateMachine::close`] are returned as encoded bytes for the same write
//! queue.

use bytes::{Buf, Bytes, BytesMut};

use crate::config::Limits;
use crate::connection::{ConnectionState, Role};
use crate::error::{Error, Result};
use crate::message::{CloseCode, Message};
use crate::protocol::{Frame, FrameHeader, MessageAssembler, OpCode};

/// Side effect requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write these bytes to the transport, after everything queued before.
    Write(Bytes),
    /// End the write side of the transport once queued writes have flushed.
    Shutdown,
    /// Destroy the transport without a closing handshake.
    Abort(Error),
    /// Hand a complete message to the application.
    Deliver(Message),
}

/// Sans-I/O WebSocket connection state.
#[derive(Debug)]
pub struct StateMachine {
    role: Role,
    state: ConnectionState,
    limits: Limits,
    buffer: BytesMut,
    assembler: MessageAssembler,
    close_received: bool,
}

impl StateMachine {
    /// Create a machine in the `Connecting` state.
    #[must_use]
    pub fn new(role: Role, limits: Limits) -> Self {
        Self {
            role,
            state: ConnectionState::Connecting,
            assembler: MessageAssembler::new(limits.clone()),
            limits,
            buffer: BytesMut::new(),
            close_received: false,
        }
    }

    /// Current ready-state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Local role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Bytes received but not yet decoded into a frame.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Complete the handshake: `Connecting -> Open`.
    ///
    /// Bytes received while connecting are decoded now.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` unless the machine is connecting.
    pub fn open(&mut self) -> Result<Vec<Action>> {
        if self.state != ConnectionState::Connecting {
            return Err(Error::InvalidState(self.state));
        }
        self.state = ConnectionState::Open;
        let mut actions = Vec::new();
        self.drain(&mut actions);
        Ok(actions)
    }

    /// Feed newly arrived transport bytes.
    ///
    /// The bytes are appended to the unconsumed remainder and frames are
    /// decoded until more data is needed. Nothing is processed after the
    /// connection is closed or the peer's Close has been seen.
    pub fn receive(&mut self, chunk: &[u8]) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.state == ConnectionState::Closed || self.close_received {
            return actions;
        }
        self.buffer.extend_from_slice(chunk);
        if self.state.can_receive() {
            self.drain(&mut actions);
        }
        actions
    }

    /// Encode a data message for sending.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidState` unless the connection is open
    /// - `Error::FrameTooLarge` if the payload exceeds the 4 GiB ceiling
    /// - `Error::Random` if no masking key could be generated (client)
    pub fn send(&mut self, message: Message) -> Result<Bytes> {
        if !self.state.can_send() {
            return Err(Error::InvalidState(self.state));
        }
        Frame::new(true, message.opcode(), message.into_bytes())
            .with_masked(self.role.must_mask())
            .encode()
    }

    /// Start the closing handshake: `Open -> Closing`.
    ///
    /// With a status the Close payload is the 2-byte code followed by the
    /// role's reason text; without one the payload is empty.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidState` unless the connection is open
    /// - `Error::InvalidCloseCode` for codes that may not be sent
    pub fn close(&mut self, status: Option<CloseCode>) -> Result<Bytes> {
        if !self.state.can_send() {
            return Err(Error::InvalidState(self.state));
        }
        if let Some(code) = status {
            if !code.is_valid() {
                return Err(Error::InvalidCloseCode(code.as_u16()));
            }
        }
        let bytes = Frame::close(status.map(|code| code.as_u16()), self.role.close_reason())
            .with_masked(self.role.must_mask())
            .encode()?;
        self.state = ConnectionState::Closing;
        tracing::debug!(role = %self.role, ?status, "close frame queued");
        Ok(bytes)
    }

    /// The transport has ended: `* -> Closed`, all buffers dropped.
    ///
    /// Returns the state the connection was in before.
    pub fn transport_closed(&mut self) -> ConnectionState {
        let previous = self.state;
        self.state = ConnectionState::Closed;
        self.buffer = BytesMut::new();
        self.assembler.reset();
        previous
    }

    fn drain(&mut self, actions: &mut Vec<Action>) {
        while self.state.can_receive() && !self.close_received {
            match self.next_frame() {
                Ok(Some(frame)) => {
                    if let Err(err) = self.on_frame(frame, actions) {
                        self.fail(err, actions);
                    }
                }
                Ok(None) => break,
                Err(err) => self.fail(err, actions),
            }
        }
        if self.close_received {
            self.buffer.clear();
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let header = match FrameHeader::parse(&self.buffer) {
            Ok(header) => header,
            Err(err) if err.is_incomplete() => return Ok(None),
            Err(err) => return Err(err),
        };
        self.limits.check_frame_size(header.payload_len)?;

        match Frame::decode(&self.buffer) {
            Ok((frame, consumed)) => {
                self.buffer.advance(consumed);
                Ok(Some(frame))
            }
            Err(err) if err.is_incomplete() => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn on_frame(&mut self, frame: Frame, actions: &mut Vec<Action>) -> Result<()> {
        if frame.has_reserved_bits() {
            return Err(Error::ReservedBitsSet);
        }
        self.role.check_inbound_mask(frame.masked)?;
        if frame.opcode.is_reserved() {
            return Err(Error::ReservedOpcode(frame.opcode.as_u8()));
        }

        if frame.opcode.is_data() {
            if let Some(message) = self.assembler.push(frame)? {
                actions.push(Action::Deliver(message));
            }
            return Ok(());
        }

        frame.validate()?;
        match frame.opcode {
            OpCode::Close => {
                self.close_received = true;
                if self.state == ConnectionState::Closing {
                    tracing::debug!(role = %self.role, "close echo received");
                } else {
                    let echo = Frame::new(true, OpCode::Close, frame.into_payload())
                        .with_masked(self.role.must_mask())
                        .encode()?;
                    actions.push(Action::Write(echo));
                    self.state = ConnectionState::Closing;
                    tracing::debug!(role = %self.role, "peer initiated close, echoing");
                }
                actions.push(Action::Shutdown);
            }
            OpCode::Ping => {
                let pong = Frame::pong(frame.into_payload())
                    .with_masked(self.role.must_mask())
                    .encode()?;
                actions.push(Action::Write(pong));
            }
            _ => {}
        }
        Ok(())
    }

    fn fail(&mut self, err: Error, actions: &mut Vec<Action>) {
        tracing::warn!(role = %self.role, error = %err, "aborting connection");
        if let Some(code) = err.close_code() {
            if self.state == ConnectionState::Open && !self.close_received {
                let notice = Frame::close(Some(code.as_u16()), "")
                    .with_masked(self.role.must_mask())
                    .encode();
                if let Ok(bytes) = notice {
                    actions.push(Action::Write(bytes));
                }
            }
        }
        actions.push(Action::Abort(err));
        self.transport_closed();
    }
}
