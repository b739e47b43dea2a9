//! WebSocket protocol core implementation (RFC 6455).
//!
//! Everything in this module is pure: no sockets, no tasks, no clocks.

pub mod assembler;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;

pub use assembler::MessageAssembler;
pub use frame::{Frame, FrameHeader, MAX_CONTROL_FRAME_PAYLOAD, MAX_FRAME_PAYLOAD};
pub use handshake::{
    ClientHandshake, HandshakeRequest, HandshakeResponse, Headers, HttpVersion, WS_GUID, WsUrl,
    compute_accept_key, negotiate,
};
pub use mask::{apply_mask, apply_mask_fast, generate_mask};
pub use opcode::OpCode;
