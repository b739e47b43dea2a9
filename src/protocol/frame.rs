//! WebSocket frame decoding and encoding (RFC 6455).
//!
//! The codec is pure: [`Frame::decode`] reads from a borrowed byte slice and
//! reports how many bytes it consumed, [`Frame::encode`] produces the wire
//! bytes for a frame. Neither performs I/O.
//!
//! Decoding distinguishes two failure kinds. [`Error::IncompleteFrame`] means
//! the slice ends before the frame does; the input is untouched and the caller
//! retries once more bytes have arrived. [`Error::InvalidFrame`] means the
//! bytes can never form a valid frame.
//!
//! Payload lengths are capped at `u32::MAX` bytes. A 64-bit length field whose
//! high 32 bits are set is rejected as an invalid encoding even though
//! RFC 6455 allows it.

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::{apply_mask_fast, generate_mask};

/// Maximum payload size for control frames (RFC 6455).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Largest payload a single frame may carry (4 GiB - 1).
pub const MAX_FRAME_PAYLOAD: u64 = u32::MAX as u64;

/// Decoded frame header, available before the payload has arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment flag.
    pub fin: bool,
    /// Reserved bit 1.
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Masking key, if the frame is masked.
    pub mask: Option<[u8; 4]>,
    /// Payload length announced by the header.
    pub payload_len: usize,
    /// Header length in bytes, including extended length and mask key.
    pub header_len: usize,
}

impl FrameHeader {
    /// Parse a frame header from the start of `buf`.
    ///
    /// # Errors
    ///
    /// - `Error::IncompleteFrame` if `buf` ends inside the header
    /// - `Error::InvalidFrame` for a non-minimal or over-long length field
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 2 {
            return Err(Error::IncompleteFrame {
                needed: 2 - buf.len(),
            });
        }

        let byte0 = buf[0];
        let byte1 = buf[1];

        let fin = (byte0 & 0x80) != 0;
        let rsv1 = (byte0 & 0x40) != 0;
        let rsv2 = (byte0 & 0x20) != 0;
        let rsv3 = (byte0 & 0x10) != 0;
        let opcode = OpCode::from_u8(byte0);

        let masked = (byte1 & 0x80) != 0;
        let base_len = byte1 & 0x7F;

        let (payload_len, len_size): (u64, usize) = match base_len {
            0..=125 => (u64::from(base_len), 2),
            126 => {
                if buf.len() < 4 {
                    return Err(Error::IncompleteFrame {
                        needed: 4 - buf.len(),
                    });
                }
                let len = u16::from_be_bytes([buf[2], buf[3]]);
                if len <= 125 {
                    return Err(Error::InvalidFrame(format!(
                        "non-minimal 16-bit length {len}"
                    )));
                }
                (u64::from(len), 4)
            }
            _ => {
                if buf.len() < 10 {
                    return Err(Error::IncompleteFrame {
                        needed: 10 - buf.len(),
                    });
                }
                let high = u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]);
                if high != 0 {
                    return Err(Error::InvalidFrame(
                        "64-bit length exceeds 4 GiB ceiling".into(),
                    ));
                }
                let low = u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]);
                if low <= 65535 {
                    return Err(Error::InvalidFrame(format!(
                        "non-minimal 64-bit length {low}"
                    )));
                }
                (u64::from(low), 10)
            }
        };

        let payload_len = usize::try_from(payload_len).map_err(|_| Error::FrameTooLarge {
            size: payload_len,
            max: usize::MAX as u64,
        })?;

        let header_len = if masked { len_size + 4 } else { len_size };
        if buf.len() < header_len {
            return Err(Error::IncompleteFrame {
                needed: header_len - buf.len(),
            });
        }

        let mask = masked.then(|| {
            [
                buf[len_size],
                buf[len_size + 1],
                buf[len_size + 2],
                buf[len_size + 3],
            ]
        });

        Ok(FrameHeader {
            fin,
            rsv1,
            rsv2,
            rsv3,
            opcode,
            mask,
            payload_len,
            header_len,
        })
    }
}

/// Pick the length field for a payload: `(7-bit value, extended bytes)`.
fn length_field(payload_len: u64) -> Result<(u8, usize)> {
    match payload_len {
        0..=125 => Ok((payload_len as u8, 0)),
        126..=65535 => Ok((126, 2)),
        _ if payload_len <= MAX_FRAME_PAYLOAD => Ok((127, 8)),
        _ => Err(Error::FrameTooLarge {
            size: payload_len,
            max: MAX_FRAME_PAYLOAD,
        }),
    }
}

/// A WebSocket frame as defined in RFC 6455.
///
/// ## Frame Structure
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
/// |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
/// |N|V|V|V|       |S|             |   (if payload len==126/127)   |
/// | |1|2|3|       |K|             |                               |
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |                     Masking key (if present)                  |
/// +---------------------------------------------------------------+
/// |                          Payload data                         |
/// +---------------------------------------------------------------+
/// ```
///
/// A decoded frame holds its payload already unmasked; `masked` records
/// whether it arrived masked. When encoding, `masked` requests a fresh
/// random masking key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag. True if this is the last fragment of a message.
    pub fin: bool,
    /// Reserved bit 1. Must be 0, no extensions are supported.
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    /// Frame opcode defining the interpretation of payload data.
    pub opcode: OpCode,
    /// Whether the frame is (or will be) masked on the wire.
    pub masked: bool,
    payload: Bytes,
}

impl Frame {
    /// Create a new unmasked frame with the given parameters.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            masked: false,
            payload: payload.into(),
        }
    }

    /// Create a text frame.
    #[must_use]
    pub fn text(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Text, data)
    }

    /// Create a binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Binary, data)
    }

    /// Create a close frame with optional status code and reason.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let payload = if let Some(code) = code {
            let mut data = code.to_be_bytes().to_vec();
            data.extend_from_slice(reason.as_bytes());
            data
        } else {
            Vec::new()
        };
        Self::new(true, OpCode::Close, payload)
    }

    /// Create a ping frame.
    #[must_use]
    pub fn ping(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Ping, data)
    }

    /// Create a pong frame.
    #[must_use]
    pub fn pong(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Pong, data)
    }

    /// Set whether the frame is masked when encoded.
    #[must_use]
    pub fn with_masked(mut self, masked: bool) -> Self {
        self.masked = masked;
        self
    }

    /// Get the payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Check whether any reserved bit is set.
    #[inline]
    #[must_use]
    pub const fn has_reserved_bits(&self) -> bool {
        self.rsv1 || self.rsv2 || self.rsv3
    }

    /// Decode one frame from the start of `buf`.
    ///
    /// Returns the frame and the number of bytes consumed. `buf` is never
    /// modified, so after `Error::IncompleteFrame` the same bytes can be
    /// offered again with more appended.
    ///
    /// ## Errors
    ///
    /// - `Error::IncompleteFrame` if not enough data is available
    /// - `Error::InvalidFrame` for a malformed length field
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let header = FrameHeader::parse(buf)?;

        let total_size = header.header_len.checked_add(header.payload_len).ok_or(
            Error::FrameTooLarge {
                size: header.payload_len as u64,
                max: MAX_FRAME_PAYLOAD,
            },
        )?;

        if buf.len() < total_size {
            return Err(Error::IncompleteFrame {
                needed: total_size - buf.len(),
            });
        }

        let mut payload = BytesMut::from(&buf[header.header_len..total_size]);
        if let Some(mask) = header.mask {
            apply_mask_fast(&mut payload, mask);
        }

        let frame = Frame {
            fin: header.fin,
            rsv1: header.rsv1,
            rsv2: header.rsv2,
            rsv3: header.rsv3,
            opcode: header.opcode,
            masked: header.mask.is_some(),
            payload: payload.freeze(),
        };

        Ok((frame, total_size))
    }

    /// Encode the frame, masking it with a fresh random key if `masked` is set.
    ///
    /// # Errors
    ///
    /// - `Error::FrameTooLarge` if the payload exceeds [`MAX_FRAME_PAYLOAD`]
    /// - `Error::Random` if no masking key could be generated
    pub fn encode(&self) -> Result<Bytes> {
        let mask = if self.masked {
            Some(generate_mask()?)
        } else {
            None
        };
        self.encode_with_mask(mask)
    }

    /// Encode the frame with an explicit masking key (or none).
    ///
    /// # Errors
    ///
    /// Returns `Error::FrameTooLarge` if the payload exceeds [`MAX_FRAME_PAYLOAD`].
    pub fn encode_with_mask(&self, mask: Option<[u8; 4]>) -> Result<Bytes> {
        length_field(self.payload.len() as u64)?;
        let mut buf = vec![0u8; self.wire_size(mask.is_some())];
        let written = self.write(&mut buf, mask)?;
        buf.truncate(written);
        Ok(Bytes::from(buf))
    }

    /// Validate the frame-local rules of RFC 6455.
    ///
    /// # Errors
    ///
    /// - `Error::ReservedBitsSet` if RSV bits are set
    /// - `Error::FragmentedControlFrame` if control frame has FIN=0
    /// - `Error::ControlFrameTooLarge` if control frame payload > 125 bytes
    pub fn validate(&self) -> Result<()> {
        if self.has_reserved_bits() {
            return Err(Error::ReservedBitsSet);
        }

        if self.opcode.is_control() {
            if !self.fin {
                return Err(Error::FragmentedControlFrame);
            }

            if self.payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(self.payload.len()));
            }
        }

        Ok(())
    }

    /// Write the frame to a buffer.
    ///
    /// Returns the number of bytes written. The mask bit is set exactly when
    /// `mask` is provided.
    ///
    /// # Errors
    ///
    /// - `Error::FrameTooLarge` if the payload exceeds [`MAX_FRAME_PAYLOAD`]
    /// - `Error::InvalidFrame` if the buffer is too small
    pub fn write(&self, buf: &mut [u8], mask: Option<[u8; 4]>) -> Result<usize> {
        let payload_len = self.payload.len();
        let (len_bits, extended_len_size) = length_field(payload_len as u64)?;

        let mask_size = if mask.is_some() { 4 } else { 0 };
        let header_size = 2 + extended_len_size + mask_size;
        let total_size = header_size + payload_len;

        if buf.len() < total_size {
            return Err(Error::InvalidFrame(format!(
                "Buffer too small: need {} bytes, have {}",
                total_size,
                buf.len()
            )));
        }

        let mut byte0 = self.opcode.as_u8();
        if self.fin {
            byte0 |= 0x80;
        }
        if self.rsv1 {
            byte0 |= 0x40;
        }
        if self.rsv2 {
            byte0 |= 0x20;
        }
        if self.rsv3 {
            byte0 |= 0x10;
        }
        buf[0] = byte0;

        let mut byte1 = len_bits;
        if mask.is_some() {
            byte1 |= 0x80;
        }
        buf[1] = byte1;

        let mut offset = 2;
        match extended_len_size {
            2 => {
                buf[offset..offset + 2].copy_from_slice(&(payload_len as u16).to_be_bytes());
                offset += 2;
            }
            8 => {
                buf[offset..offset + 8].copy_from_slice(&(payload_len as u64).to_be_bytes());
                offset += 8;
            }
            _ => {}
        }

        if let Some(mask_key) = mask {
            buf[offset..offset + 4].copy_from_slice(&mask_key);
            offset += 4;
        }

        buf[offset..offset + payload_len].copy_from_slice(&self.payload);

        if let Some(mask_key) = mask {
            apply_mask_fast(&mut buf[offset..offset + payload_len], mask_key);
        }

        Ok(total_size)
    }

    /// Calculate the size needed to write this frame.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let payload_len = self.payload.len();
        let extended_len_size = if payload_len <= 125 {
            0
        } else if payload_len <= 65535 {
            2
        } else {
            8
        };
        let mask_size = if masked { 4 } else { 0 };
        2 + extended_len_size + mask_size + payload_len
    }
}
