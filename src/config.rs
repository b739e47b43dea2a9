//! Configuration and limits for WebSocket connections.

/// Resource limits for a single connection.
///
/// These limits bound the memory a peer can make a connection hold. A frame
/// whose header announces more than `max_frame_size` is refused before its
/// payload is buffered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum payload size of a single frame in bytes.
    ///
    /// Default: 16 MB (16 * 1024 * 1024)
    pub max_frame_size: usize,

    /// Maximum size of a complete message in bytes.
    ///
    /// This applies to the total size after reassembling all fragments.
    ///
    /// Default: 64 MB (64 * 1024 * 1024)
    pub max_message_size: usize,

    /// Maximum number of fragments in a single message.
    ///
    /// Default: 1024
    pub max_fragment_count: usize,

    /// Maximum size of the handshake head in bytes.
    ///
    /// Default: 8 KB (8192)
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,   // 16 MB
            max_message_size: 64 * 1024 * 1024, // 64 MB
            max_fragment_count: 1024,
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(
        max_frame_size: usize,
        max_message_size: usize,
        max_fragment_count: usize,
        max_handshake_size: usize,
    ) -> Self {
        Self {
            max_frame_size,
            max_message_size,
            max_fragment_count,
            max_handshake_size,
        }
    }

    /// Create limits suitable for small embedded systems.
    ///
    /// - Max frame: 64 KB
    /// - Max message: 256 KB
    /// - Max fragments: 16
    /// - Max handshake: 4 KB
    #[must_use]
    pub const fn embedded() -> Self {
        Self {
            max_frame_size: 64 * 1024,
            max_message_size: 256 * 1024,
            max_fragment_count: 16,
            max_handshake_size: 4096,
        }
    }

    /// Limits that only stop at what the wire format can express.
    ///
    /// Warning: Use only in trusted environments.
    ///
    /// Frames and messages are capped at 4 GiB - 1 (or `usize::MAX` on
    /// 32-bit targets).
    #[must_use]
    pub const fn unrestricted() -> Self {
        let ceiling = if usize::BITS > 32 {
            u32::MAX as usize
        } else {
            usize::MAX
        };
        Self {
            max_frame_size: ceiling,
            max_message_size: ceiling,
            max_fragment_count: usize::MAX,
            max_handshake_size: 64 * 1024,
        }
    }

    /// Validate that message size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`](crate::Error::MessageTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_message_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_message_size {
            Err(crate::Error::MessageTooLarge {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that a frame payload size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`](crate::Error::FrameTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_frame_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_frame_size {
            Err(crate::Error::FrameTooLarge {
                size: size as u64,
                max: self.max_frame_size as u64,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that fragment count is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyFragments`](crate::Error::TooManyFragments) if `count` exceeds the configured maximum.
    pub const fn check_fragment_count(&self, count: usize) -> Result<(), crate::Error> {
        if count > self.max_fragment_count {
            Err(crate::Error::TooManyFragments {
                count,
                max: self.max_fragment_count,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that handshake size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`](crate::Error::HandshakeTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_handshake_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_handshake_size {
            Err(crate::Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            })
        } else {
            Ok(())
        }
    }
}

/// WebSocket connection configuration, shared by client and server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Resource limits.
    pub limits: Limits,

    /// Size of each transport read (in bytes).
    ///
    /// Default: 8 KB (8192)
    pub read_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            read_buffer_size: 8192,
        }
    }
}

impl Config {
    /// Create a new configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set read buffer size. Zero is raised to one byte.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = if size == 0 { 1 } else { size };
        self
    }
}
