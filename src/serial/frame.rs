//! Fixed-length serial frames.

use heapless::Vec;

use crate::error::SerialError;

/// Largest frame any protocol uses (the 12-byte ambient reply).
pub const MAX_FRAME_LEN: usize = 12;

/// Which exchange a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// One streamed `u32` sample.
    Stream,
    /// Three `f32` ambient values.
    Ambient,
    /// One `u32` light reading answered to `'V'`.
    Light,
    /// One handshake byte answered to `'C'`.
    Handshake,
}

impl Protocol {
    pub const fn frame_len(self) -> usize {
        match self {
            Self::Stream | Self::Light => 4,
            Self::Ambient => 12,
            Self::Handshake => 1,
        }
    }

    /// The command byte that starts the exchange.
    pub const fn command(self) -> u8 {
        match self {
            Self::Stream => b'S',
            Self::Ambient => b'R',
            Self::Light => b'V',
            Self::Handshake => b'C',
        }
    }

    /// `true` for request/response exchanges, where nothing may follow
    /// the reply.
    pub const fn is_reply(self) -> bool {
        !matches!(self, Self::Stream)
    }
}

/// A complete frame whose length matches its protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialFrame {
    protocol: Protocol,
    bytes: Vec<u8, MAX_FRAME_LEN>,
}

impl SerialFrame {
    pub fn new(protocol: Protocol, bytes: &[u8]) -> Result<Self, SerialError> {
        let framing = SerialError::Framing {
            protocol,
            expected: protocol.frame_len(),
            got: bytes.len(),
        };
        if bytes.len() != protocol.frame_len() {
            return Err(framing);
        }
        let bytes = Vec::from_slice(bytes).map_err(|()| framing)?;
        Ok(Self { protocol, bytes })
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn expected_len(&self) -> usize {
        self.protocol.frame_len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Little-endian `u32` starting at byte `offset`.
    pub fn u32_le(&self, offset: usize) -> Option<u32> {
        let chunk = self.bytes.get(offset..offset + 4)?;
        Some(u32::from_le_bytes(chunk.try_into().ok()?))
    }

    /// Little-endian `f32` starting at byte `offset`.
    pub fn f32_le(&self, offset: usize) -> Option<f32> {
        self.u32_le(offset).map(f32::from_bits)
    }
}
