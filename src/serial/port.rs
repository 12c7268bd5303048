//! Hardware port abstraction.
//!
//! A [`HardwarePort`] is a byte-oriented serial link with bounded reads.
//! Decoders take their port by value, so each port has exactly one
//! reader.

use std::time::Duration;

use log::warn;

use super::frame::{MAX_FRAME_LEN, Protocol, SerialFrame};
use crate::error::{PortError, SerialError};

/// Byte-oriented serial link.
pub trait HardwarePort {
    /// Write all of `bytes` and flush.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), PortError>;

    /// Read until `buf` is full or `timeout` elapses.  Returns the number of
    /// bytes read, which is less than `buf.len()` only on timeout.
    fn read_within(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, PortError>;

    /// Bytes already waiting in the input buffer.
    fn pending(&mut self) -> Result<usize, PortError>;

    /// Drop everything in the input buffer.
    fn discard_input(&mut self) -> Result<(), PortError>;
}

impl<T: HardwarePort + ?Sized> HardwarePort for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), PortError> {
        (**self).write_all(bytes)
    }

    fn read_within(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, PortError> {
        (**self).read_within(buf, timeout)
    }

    fn pending(&mut self) -> Result<usize, PortError> {
        (**self).pending()
    }

    fn discard_input(&mut self) -> Result<(), PortError> {
        (**self).discard_input()
    }
}

/// Read one complete `protocol` frame.
///
/// * nothing before `timeout` → [`SerialError::Timeout`]
/// * a partial frame, or (for replies) extra bytes behind it →
///   [`SerialError::Framing`]; the input buffer is discarded first
pub fn read_frame<P: HardwarePort + ?Sized>(
    port: &mut P,
    protocol: Protocol,
    timeout: Duration,
) -> Result<SerialFrame, SerialError> {
    let expected = protocol.frame_len();
    let mut buf = [0u8; MAX_FRAME_LEN];
    let got = port.read_within(&mut buf[..expected], timeout)?;

    if got == 0 {
        return Err(SerialError::Timeout { protocol });
    }

    let extra = if got == expected && protocol.is_reply() {
        port.pending()?
    } else {
        0
    };
    if got < expected || extra > 0 {
        warn!(
            "{:?}: framing error, expected {} bytes, got {}; discarding input",
            protocol,
            expected,
            got + extra
        );
        port.discard_input()?;
        return Err(SerialError::Framing {
            protocol,
            expected,
            got: got + extra,
        });
    }

    SerialFrame::new(protocol, &buf[..got])
}

/// An in-memory port: reads drain a byte buffer, writes are recorded.
/// Reads never wait; an empty buffer behaves like a timeout.
#[derive(Debug, Default, Clone)]
pub struct MemoryPort {
    input: std::collections::VecDeque<u8>,
    written: Vec<u8>,
}

impl MemoryPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(bytes: &[u8]) -> Self {
        let mut port = Self::new();
        port.feed(bytes);
        port
    }

    /// Append bytes for later reads.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.input.extend(bytes);
    }

    /// Everything written so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }
}

impl HardwarePort for MemoryPort {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), PortError> {
        self.written.extend_from_slice(bytes);
        Ok(())
    }

    fn read_within(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, PortError> {
        let n = buf.len().min(self.input.len());
        for (slot, byte) in buf.iter_mut().zip(self.input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn pending(&mut self) -> Result<usize, PortError> {
        Ok(self.input.len())
    }

    fn discard_input(&mut self) -> Result<(), PortError> {
        self.input.clear();
        Ok(())
    }
}
