//! OS serial device adapter.
//!
//! Implements [`HardwarePort`] over the `serialport` crate.  Reads are
//! bounded: `read_within` keeps reading until the buffer is full or its
//! deadline passes, whichever comes first.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use log::info;
use serialport::{ClearBuffer, SerialPort};

use crate::config::SerialSettings;
use crate::error::PortError;
use crate::serial::HardwarePort;

impl From<serialport::Error> for PortError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::NoDevice => Self::Disconnected,
            serialport::ErrorKind::Io(kind) => Self::Io(kind),
            serialport::ErrorKind::InvalidInput => Self::Io(io::ErrorKind::InvalidInput),
            _ => Self::Io(io::ErrorKind::Other),
        }
    }
}

pub struct SerialDevice {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialDevice {
    /// Open `path` with the configured baud rate and read timeout.
    pub fn open(path: &str, settings: &SerialSettings) -> Result<Self, PortError> {
        let port = serialport::new(path, settings.baud_rate)
            .timeout(settings.read_timeout())
            .open()?;
        info!("Opened {} at {} baud", path, settings.baud_rate);
        Ok(Self {
            port,
            name: path.to_owned(),
        })
    }

    /// Open the port named in `settings`.
    pub fn from_settings(settings: &SerialSettings) -> Result<Self, PortError> {
        let path = settings
            .port
            .as_deref()
            .ok_or(PortError::Io(io::ErrorKind::NotFound))?;
        Self::open(path, settings)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the serial ports the OS reports.
    pub fn available() -> Vec<String> {
        serialport::available_ports()
            .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
            .unwrap_or_default()
    }
}

impl HardwarePort for SerialDevice {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), PortError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_within(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, PortError> {
        let deadline = Instant::now() + timeout;
        let mut filled = 0;
        while filled < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.port.set_timeout(remaining)?;
            match self.port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    fn pending(&mut self) -> Result<usize, PortError> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn discard_input(&mut self) -> Result<(), PortError> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}
