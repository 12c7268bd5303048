//! Ambient module: temperature, air pressure, relative humidity.
//!
//! One `'R'` request is answered with 12 bytes: three little-endian `f32`
//! values.  The pressure arrives in pascal-like raw units and is divided by
//! 100 to give millibar.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::frame::{Protocol, SerialFrame};
use super::port::{HardwarePort, read_frame};
use super::{SensorSample, SensorValue};
use crate::config::SerialSettings;
use crate::error::SerialError;

/// Raw pressure units per millibar.
const PRESSURE_DIVISOR: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmbientReading {
    #[serde(rename = "Temperature_C")]
    pub temperature: f32,
    #[serde(rename = "AirPressure_mb")]
    pub pressure_mb: f32,
    #[serde(rename = "RelativeHumidity")]
    pub humidity: f32,
}

impl AmbientReading {
    /// Decode the 12-byte reply payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SerialError> {
        decode_ambient(&SerialFrame::new(Protocol::Ambient, bytes)?)
    }
}

/// Decode a complete ambient frame.
pub fn decode_ambient(frame: &SerialFrame) -> Result<AmbientReading, SerialError> {
    let framing = SerialError::Framing {
        protocol: Protocol::Ambient,
        expected: Protocol::Ambient.frame_len(),
        got: frame.as_bytes().len(),
    };
    if frame.protocol() != Protocol::Ambient {
        return Err(framing);
    }
    let field = |offset| frame.f32_le(offset).ok_or(framing);
    Ok(AmbientReading {
        temperature: field(0)?,
        pressure_mb: field(4)? / PRESSURE_DIVISOR,
        humidity: field(8)?,
    })
}

/// Request/response ambient sensor on its own port.
pub struct AmbientSensor<P> {
    port: P,
    timeout: Duration,
    origin: Instant,
}

impl<P: HardwarePort> AmbientSensor<P> {
    pub fn new(port: P, settings: &SerialSettings) -> Self {
        Self {
            port,
            timeout: settings.read_timeout(),
            origin: Instant::now(),
        }
    }

    /// Request one reading.  A short or long reply is an error, never a
    /// partial result.
    pub fn read(&mut self) -> Result<AmbientReading, SerialError> {
        self.port.discard_input()?;
        self.port.write_all(&[Protocol::Ambient.command()])?;
        let frame = read_frame(&mut self.port, Protocol::Ambient, self.timeout)?;
        decode_ambient(&frame)
    }

    /// [`read`](Self::read), stamped with the time since construction.
    pub fn sample(&mut self) -> Result<SensorSample, SerialError> {
        let reading = self.read()?;
        Ok(SensorSample::new(
            self.origin.elapsed(),
            SensorValue::Ambient(reading),
        ))
    }

    pub fn into_inner(self) -> P {
        self.port
    }
}
