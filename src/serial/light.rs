//! Single-value light sensor commands and threshold calibration.
//!
//! Same device as the stream.  Besides streaming it answers:
//!
//! | send            | reply                 |
//! |-----------------|-----------------------|
//! | `'C'`           | `218` (handshake)     |
//! | `'V'`           | `u32` LE reading      |
//! | `'T'` + 2×`u16` | nothing (thresholds)  |

use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::frame::Protocol;
use super::port::{HardwarePort, read_frame};
use crate::config::SerialSettings;
use crate::error::SerialError;

/// Byte the device answers the `'C'` handshake with.
pub const HANDSHAKE_REPLY: u8 = 218;

/// Threshold command byte.
const SET_THRESHOLDS: u8 = b'T';

/// Dark threshold offset applied when the black screen is far from white.
const DARK_OFFSET: f64 = 40.0;

/// Minimum usable gap between the two thresholds.
const MIN_THRESHOLD_GAP: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub light: u16,
    pub dark: u16,
}

/// Summary of repeated readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhotonStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation.
    pub std: f64,
    pub sem: f64,
    pub n: usize,
}

impl PhotonStats {
    /// `None` for an empty slice.
    pub fn from_values(values: &[u32]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len();
        let count = n as f64;
        let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / count;
        let variance = values
            .iter()
            .map(|&v| (f64::from(v) - mean).powi(2))
            .sum::<f64>()
            / count;
        let std = variance.sqrt();
        Some(Self {
            mean,
            min: f64::from(values.iter().copied().min().unwrap_or_default()),
            max: f64::from(values.iter().copied().max().unwrap_or_default()),
            std,
            sem: std / count.sqrt(),
            n,
        })
    }
}

/// Pick thresholds from white-screen and black-screen statistics.
///
/// Returns `None` when the two screens are too close to separate.
pub fn recommend_thresholds(white: &PhotonStats, black: &PhotonStats) -> Option<Thresholds> {
    let light = white.max;
    let gap = black.min - light;
    let dark = if gap > DARK_OFFSET {
        light + DARK_OFFSET
    } else {
        (light + gap / 3.0).round()
    };

    if dark - light < MIN_THRESHOLD_GAP {
        warn!(
            "Light thresholds too close (light {:.0}, dark {:.0}); check sensor placement",
            light, dark
        );
        return None;
    }
    if light < 0.0 || dark > f64::from(u16::MAX) {
        warn!("Light thresholds out of range (light {:.0}, dark {:.0})", light, dark);
        return None;
    }
    Some(Thresholds {
        light: light as u16,
        dark: dark as u16,
    })
}

pub struct LightSensor<P> {
    port: P,
    timeout: Duration,
}

impl<P: HardwarePort> LightSensor<P> {
    pub fn new(port: P, settings: &SerialSettings) -> Self {
        Self {
            port,
            timeout: settings.read_timeout(),
        }
    }

    /// Confirm the device is the expected one.
    pub fn handshake(&mut self) -> Result<(), SerialError> {
        self.port.discard_input()?;
        self.port.write_all(&[Protocol::Handshake.command()])?;
        let frame = read_frame(&mut self.port, Protocol::Handshake, self.timeout)?;
        match frame.as_bytes() {
            [HANDSHAKE_REPLY] => Ok(()),
            [other, ..] => Err(SerialError::Handshake(*other)),
            [] => Err(SerialError::Timeout {
                protocol: Protocol::Handshake,
            }),
        }
    }

    /// One reading.
    pub fn read_value(&mut self) -> Result<u32, SerialError> {
        self.port.discard_input()?;
        self.port.write_all(&[Protocol::Light.command()])?;
        let frame = read_frame(&mut self.port, Protocol::Light, self.timeout)?;
        frame.u32_le(0).ok_or(SerialError::Framing {
            protocol: Protocol::Light,
            expected: Protocol::Light.frame_len(),
            got: frame.as_bytes().len(),
        })
    }

    /// `n` consecutive readings summarised.
    pub fn measure(&mut self, n: usize) -> Result<Option<PhotonStats>, SerialError> {
        let mut values = Vec::with_capacity(n);
        for _ in 0..n {
            values.push(self.read_value()?);
        }
        Ok(PhotonStats::from_values(&values))
    }

    /// Handshake, then store `thresholds` on the device.
    pub fn set_thresholds(&mut self, thresholds: Thresholds) -> Result<(), SerialError> {
        self.handshake()?;
        let mut cmd = [0u8; 5];
        cmd[0] = SET_THRESHOLDS;
        cmd[1..3].copy_from_slice(&thresholds.light.to_le_bytes());
        cmd[3..5].copy_from_slice(&thresholds.dark.to_le_bytes());
        self.port.write_all(&cmd)?;
        info!(
            "Light thresholds set: light={} dark={}",
            thresholds.light, thresholds.dark
        );
        Ok(())
    }

    pub fn into_inner(self) -> P {
        self.port
    }
}
