//! Streaming `u32` sample decoder.
//!
//! The device toggles its stream on every `'S'` it receives; there is no
//! separate stop command.  While streaming it sends one 4-byte
//! little-endian sample after another.

use std::time::{Duration, Instant};

use log::{debug, info};

use super::frame::Protocol;
use super::port::{HardwarePort, read_frame};
use super::{SensorSample, SensorValue};
use crate::config::SerialSettings;
use crate::error::SerialError;

/// Default number of samples per batch-index marker.
pub const DEFAULT_BATCH_INTERVAL: u32 = 100;

/// One decoded sample, plus the batch marker when it closes a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamReading {
    pub sample: SensorSample,
    pub batch: Option<SensorSample>,
}

/// Owns the streaming port.  Exactly one decoder reads a given port.
pub struct StreamDecoder<P> {
    port: P,
    streaming: bool,
    /// Samples decoded since the stream was last switched on.
    samples: u32,
    batch_interval: u32,
    timeout: Duration,
    origin: Instant,
}

impl<P: HardwarePort> StreamDecoder<P> {
    pub fn new(port: P, settings: &SerialSettings) -> Self {
        Self {
            port,
            streaming: false,
            samples: 0,
            batch_interval: settings.batch_interval.max(1),
            timeout: settings.read_timeout(),
            origin: Instant::now(),
        }
    }

    /// Send the toggle byte.  Returns whether the device is now streaming.
    pub fn toggle(&mut self) -> Result<bool, SerialError> {
        self.port.write_all(&[Protocol::Stream.command()])?;
        self.streaming = !self.streaming;
        if self.streaming {
            self.samples = 0;
            self.origin = Instant::now();
            info!("Stream started");
        } else {
            self.port.discard_input()?;
            info!("Stream stopped after {} samples", self.samples);
        }
        Ok(self.streaming)
    }

    /// Switch the stream on if it is off.
    pub fn start(&mut self) -> Result<(), SerialError> {
        if !self.streaming {
            self.toggle()?;
        }
        Ok(())
    }

    /// Switch the stream off if it is on.
    pub fn stop(&mut self) -> Result<(), SerialError> {
        if self.streaming {
            self.toggle()?;
        }
        Ok(())
    }

    /// Read and decode the next sample.
    pub fn poll(&mut self) -> Result<StreamReading, SerialError> {
        if !self.streaming {
            return Err(SerialError::NotStreaming);
        }
        let frame = read_frame(&mut self.port, Protocol::Stream, self.timeout)?;
        let value = frame.u32_le(0).ok_or(SerialError::Framing {
            protocol: Protocol::Stream,
            expected: Protocol::Stream.frame_len(),
            got: frame.as_bytes().len(),
        })?;

        let at = self.origin.elapsed();
        self.samples += 1;
        let batch = (self.samples % self.batch_interval == 0).then(|| {
            let index = self.samples / self.batch_interval;
            debug!("Stream batch {} complete", index);
            SensorSample::new(at, SensorValue::BatchIndex(index))
        });

        Ok(StreamReading {
            sample: SensorSample::new(at, SensorValue::Scalar(value)),
            batch,
        })
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Give the port back.  Call [`stop`](Self::stop) first.
    pub fn into_inner(self) -> P {
        self.port
    }
}
