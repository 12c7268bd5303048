//! Serial telemetry decoders.
//!
//! Two binary protocols share the same framing primitives:
//!
//! ```text
//!   Streaming        host ──'S'──▶ device   (toggle on / off)
//!                    host ◀─[u32 LE]─── device   every sample
//!
//!   Request/response host ──'R'──▶ device
//!                    host ◀─[f32 LE ×3]─ device   temperature, pressure, humidity
//! ```
//!
//! Every frame is read through [`port::read_frame`], which either yields a
//! complete frame of the expected length or an error; misaligned bytes are
//! discarded and never interpreted.

pub mod ambient;
pub mod frame;
pub mod light;
pub mod port;
pub mod stream;

use std::time::Duration;

pub use ambient::{AmbientReading, AmbientSensor, decode_ambient};
pub use frame::{MAX_FRAME_LEN, Protocol, SerialFrame};
pub use light::{LightSensor, PhotonStats, Thresholds, recommend_thresholds};
pub use port::{HardwarePort, read_frame};
pub use stream::{StreamDecoder, StreamReading};

/// A decoded reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorValue {
    /// One streamed sample.
    Scalar(u32),
    /// Named environmental values.
    Ambient(AmbientReading),
    /// Marker emitted after every batch of streamed samples (1, 2, ...).
    BatchIndex(u32),
}

/// A reading with the time it was decoded, relative to its decoder's start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub at: Duration,
    pub value: SensorValue,
}

impl SensorSample {
    pub const fn new(at: Duration, value: SensorValue) -> Self {
        Self { at, value }
    }
}
