//! Fuzz target: serial frame reads
//!
//! Drives arbitrary byte sequences through the stream, ambient and light
//! decoders and asserts that every read yields either a complete frame or
//! an error, and that errors leave nothing half-consumed.
//!
//! cargo fuzz run fuzz_serial_decoders

#![no_main]

use libfuzzer_sys::fuzz_target;
use trialrig::config::SerialSettings;
use trialrig::error::SerialError;
use trialrig::serial::port::MemoryPort;
use trialrig::serial::{AmbientReading, HardwarePort, StreamDecoder};

fuzz_target!(|data: &[u8]| {
    let settings = SerialSettings::default();

    let mut decoder = StreamDecoder::new(MemoryPort::with_input(data), &settings);
    if decoder.start().is_ok() {
        let mut decoded = 0usize;
        loop {
            match decoder.poll() {
                Ok(reading) => {
                    decoded += 1;
                    if reading.batch.is_some() {
                        assert_eq!(decoded % settings.batch_interval as usize, 0);
                    }
                }
                Err(SerialError::Framing { .. }) => {
                    let mut port = decoder.into_inner();
                    assert_eq!(port.pending(), Ok(0), "framing error must drain input");
                    break;
                }
                Err(_) => break,
            }
        }
        assert_eq!(decoded, data.len() / 4);
    }

    if data.len() == 12 {
        assert!(AmbientReading::from_bytes(data).is_ok());
    } else {
        assert!(AmbientReading::from_bytes(data).is_err());
    }
});
