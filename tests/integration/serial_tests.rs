//! Integration tests for the serial decoders against a mock device.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::mock_hw::MockPort;

use trialrig::adapters::jsonl::JsonlSink;
use trialrig::adapters::stream_task::StreamWorker;
use trialrig::app::ports::TelemetrySink;
use trialrig::config::SerialSettings;
use trialrig::error::SerialError;
use trialrig::serial::{
    AmbientSensor, LightSensor, PhotonStats, Protocol, SensorSample, SensorValue, StreamDecoder,
    Thresholds, recommend_thresholds,
};

fn ambient_reply(t: f32, p: f32, h: f32) -> Vec<u8> {
    [t, p, h].iter().flat_map(|v| v.to_le_bytes()).collect()
}

// ═══════════════════════════════════════════════════════════════
// Ambient module
// ═══════════════════════════════════════════════════════════════

#[test]
fn ambient_request_decodes_millibar() {
    let port = MockPort::new().reply(b'R', &ambient_reply(22.5, 101_325.0, 45.0));
    let mut sensor = AmbientSensor::new(port, &SerialSettings::default());

    let reading = sensor.read().unwrap();
    assert_eq!(reading.temperature, 22.5);
    assert_eq!(reading.pressure_mb, 1013.25);
    assert_eq!(reading.humidity, 45.0);

    let sample = sensor.sample().unwrap();
    assert!(matches!(sample.value, SensorValue::Ambient(r) if r == reading));
    assert_eq!(sensor.into_inner().written, b"RR");
}

#[test]
fn silent_ambient_module_times_out() {
    let mut sensor = AmbientSensor::new(MockPort::new(), &SerialSettings::default());
    assert_eq!(
        sensor.read(),
        Err(SerialError::Timeout {
            protocol: Protocol::Ambient
        })
    );
}

#[test]
fn short_ambient_reply_is_a_framing_error() {
    let port = MockPort::new().reply(b'R', &[0; 8]);
    let mut sensor = AmbientSensor::new(port, &SerialSettings::default());
    assert!(matches!(
        sensor.read(),
        Err(SerialError::Framing { expected: 12, got: 8, .. })
    ));
}

// ═══════════════════════════════════════════════════════════════
// Light sensor calibration
// ═══════════════════════════════════════════════════════════════

#[test]
fn calibration_flow_programs_thresholds() {
    let port = MockPort::new()
        .reply(b'C', &[218])
        .reply(b'V', &400u32.to_le_bytes());
    let mut sensor = LightSensor::new(port, &SerialSettings::default());

    sensor.handshake().unwrap();
    let stats = sensor.measure(10).unwrap().unwrap();
    assert_eq!(stats.n, 10);
    assert_eq!(stats.mean, 400.0);
    assert_eq!(stats.std, 0.0);

    sensor
        .set_thresholds(Thresholds {
            light: 0x0190,
            dark: 0x03e8,
        })
        .unwrap();

    let written = sensor.into_inner().written;
    assert_eq!(written[0], b'C');
    assert_eq!(&written[1..11], b"VVVVVVVVVV");
    assert_eq!(&written[11..], &[b'C', b'T', 0x90, 0x01, 0xe8, 0x03]);
}

#[test]
fn wrong_handshake_byte_is_rejected() {
    let port = MockPort::new().reply(b'C', &[17]);
    let mut sensor = LightSensor::new(port, &SerialSettings::default());
    assert_eq!(sensor.handshake(), Err(SerialError::Handshake(17)));
}

#[test]
fn thresholds_from_measured_screens() {
    let white = PhotonStats::from_values(&[100, 110, 120]).unwrap();
    let black = PhotonStats::from_values(&[900, 950, 1000]).unwrap();
    let thresholds = recommend_thresholds(&white, &black).unwrap();
    assert_eq!(thresholds.light, 120);
    assert!(thresholds.dark > thresholds.light);
    assert!(f64::from(thresholds.dark) < black.min);
}

// ═══════════════════════════════════════════════════════════════
// Streaming to disk
// ═══════════════════════════════════════════════════════════════

/// Counts records on their way to the file.
struct Counted {
    inner: JsonlSink,
    seen: Arc<AtomicUsize>,
}

impl TelemetrySink for Counted {
    fn record(&mut self, sample: &SensorSample) {
        self.inner.record(sample);
        self.seen.fetch_add(1, Ordering::Release);
    }
}

#[test]
fn streamed_samples_land_in_jsonl_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stream.jsonl");

    let mut port = MockPort::new();
    let bytes: Vec<u8> = (0..200u32).flat_map(u32::to_le_bytes).collect();
    port.feed(&bytes);
    let decoder = StreamDecoder::new(port, &SerialSettings::default());
    let seen = Arc::new(AtomicUsize::new(0));
    let sink = Counted {
        inner: JsonlSink::create(&path).unwrap(),
        seen: Arc::clone(&seen),
    };
    let worker = StreamWorker::spawn(decoder, sink).unwrap();

    // 200 samples + 2 batch markers.
    let expected = 202;
    let started = std::time::Instant::now();
    while seen.load(Ordering::Acquire) < expected && started.elapsed() < Duration::from_secs(5) {
        std::thread::sleep(Duration::from_millis(5));
    }
    // Stopping drops the sink, which flushes the file.
    let port = worker.stop().unwrap();
    assert_eq!(port.written, b"SS");

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), expected);
    assert_eq!(lines[0]["value"], 0);
    assert_eq!(lines[100]["batch"], 1);
    assert_eq!(lines[201]["batch"], 2);
}
