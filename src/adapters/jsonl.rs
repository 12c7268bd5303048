//! JSON-lines telemetry recorder.
//!
//! Appends one JSON object per sample and flushes it straight away:
//!
//! ```text
//! {"t":0.512,"Temperature_C":21.4,"AirPressure_mb":1013.2,"RelativeHumidity":40.1}
//! {"t":1.003,"value":512}
//! {"t":1.003,"batch":1}
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::warn;
use serde_json::{Value, json};

use crate::app::ports::TelemetrySink;
use crate::serial::{SensorSample, SensorValue};

pub struct JsonlSink {
    out: BufWriter<File>,
    written: u64,
    failed: u64,
}

impl JsonlSink {
    /// Open `path` for appending, creating it if needed.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: BufWriter::new(file),
            written: 0,
            failed: 0,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    fn line(sample: &SensorSample) -> Value {
        let t = sample.at.as_secs_f64();
        match sample.value {
            SensorValue::Scalar(v) => json!({ "t": t, "value": v }),
            SensorValue::BatchIndex(i) => json!({ "t": t, "batch": i }),
            SensorValue::Ambient(reading) => {
                let mut value = serde_json::to_value(reading).unwrap_or(Value::Null);
                if let Value::Object(map) = &mut value {
                    map.insert("t".into(), json!(t));
                }
                value
            }
        }
    }
}

impl TelemetrySink for JsonlSink {
    fn record(&mut self, sample: &SensorSample) {
        let line = Self::line(sample);
        match writeln!(self.out, "{line}").and_then(|()| self.out.flush()) {
            Ok(()) => self.written += 1,
            Err(e) => {
                self.failed += 1;
                warn!("Telemetry write failed: {}", e);
            }
        }
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        if let Err(e) = self.out.flush() {
            warn!("Telemetry flush failed: {}", e);
        }
    }
}
