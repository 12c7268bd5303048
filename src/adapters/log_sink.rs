//! Log-based sink adapters.
//!
//! Implements [`TrialSink`] and [`TelemetrySink`] by writing structured
//! records to the `log` facade.  A live-plot or session-recorder adapter
//! would implement the same traits.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{TelemetrySink, TrialSink};
use crate::serial::{SensorSample, SensorValue};

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTrialSink;

impl LogTrialSink {
    pub fn new() -> Self {
        Self
    }
}

impl TrialSink for LogTrialSink {
    fn emit(&mut self, event: &AppEvent<'_>) {
        match event {
            AppEvent::TrialStarted { trial, state } => {
                info!("START | trial={} | initial_state={}", trial, state);
            }
            AppEvent::StateEntered { at, state, cause } => match cause {
                Some(cause) => info!("STATE | t={:.4}s | {} -> {}", at.as_secs_f64(), cause, state),
                None => info!("STATE | t={:.4}s | {}", at.as_secs_f64(), state),
            },
            AppEvent::EventIgnored { at, state, event } => {
                info!(
                    "EVENT | t={:.4}s | {} ignored in {}",
                    at.as_secs_f64(),
                    event,
                    state
                );
            }
            AppEvent::TrialFinished {
                trial,
                at,
                transitions,
            } => {
                info!(
                    "END   | trial={} | t={:.4}s | transitions={}",
                    trial,
                    at.as_secs_f64(),
                    transitions
                );
            }
            AppEvent::TrialAborted { trial, at, error } => {
                warn!(
                    "ABORT | trial={} | t={:.4}s | {}",
                    trial,
                    at.as_secs_f64(),
                    error
                );
            }
        }
    }
}

/// Adapter that logs every decoded sample.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTelemetrySink;

impl TelemetrySink for LogTelemetrySink {
    fn record(&mut self, sample: &SensorSample) {
        let t = sample.at.as_secs_f64();
        match sample.value {
            SensorValue::Scalar(v) => info!("TELEM | t={:.3}s | value={}", t, v),
            SensorValue::BatchIndex(i) => info!("TELEM | t={:.3}s | batch={}", t, i),
            SensorValue::Ambient(r) => info!(
                "TELEM | t={:.3}s | T={:.2}\u{00b0}C | P={:.2}mb | RH={:.1}%",
                t, r.temperature, r.pressure_mb, r.humidity
            ),
        }
    }
}
