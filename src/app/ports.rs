//! Port traits: the hexagonal boundary between the trial engine and the rig.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ TrialRunner (domain)
//! ```
//!
//! Driven adapters (output lines, event sources, sinks) implement these
//! traits.  The [`TrialRunner`](super::service::TrialRunner) consumes them
//! via generics, so the engine never touches hardware directly.

use std::time::Duration;

use crate::error::OutputError;
use crate::events::{TimerEdge, TrialEvent};
use crate::fsm::OutputChannel;
use crate::serial::SensorSample;

// ───────────────────────────────────────────────────────────────
// Output port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port: drives valves, BNC/wire lines, PWM and module bytes.
///
/// Only hardware channels reach this port; timer and soft-code actions
/// are handled by the runner.
pub trait OutputPort {
    fn set(&mut self, channel: OutputChannel, value: u8) -> Result<(), OutputError>;
}

// ───────────────────────────────────────────────────────────────
// Event source (driven adapter: hardware / simulation → domain)
// ───────────────────────────────────────────────────────────────

/// Outcome of waiting on an [`EventSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// An external event and its trial-relative timestamp.
    Event(TrialEvent, Duration),
    /// The deadline passed with nothing received.
    Deadline,
    /// The trial was aborted from outside.
    Aborted,
    /// No further events will ever arrive.
    Closed,
}

/// Supplies the trial clock and external events.
///
/// Live sources block on real time; simulated sources jump their virtual
/// clock straight to the next scripted event or deadline.
pub trait EventSource {
    /// Reset the clock to zero at the start of a trial.
    fn start(&mut self);

    /// Time since [`start`](Self::start).
    fn now(&self) -> Duration;

    /// Block until the next external event, or until `deadline` (trial
    /// time) passes.  `None` waits without a deadline.
    fn wait(&mut self, deadline: Option<Duration>) -> Wait;

    /// An event or abort that has already arrived, without blocking.
    ///
    /// The runner checks this before taking an internal event, so an
    /// external event stamped earlier is not overtaken while the loop runs
    /// behind the clock.  `None` means nothing is ready.
    fn try_next(&mut self) -> Option<Wait> {
        None
    }
}

// ───────────────────────────────────────────────────────────────
// Trial sink port (driven adapter: domain → logging / live plots)
// ───────────────────────────────────────────────────────────────

/// The runner emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.
pub trait TrialSink {
    fn emit(&mut self, event: &super::events::AppEvent<'_>);
}

// ───────────────────────────────────────────────────────────────
// Telemetry sink port (driven adapter: decoders → persistence)
// ───────────────────────────────────────────────────────────────

/// Receives decoded sensor samples.
pub trait TelemetrySink {
    fn record(&mut self, sample: &SensorSample);
}

impl<T: TelemetrySink + ?Sized> TelemetrySink for Box<T> {
    fn record(&mut self, sample: &SensorSample) {
        (**self).record(sample);
    }
}

// ───────────────────────────────────────────────────────────────
// Timer delegate (decouples the timer bank from the event stream)
// ───────────────────────────────────────────────────────────────

/// Callback the [`GlobalTimers`](crate::timers::GlobalTimers) bank invokes
/// for every due edge.
///
/// The runner takes one edge per call and turns it into a
/// [`TrialEvent::GlobalTimer`]; the bank itself knows nothing about
/// events or states.
pub trait TimerDelegate {
    /// * `id`: the timer that fired.
    /// * `edge`: `Start` or `End`.
    /// * `at`: the trial time the edge was due.
    fn on_timer_edge(&mut self, id: u8, edge: TimerEdge, at: Duration);
}
