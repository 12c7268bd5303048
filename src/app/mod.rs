//! Application core: trial orchestration, zero I/O.
//!
//! The [`TrialRunner`](service::TrialRunner) drives a compiled state
//! machine through one trial.  All interaction with hardware happens
//! through **port traits** defined in [`ports`], keeping this layer fully
//! testable with simulated sources and mock outputs.

pub mod context;
pub mod events;
pub mod ports;
pub mod service;

pub use context::TrialContext;
pub use events::AppEvent;
pub use ports::{EventSource, OutputPort, TelemetrySink, TimerDelegate, TrialSink, Wait};
pub use service::TrialRunner;
