//! Mock rig adapters for integration tests.
//!
//! Records every output write, soft code and runner event so tests can
//! assert on the full history without a rig attached.

use std::collections::VecDeque;
use std::time::Duration;

use trialrig::app::events::AppEvent;
use trialrig::app::ports::{OutputPort, TrialSink};
use trialrig::error::{OutputError, PortError};
use trialrig::fsm::OutputChannel;
use trialrig::serial::HardwarePort;
use trialrig::softcode::SoftCodeDispatch;

// ── Output lines ──────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockOutputs {
    pub calls: Vec<(OutputChannel, u8)>,
    pub fail_on: Option<OutputChannel>,
}

#[allow(dead_code)]
impl MockOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(channel: OutputChannel) -> Self {
        Self {
            calls: Vec::new(),
            fail_on: Some(channel),
        }
    }

    /// Last value written to `channel`.
    pub fn level(&self, channel: OutputChannel) -> Option<u8> {
        self.calls
            .iter()
            .rev()
            .find(|(c, _)| *c == channel)
            .map(|(_, v)| *v)
    }
}

impl OutputPort for MockOutputs {
    fn set(&mut self, channel: OutputChannel, value: u8) -> Result<(), OutputError> {
        if self.fail_on == Some(channel) {
            return Err(OutputError::new(channel, "line stuck"));
        }
        self.calls.push((channel, value));
        Ok(())
    }
}

// ── Soft codes ────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    pub codes: Vec<u8>,
}

impl SoftCodeDispatch for RecordingDispatcher {
    fn dispatch(&mut self, code: u8) {
        self.codes.push(code);
    }
}

// ── Runner events ─────────────────────────────────────────────

/// Owned copy of an [`AppEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Started(String),
    Entered(String),
    Ignored(String),
    Finished(usize),
    Aborted(String),
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<Recorded>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn entered(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Recorded::Entered(s) => Some(s.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl TrialSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent<'_>) {
        let recorded = match event {
            AppEvent::TrialStarted { state, .. } => Recorded::Started((*state).to_owned()),
            AppEvent::StateEntered { state, .. } => Recorded::Entered((*state).to_owned()),
            AppEvent::EventIgnored { event, .. } => Recorded::Ignored(event.to_string()),
            AppEvent::TrialFinished { transitions, .. } => Recorded::Finished(*transitions),
            AppEvent::TrialAborted { error, .. } => Recorded::Aborted(error.to_string()),
        };
        self.events.push(recorded);
    }
}

// ── Serial device ─────────────────────────────────────────────

/// A serial device that answers command bytes with canned replies.
#[derive(Debug, Default)]
pub struct MockPort {
    replies: Vec<(u8, Vec<u8>)>,
    input: VecDeque<u8>,
    pub written: Vec<u8>,
}

#[allow(dead_code)]
impl MockPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `bytes` every time `command` is written.
    #[must_use]
    pub fn reply(mut self, command: u8, bytes: &[u8]) -> Self {
        self.replies.push((command, bytes.to_vec()));
        self
    }

    /// Bytes the device sends unprompted.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.input.extend(bytes);
    }
}

impl HardwarePort for MockPort {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), PortError> {
        self.written.extend_from_slice(bytes);
        if let Some(&command) = bytes.first() {
            if let Some((_, reply)) = self.replies.iter().find(|(c, _)| *c == command) {
                self.input.extend(reply.iter().copied());
            }
        }
        Ok(())
    }

    fn read_within(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, PortError> {
        let n = buf.len().min(self.input.len());
        for (slot, byte) in buf.iter_mut().zip(self.input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn pending(&mut self) -> Result<usize, PortError> {
        Ok(self.input.len())
    }

    fn discard_input(&mut self) -> Result<(), PortError> {
        self.input.clear();
        Ok(())
    }
}
