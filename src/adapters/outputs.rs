//! Logging output adapter.
//!
//! Implements [`OutputPort`] without hardware: every write is logged and the
//! last value per channel is kept.  Used for dry runs and simulated trials.

use std::collections::BTreeMap;

use log::info;

use crate::app::ports::OutputPort;
use crate::error::OutputError;
use crate::fsm::OutputChannel;

#[derive(Debug, Default)]
pub struct LoggingOutputs {
    levels: BTreeMap<OutputChannel, u8>,
    writes: usize,
}

impl LoggingOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value written to `channel`.
    pub fn level(&self, channel: OutputChannel) -> Option<u8> {
        self.levels.get(&channel).copied()
    }

    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl OutputPort for LoggingOutputs {
    fn set(&mut self, channel: OutputChannel, value: u8) -> Result<(), OutputError> {
        info!("OUT | {} = {}", channel, value);
        self.levels.insert(channel, value);
        self.writes += 1;
        Ok(())
    }
}
