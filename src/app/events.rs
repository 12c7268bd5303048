//! Outbound trial events.
//!
//! The [`TrialRunner`](super::service::TrialRunner) emits these through the
//! [`TrialSink`](super::ports::TrialSink) port as the trial progresses.
//! Adapters on the other side decide what to do with them: log them, feed
//! a live plot, forward them to a session recorder.

use std::time::Duration;

use crate::error::RunError;
use crate::events::TrialEvent;

/// Structured events emitted by the trial engine.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent<'a> {
    /// The trial started in `state`.
    TrialStarted { trial: u32, state: &'a str },

    /// A state was entered.  `cause` is `None` for the initial state.
    StateEntered {
        at: Duration,
        state: &'a str,
        cause: Option<TrialEvent>,
    },

    /// The current state had no transition for `event`.
    EventIgnored {
        at: Duration,
        state: &'a str,
        event: TrialEvent,
    },

    /// The trial reached `exit`.
    TrialFinished {
        trial: u32,
        at: Duration,
        transitions: usize,
    },

    /// The trial stopped early.
    TrialAborted {
        trial: u32,
        at: Duration,
        error: RunError,
    },
}
