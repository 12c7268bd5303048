//! Unified error types for the rig.
//!
//! Each subsystem has its own error enum; every one converts into the
//! top-level [`Error`] so that the binary can funnel failures through a
//! single type.  Run-time errors are `Copy` so the runner can hand them to
//! the trial sink and still return them.

use core::fmt;
use std::io;

use crate::events::TrialEvent;
use crate::fsm::OutputChannel;
use crate::serial::Protocol;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible rig operation funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A state machine description was rejected.
    Build(BuildError),
    /// A trial aborted while running.
    Run(RunError),
    /// A serial telemetry exchange failed.
    Serial(SerialError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build(e) => write!(f, "build: {e}"),
            Self::Run(e) => write!(f, "run: {e}"),
            Self::Serial(e) => write!(f, "serial: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Build errors
// ---------------------------------------------------------------------------

/// Structural problems found while validating a description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// The description has no states.
    Empty,
    /// Two states share a name.
    DuplicateState(String),
    /// A state uses the reserved name `exit`.
    ReservedStateName(String),
    /// A transition points at a state that does not exist.
    UndefinedTarget {
        state: String,
        event: TrialEvent,
        target: String,
    },
    /// The initial state is not defined.
    UnknownInitialState(String),
    /// Two global timers share an id.
    DuplicateGlobalTimer(u8),
    /// Global timer ids must be in `1..=16`.
    GlobalTimerOutOfRange(u8),
    /// An output action or transition references an undeclared timer.
    UndefinedGlobalTimer { state: String, id: u8 },
    /// A global timer links to a state that does not exist.
    UndefinedLinkedState { timer: u8, state: String },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "state machine has no states"),
            Self::DuplicateState(name) => write!(f, "state '{name}' is defined twice"),
            Self::ReservedStateName(name) => {
                write!(f, "'{name}' is reserved for the end of the trial")
            }
            Self::UndefinedTarget {
                state,
                event,
                target,
            } => write!(
                f,
                "state '{state}' transitions on {event} to undefined state '{target}'"
            ),
            Self::UnknownInitialState(name) => {
                write!(f, "initial state '{name}' is not defined")
            }
            Self::DuplicateGlobalTimer(id) => write!(f, "global timer {id} is defined twice"),
            Self::GlobalTimerOutOfRange(id) => {
                write!(f, "global timer id {id} is outside 1..=16")
            }
            Self::UndefinedGlobalTimer { state, id } => {
                write!(f, "state '{state}' references undefined global timer {id}")
            }
            Self::UndefinedLinkedState { timer, state } => {
                write!(f, "global timer {timer} links to undefined state '{state}'")
            }
        }
    }
}

impl std::error::Error for BuildError {}

impl From<BuildError> for Error {
    fn from(e: BuildError) -> Self {
        Self::Build(e)
    }
}

// ---------------------------------------------------------------------------
// Global timer errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// No timer with this id was configured.
    Unknown(u8),
    /// The timer is already armed.
    Conflict(u8),
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(id) => write!(f, "unknown global timer {id}"),
            Self::Conflict(id) => write!(f, "global timer {id} is already armed"),
        }
    }
}

impl std::error::Error for TimerError {}

// ---------------------------------------------------------------------------
// Output errors
// ---------------------------------------------------------------------------

/// A hardware output line could not be driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputError {
    pub channel: OutputChannel,
    pub reason: &'static str,
}

impl OutputError {
    pub const fn new(channel: OutputChannel, reason: &'static str) -> Self {
        Self { channel, reason }
    }

    /// The output layer has no line mapped to `channel`.
    pub const fn unmapped(channel: OutputChannel) -> Self {
        Self::new(channel, "no line mapped")
    }
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.channel, self.reason)
    }
}

impl std::error::Error for OutputError {}

// ---------------------------------------------------------------------------
// Run errors
// ---------------------------------------------------------------------------

/// Reasons a trial stops before reaching `exit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunError {
    /// An external global timer event named an id the machine never declared.
    UnknownGlobalTimer(u8),
    /// A state tried to arm a timer that was still running.
    GlobalTimerConflict(u8),
    /// An output action failed on the hardware.
    Output(OutputError),
    /// The event source closed while the runner was waiting.
    SourceClosed,
    /// The trial was aborted from outside.
    Aborted,
    /// The transition limit was reached before `exit`.
    TransitionLimit(usize),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownGlobalTimer(id) => write!(f, "event for unknown global timer {id}"),
            Self::GlobalTimerConflict(id) => {
                write!(f, "global timer {id} armed while already running")
            }
            Self::Output(e) => write!(f, "output failed: {e}"),
            Self::SourceClosed => write!(f, "event source closed"),
            Self::Aborted => write!(f, "trial aborted"),
            Self::TransitionLimit(n) => write!(f, "transition limit of {n} reached"),
        }
    }
}

impl std::error::Error for RunError {}

impl From<TimerError> for RunError {
    fn from(e: TimerError) -> Self {
        match e {
            TimerError::Unknown(id) => Self::UnknownGlobalTimer(id),
            TimerError::Conflict(id) => Self::GlobalTimerConflict(id),
        }
    }
}

impl From<OutputError> for RunError {
    fn from(e: OutputError) -> Self {
        Self::Output(e)
    }
}

impl From<RunError> for Error {
    fn from(e: RunError) -> Self {
        Self::Run(e)
    }
}

// ---------------------------------------------------------------------------
// Hardware port errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortError {
    /// The device went away.
    Disconnected,
    /// Underlying I/O failure.
    Io(io::ErrorKind),
}

impl fmt::Display for PortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "device disconnected"),
            Self::Io(kind) => write!(f, "I/O error: {kind}"),
        }
    }
}

impl std::error::Error for PortError {}

impl From<io::Error> for PortError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe => Self::Disconnected,
            kind => Self::Io(kind),
        }
    }
}

// ---------------------------------------------------------------------------
// Serial telemetry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialError {
    /// Nothing arrived before the read timeout.
    Timeout { protocol: Protocol },
    /// The frame length did not match the protocol; input was discarded.
    Framing {
        protocol: Protocol,
        expected: usize,
        got: usize,
    },
    /// The device answered the handshake with the wrong byte.
    Handshake(u8),
    /// `poll` called while the stream is off.
    NotStreaming,
    /// The streaming worker thread died.
    WorkerLost,
    /// The port itself failed.
    Port(PortError),
}

impl fmt::Display for SerialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { protocol } => write!(f, "{protocol:?} read timed out"),
            Self::Framing {
                protocol,
                expected,
                got,
            } => write!(f, "{protocol:?} frame: expected {expected} bytes, got {got}"),
            Self::Handshake(byte) => write!(f, "handshake answered {byte}, expected 218"),
            Self::NotStreaming => write!(f, "stream is not running"),
            Self::WorkerLost => write!(f, "stream worker terminated abnormally"),
            Self::Port(e) => write!(f, "port: {e}"),
        }
    }
}

impl std::error::Error for SerialError {}

impl From<PortError> for SerialError {
    fn from(e: PortError) -> Self {
        Self::Port(e)
    }
}

impl From<SerialError> for Error {
    fn from(e: SerialError) -> Self {
        Self::Serial(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The file exists but could not be read.
    Io(io::ErrorKind),
    /// The file is not valid JSON for [`RigConfig`](crate::config::RigConfig).
    Parse(String),
    /// A value is out of range.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(kind) => write!(f, "read failed: {kind}"),
            Self::Parse(msg) => write!(f, "parse failed: {msg}"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
