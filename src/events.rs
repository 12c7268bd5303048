//! Trial events and the bounded inbound event queue.
//!
//! Events are produced by:
//! - the runner's own state timer (`Tup`)
//! - the global timer bank (`GlobalTimerN_Start` / `GlobalTimerN_End`)
//! - hardware input threads (digital edges, hardware global timers)
//! - the stimulus controller (`SoftCodeN`)
//!
//! External producers push into an [`EventQueue`]; the trial runner is the
//! only consumer.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Input edges │────▶│              │     │              │
//! │ HW timers   │────▶│  EventQueue  │────▶│ TrialRunner  │
//! │ Soft codes  │────▶│  (bounded)   │     │  (consumer)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```

use core::fmt;
use core::str::FromStr;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Instant;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use log::warn;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Event identity
// ---------------------------------------------------------------------------

/// A hardware input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InputChannel {
    /// Behaviour port (IR beam, lick sensor).  `In` is high, `Out` is low.
    Port(u8),
    /// BNC trigger input.
    Bnc(u8),
    /// Wire input.
    Wire(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerEdge {
    Start,
    End,
}

/// Everything a state can react to.
///
/// The same type keys the transition tables and flows through the runner,
/// so a transition on `Port1In` matches exactly the `Port1In` edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrialEvent {
    /// The current state's own timer expired.
    Tup,
    DigitalEdge { channel: InputChannel, level: Level },
    GlobalTimer { id: u8, edge: TimerEdge },
    SoftCode(u8),
}

impl TrialEvent {
    pub const fn port_in(port: u8) -> Self {
        Self::DigitalEdge {
            channel: InputChannel::Port(port),
            level: Level::High,
        }
    }

    pub const fn port_out(port: u8) -> Self {
        Self::DigitalEdge {
            channel: InputChannel::Port(port),
            level: Level::Low,
        }
    }

    pub const fn bnc(bnc: u8, level: Level) -> Self {
        Self::DigitalEdge {
            channel: InputChannel::Bnc(bnc),
            level,
        }
    }

    pub const fn global_timer_start(id: u8) -> Self {
        Self::GlobalTimer {
            id,
            edge: TimerEdge::Start,
        }
    }

    pub const fn global_timer_end(id: u8) -> Self {
        Self::GlobalTimer {
            id,
            edge: TimerEdge::End,
        }
    }

    /// The global timer id this event belongs to, if any.
    pub const fn global_timer_id(&self) -> Option<u8> {
        match self {
            Self::GlobalTimer { id, .. } => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for TrialEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Tup => write!(f, "Tup"),
            Self::DigitalEdge { channel, level } => match (channel, level) {
                (InputChannel::Port(n), Level::High) => write!(f, "Port{n}In"),
                (InputChannel::Port(n), Level::Low) => write!(f, "Port{n}Out"),
                (InputChannel::Bnc(n), Level::High) => write!(f, "BNC{n}High"),
                (InputChannel::Bnc(n), Level::Low) => write!(f, "BNC{n}Low"),
                (InputChannel::Wire(n), Level::High) => write!(f, "Wire{n}High"),
                (InputChannel::Wire(n), Level::Low) => write!(f, "Wire{n}Low"),
            },
            Self::GlobalTimer { id, edge } => match edge {
                TimerEdge::Start => write!(f, "GlobalTimer{id}_Start"),
                TimerEdge::End => write!(f, "GlobalTimer{id}_End"),
            },
            Self::SoftCode(code) => write!(f, "SoftCode{code}"),
        }
    }
}

/// An event name that does not follow the canonical naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventError(pub String);

impl fmt::Display for ParseEventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognised event name '{}'", self.0)
    }
}

impl std::error::Error for ParseEventError {}

/// Split `"Port12In"` into `(12, "In")` after stripping `prefix`.
pub(crate) fn split_indexed<'a>(name: &'a str, prefix: &str) -> Option<(u8, &'a str)> {
    let rest = name.strip_prefix(prefix)?;
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let index = rest[..digits].parse().ok()?;
    Some((index, &rest[digits..]))
}

impl FromStr for TrialEvent {
    type Err = ParseEventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fail = || ParseEventError(s.to_owned());

        if s == "Tup" {
            return Ok(Self::Tup);
        }
        if let Some((code, "")) = split_indexed(s, "SoftCode") {
            return Ok(Self::SoftCode(code));
        }
        if let Some((id, suffix)) = split_indexed(s, "GlobalTimer") {
            let edge = match suffix {
                "_Start" => TimerEdge::Start,
                "_End" => TimerEdge::End,
                _ => return Err(fail()),
            };
            return Ok(Self::GlobalTimer { id, edge });
        }

        let (channel, level) = if let Some((n, suffix)) = split_indexed(s, "Port") {
            let level = match suffix {
                "In" => Level::High,
                "Out" => Level::Low,
                _ => return Err(fail()),
            };
            (InputChannel::Port(n), level)
        } else if let Some((n, suffix)) = split_indexed(s, "BNC") {
            (InputChannel::Bnc(n), parse_level(suffix).ok_or_else(fail)?)
        } else if let Some((n, suffix)) = split_indexed(s, "Wire") {
            (InputChannel::Wire(n), parse_level(suffix).ok_or_else(fail)?)
        } else {
            return Err(fail());
        };

        if matches!(
            channel,
            InputChannel::Port(0) | InputChannel::Bnc(0) | InputChannel::Wire(0)
        ) {
            return Err(fail());
        }
        Ok(Self::DigitalEdge { channel, level })
    }
}

fn parse_level(suffix: &str) -> Option<Level> {
    match suffix {
        "High" => Some(Level::High),
        "Low" => Some(Level::Low),
        _ => None,
    }
}

impl Serialize for TrialEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TrialEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Inbound queue
// ---------------------------------------------------------------------------

/// Maximum number of undelivered external events.
pub const EVENT_QUEUE_DEPTH: usize = 32;

/// An external event stamped with its arrival instant.
#[derive(Debug, Clone, Copy)]
pub struct QueuedEvent {
    pub event: TrialEvent,
    pub at: Instant,
}

/// Bounded multi-producer queue feeding a live trial.
///
/// `push` never blocks: when the queue is full the new edge is dropped and
/// counted.  An abort request is carried on a separate signal so it is
/// never lost to a full queue.
pub struct EventQueue {
    channel: Channel<CriticalSectionRawMutex, QueuedEvent, EVENT_QUEUE_DEPTH>,
    abort: Signal<CriticalSectionRawMutex, ()>,
    aborted: AtomicBool,
    dropped: AtomicU32,
}

impl EventQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            abort: Signal::new(),
            aborted: AtomicBool::new(false),
            dropped: AtomicU32::new(0),
        }
    }

    /// Enqueue an event stamped now.  Returns `false` if it was dropped.
    pub fn push(&self, event: TrialEvent) -> bool {
        self.push_at(event, Instant::now())
    }

    /// Enqueue an event with an explicit arrival instant.
    pub fn push_at(&self, event: TrialEvent, at: Instant) -> bool {
        if self.channel.try_send(QueuedEvent { event, at }).is_ok() {
            true
        } else {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!("Event queue full, dropped {} ({} dropped so far)", event, total);
            false
        }
    }

    pub fn try_pop(&self) -> Option<QueuedEvent> {
        self.channel.try_receive().ok()
    }

    pub async fn pop(&self) -> QueuedEvent {
        self.channel.receive().await
    }

    /// Request that the running trial stops.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        self.abort.signal(());
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub async fn wait_abort(&self) {
        self.abort.wait().await;
    }

    /// Drop anything left over and clear a previous abort.
    pub fn reset(&self) {
        while self.channel.try_receive().is_ok() {}
        self.aborted.store(false, Ordering::Release);
        self.abort.reset();
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    /// How many events were dropped because the queue was full.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names_parse() {
        assert_eq!("Tup".parse::<TrialEvent>(), Ok(TrialEvent::Tup));
        assert_eq!("Port1In".parse::<TrialEvent>(), Ok(TrialEvent::port_in(1)));
        assert_eq!("Port3Out".parse::<TrialEvent>(), Ok(TrialEvent::port_out(3)));
        assert_eq!(
            "BNC2Low".parse::<TrialEvent>(),
            Ok(TrialEvent::bnc(2, Level::Low))
        );
        assert_eq!(
            "GlobalTimer1_End".parse::<TrialEvent>(),
            Ok(TrialEvent::global_timer_end(1))
        );
        assert_eq!(
            "SoftCode3".parse::<TrialEvent>(),
            Ok(TrialEvent::SoftCode(3))
        );
    }

    #[test]
    fn malformed_names_are_rejected() {
        for bad in ["", "tup", "Port", "PortIn", "Port0In", "Port1Up", "GlobalTimer1", "BNC1", "SoftCode"] {
            assert!(bad.parse::<TrialEvent>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn display_matches_parse() {
        let e = TrialEvent::DigitalEdge {
            channel: InputChannel::Wire(2),
            level: Level::High,
        };
        assert_eq!(e.to_string(), "Wire2High");
        assert_eq!(e.to_string().parse::<TrialEvent>(), Ok(e));
    }

    #[test]
    fn serde_uses_canonical_names() {
        let json = serde_json::to_string(&TrialEvent::global_timer_start(4)).unwrap();
        assert_eq!(json, "\"GlobalTimer4_Start\"");
        let back: TrialEvent = serde_json::from_str("\"Port2In\"").unwrap();
        assert_eq!(back, TrialEvent::port_in(2));
    }

    #[test]
    fn queue_drops_when_full() {
        let q = EventQueue::new();
        for _ in 0..EVENT_QUEUE_DEPTH {
            assert!(q.push(TrialEvent::port_in(1)));
        }
        assert!(!q.push(TrialEvent::port_out(1)));
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.len(), EVENT_QUEUE_DEPTH);

        // Oldest entries survive, newest was dropped.
        let first = q.try_pop().unwrap();
        assert_eq!(first.event, TrialEvent::port_in(1));
    }

    #[test]
    fn reset_clears_events_and_abort() {
        let q = EventQueue::new();
        q.push(TrialEvent::Tup);
        q.abort();
        assert!(q.is_aborted());
        q.reset();
        assert!(q.is_empty());
        assert!(!q.is_aborted());
    }
}
