//! Global timer bank.
//!
//! Global timers run alongside the state machine and are not tied to the
//! current state.  The bank has no clock of its own: the runner passes the
//! event source's time into [`GlobalTimers::poll_next`], and each due edge is
//! handed to a [`TimerDelegate`] which feeds it back into the trial's
//! event stream.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      GlobalTimers                            │
//! │                                                              │
//! │  ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌──────────┐   │
//! │  │ Timer 1   │  │ Timer 2   │  │ Timer 3   │  │  ...16   │   │
//! │  │ Idle      │  │ Pending   │  │ Running   │  │          │   │
//! │  └─────┬─────┘  └─────┬─────┘  └─────┬─────┘  └─────┬────┘   │
//! │        │   _Start     │    _End      │              │        │
//! │        ▼              ▼              ▼              ▼        │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                TimerDelegate                           │  │
//! │  │       (runner takes one edge per iteration)            │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use heapless::Vec;
use log::{debug, info};

use crate::app::ports::TimerDelegate;
use crate::error::TimerError;
use crate::events::TimerEdge;
use crate::fsm::GlobalTimerConfig;
use crate::fsm::MAX_GLOBAL_TIMER_ID;

/// Maximum number of global timers per machine.
pub const MAX_GLOBAL_TIMERS: usize = MAX_GLOBAL_TIMER_ID as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Armed, `_Start` not yet emitted.
    Pending { start_at: Duration, duration: Duration },
    /// `_Start` emitted, waiting for `_End`.
    Running { end_at: Duration },
}

impl Phase {
    fn due(self) -> Option<Duration> {
        match self {
            Self::Idle => None,
            Self::Pending { start_at, .. } => Some(start_at),
            Self::Running { end_at } => Some(end_at),
        }
    }
}

#[derive(Debug, Clone)]
struct TimerSlot {
    id: u8,
    duration: Duration,
    onset_delay: Duration,
    phase: Phase,
}

/// All global timers of one running trial.
#[derive(Debug, Clone)]
pub struct GlobalTimers {
    slots: Vec<TimerSlot, MAX_GLOBAL_TIMERS>,
}

impl GlobalTimers {
    /// Build the bank from a machine's timer configs.  Entries beyond
    /// [`MAX_GLOBAL_TIMERS`] are ignored; `build` already rejects them.
    pub fn new(configs: &[GlobalTimerConfig]) -> Self {
        let mut slots = Vec::new();
        for config in configs.iter().take(MAX_GLOBAL_TIMERS) {
            let _ = slots.push(TimerSlot {
                id: config.id,
                duration: config.duration,
                onset_delay: config.onset_delay,
                phase: Phase::Idle,
            });
        }
        Self { slots }
    }

    fn slot_mut(&mut self, id: u8) -> Result<&mut TimerSlot, TimerError> {
        self.slots
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(TimerError::Unknown(id))
    }

    /// Arm timer `id` at `now` with its configured duration.
    pub fn arm(&mut self, id: u8, now: Duration) -> Result<(), TimerError> {
        let duration = self.slot_mut(id)?.duration;
        self.arm_for(id, duration, now)
    }

    /// Arm timer `id` at `now` for `duration`.
    pub fn arm_for(&mut self, id: u8, duration: Duration, now: Duration) -> Result<(), TimerError> {
        let slot = self.slot_mut(id)?;
        if slot.phase != Phase::Idle {
            return Err(TimerError::Conflict(id));
        }
        slot.phase = Phase::Pending {
            start_at: now + slot.onset_delay,
            duration,
        };
        info!(
            "GlobalTimer{}: armed at {:.3}s for {:.3}s",
            id,
            now.as_secs_f64(),
            duration.as_secs_f64()
        );
        Ok(())
    }

    /// Cancel timer `id`.  Returns `true` if it was armed.
    pub fn cancel(&mut self, id: u8) -> Result<bool, TimerError> {
        let slot = self.slot_mut(id)?;
        let was_armed = slot.phase != Phase::Idle;
        slot.phase = Phase::Idle;
        if was_armed {
            debug!("GlobalTimer{}: cancelled", id);
        }
        Ok(was_armed)
    }

    /// Cancel everything.  Returns how many timers were armed.
    pub fn cancel_all(&mut self) -> usize {
        let mut cancelled = 0;
        for slot in &mut self.slots {
            if slot.phase != Phase::Idle {
                slot.phase = Phase::Idle;
                cancelled += 1;
            }
        }
        cancelled
    }

    pub fn is_armed(&self, id: u8) -> bool {
        self.slots
            .iter()
            .any(|s| s.id == id && s.phase != Phase::Idle)
    }

    pub fn armed_count(&self) -> usize {
        self.slots.iter().filter(|s| s.phase != Phase::Idle).count()
    }

    /// Time of the earliest pending edge.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.slots.iter().filter_map(|s| s.phase.due()).min()
    }

    /// Due time of the earliest edge at or before `now`.
    pub fn peek_due(&self, now: Duration) -> Option<Duration> {
        self.next_deadline().filter(|due| *due <= now)
    }

    /// Emit the single earliest edge due at or before `now` (ties by id).
    /// Returns `false` when nothing is due.
    ///
    /// Edges leave the bank one at a time, so a cancel applied between two
    /// calls suppresses everything the cancelled timer had left to emit.
    pub fn poll_next(&mut self, now: Duration, delegate: &mut dyn TimerDelegate) -> bool {
        let next = self
            .slots
            .iter_mut()
            .filter_map(|s| s.phase.due().filter(|due| *due <= now).map(|due| (due, s)))
            .min_by_key(|(due, s)| (*due, s.id));
        let Some((due, slot)) = next else {
            return false;
        };

        let edge = match slot.phase {
            Phase::Pending { duration, .. } => {
                slot.phase = Phase::Running {
                    end_at: due + duration,
                };
                TimerEdge::Start
            }
            Phase::Running { .. } => {
                slot.phase = Phase::Idle;
                TimerEdge::End
            }
            Phase::Idle => return false,
        };
        debug!("GlobalTimer{}: {:?} at {:.3}s", slot.id, edge, due.as_secs_f64());
        delegate.on_timer_edge(slot.id, edge, due);
        true
    }

    /// Emit every edge due at or before `now`, earliest first.
    /// Returns the number of edges emitted.
    pub fn poll(&mut self, now: Duration, delegate: &mut dyn TimerDelegate) -> usize {
        let mut emitted = 0;
        while self.poll_next(now, delegate) {
            emitted += 1;
        }
        emitted
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
