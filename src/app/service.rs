//! Trial runner: the hexagonal core.
//!
//! [`TrialRunner`] executes one [`Machine`] to completion.  All I/O flows
//! through port traits injected at the call site, so the whole loop runs
//! unchanged against real hardware or a scripted simulation.
//!
//! ```text
//!   EventSource ──▶ ┌────────────────────────┐ ──▶ TrialSink
//!                   │      TrialRunner       │
//!    OutputPort ◀── │ Machine · GlobalTimers │ ──▶ SoftCodeDispatch
//!                   └────────────────────────┘
//! ```
//!
//! Each iteration takes the earliest of: a due global timer edge, the
//! current state's `Tup`, or an external event that has already arrived.
//! Internal events due at the same instant are ordered timers first, then
//! `Tup`, and both win exact ties with external events.

use std::time::Duration;

use log::{debug, info, warn};

use crate::error::RunError;
use crate::events::{TimerEdge, TrialEvent};
use crate::fsm::{Machine, Next, OutputChannel, TrialLog};
use crate::softcode::SoftCodeDispatch;
use crate::timers::GlobalTimers;

use super::context::TrialContext;
use super::events::AppEvent;
use super::ports::{EventSource, OutputPort, TimerDelegate, TrialSink, Wait};

// ───────────────────────────────────────────────────────────────
// Run state
// ───────────────────────────────────────────────────────────────

/// Receives the one edge taken from the timer bank.
#[derive(Debug, Default)]
struct DueEdge(Option<(TrialEvent, Duration)>);

impl TimerDelegate for DueEdge {
    fn on_timer_edge(&mut self, id: u8, edge: TimerEdge, at: Duration) {
        self.0 = Some((TrialEvent::GlobalTimer { id, edge }, at));
    }
}

/// The mutable state of one run.
struct Run<'m> {
    machine: &'m Machine,
    timers: GlobalTimers,
    log: TrialLog,
    current: usize,
    /// When the current state was entered.
    entered_at: Duration,
    /// When the current state's `Tup` is due, if it is timed.
    state_deadline: Option<Duration>,
    /// External event taken from the source but not yet consumed.
    held: Option<(TrialEvent, Duration)>,
    transitions: usize,
}

impl Run<'_> {
    /// Earliest internal deadline (state timer or global timer).
    fn next_deadline(&self) -> Option<Duration> {
        match (self.state_deadline, self.timers.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Hold an external event until it is the earliest one.
    ///
    /// A live source can hand over an event stamped before the current
    /// state was entered; it is consumed at the entry time so the log
    /// stays ordered.
    fn hold(&mut self, event: TrialEvent, at: Duration) -> Result<(), RunError> {
        if let Some(id) = event.global_timer_id() {
            if !self.machine.has_global_timer(id) {
                return Err(RunError::UnknownGlobalTimer(id));
            }
        }
        self.held = Some((event, at.max(self.entered_at)));
        Ok(())
    }

    /// Next event to consume at `now`: internal or held, whichever is due
    /// first.
    fn take_next(&mut self, now: Duration) -> Option<(TrialEvent, Duration)> {
        let edge = self.timers.peek_due(now);
        let tup = self.state_deadline.filter(|due| *due <= now);
        let internal = match (edge, tup) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        match (internal, self.held) {
            (Some(internal_at), Some((_, held_at))) if held_at < internal_at => self.held.take(),
            (Some(_), _) => match (edge, tup) {
                (Some(edge_at), Some(tup_at)) if tup_at < edge_at => self.take_tup(tup_at),
                (Some(_), _) => {
                    let mut due = DueEdge::default();
                    self.timers.poll_next(now, &mut due);
                    due.0
                }
                (None, Some(tup_at)) => self.take_tup(tup_at),
                (None, None) => None,
            },
            (None, _) => self.held.take(),
        }
    }

    fn take_tup(&mut self, at: Duration) -> Option<(TrialEvent, Duration)> {
        self.state_deadline = None;
        Some((TrialEvent::Tup, at))
    }
}

// ───────────────────────────────────────────────────────────────
// TrialRunner
// ───────────────────────────────────────────────────────────────

/// Runs trials.  One runner can run any number of machines in sequence.
pub struct TrialRunner {
    trial: u32,
    max_transitions: Option<usize>,
}

impl TrialRunner {
    pub fn new(ctx: &TrialContext) -> Self {
        Self {
            trial: ctx.trial_number,
            max_transitions: ctx.config.trial.max_transitions,
        }
    }

    /// Abort with [`RunError::TransitionLimit`] after `limit` transitions.
    #[must_use]
    pub fn with_max_transitions(mut self, limit: usize) -> Self {
        self.max_transitions = Some(limit);
        self
    }

    /// Move on to the next trial number.
    pub fn advance(&mut self, ctx: &TrialContext) {
        self.trial = ctx.trial_number;
        self.max_transitions = ctx.config.trial.max_transitions;
    }

    pub fn trial(&self) -> u32 {
        self.trial
    }

    /// Run `machine` until it reaches `exit`.
    ///
    /// All global timers are cancelled before this returns, whether the
    /// trial finished or aborted.  Outputs already applied are not undone.
    pub fn run(
        &mut self,
        machine: &Machine,
        source: &mut impl EventSource,
        outputs: &mut impl OutputPort,
        dispatcher: &mut impl SoftCodeDispatch,
        sink: &mut impl TrialSink,
    ) -> Result<TrialLog, RunError> {
        source.start();
        let mut run = Run {
            machine,
            timers: GlobalTimers::new(machine.global_timers()),
            log: TrialLog::new(self.trial),
            current: machine.initial(),
            entered_at: Duration::ZERO,
            state_deadline: None,
            held: None,
            transitions: 0,
        };

        info!(
            "Trial {} starting in state: {}",
            self.trial,
            machine.state(run.current).name
        );
        sink.emit(&AppEvent::TrialStarted {
            trial: self.trial,
            state: &machine.state(run.current).name,
        });

        let outcome = self
            .enter(&mut run, machine.initial(), None, Duration::ZERO, outputs, dispatcher, sink)
            .and_then(|()| self.drive(&mut run, source, outputs, dispatcher, sink));

        let cancelled = run.timers.cancel_all();
        if cancelled > 0 {
            debug!("Trial {}: cancelled {} global timer(s)", self.trial, cancelled);
        }

        match outcome {
            Ok(at) => {
                info!(
                    "Trial {} finished at {:.3}s after {} transition(s)",
                    self.trial,
                    at.as_secs_f64(),
                    run.transitions
                );
                sink.emit(&AppEvent::TrialFinished {
                    trial: self.trial,
                    at,
                    transitions: run.transitions,
                });
                Ok(run.log)
            }
            Err(error) => {
                let at = source.now();
                warn!("Trial {} aborted: {}", self.trial, error);
                sink.emit(&AppEvent::TrialAborted {
                    trial: self.trial,
                    at,
                    error,
                });
                Err(error)
            }
        }
    }

    /// Event loop.  Returns the time `exit` was reached.
    fn drive(
        &self,
        run: &mut Run<'_>,
        source: &mut impl EventSource,
        outputs: &mut impl OutputPort,
        dispatcher: &mut impl SoftCodeDispatch,
        sink: &mut impl TrialSink,
    ) -> Result<Duration, RunError> {
        let machine = run.machine;
        loop {
            if run.held.is_none() {
                match source.try_next() {
                    Some(Wait::Event(event, at)) => run.hold(event, at)?,
                    Some(Wait::Aborted) => return Err(RunError::Aborted),
                    Some(Wait::Deadline | Wait::Closed) | None => {}
                }
            }

            let (event, at) = match run.take_next(source.now()) {
                Some(next) => next,
                None => match source.wait(run.next_deadline()) {
                    Wait::Event(event, at) => {
                        run.hold(event, at)?;
                        continue;
                    }
                    Wait::Deadline => continue,
                    Wait::Aborted => return Err(RunError::Aborted),
                    Wait::Closed => return Err(RunError::SourceClosed),
                },
            };

            let state = machine.state(run.current);
            let Some(next) = state.transition(&event) else {
                debug!(
                    "{:.3}s: {} ignored in state {}",
                    at.as_secs_f64(),
                    event,
                    state.name
                );
                run.log.record_event(at, event, false);
                sink.emit(&AppEvent::EventIgnored {
                    at,
                    state: &state.name,
                    event,
                });
                continue;
            };
            run.log.record_event(at, event, true);

            match next {
                Next::Exit => {
                    debug!("{:.3}s: {} -> exit", at.as_secs_f64(), event);
                    run.log.finish(at, event);
                    return Ok(at);
                }
                Next::State(index) => {
                    run.transitions += 1;
                    if let Some(limit) = self.max_transitions {
                        if run.transitions > limit {
                            return Err(RunError::TransitionLimit(limit));
                        }
                    }
                    self.enter(run, index, Some(event), at, outputs, dispatcher, sink)?;
                }
            }
        }
    }

    /// Enter state `index` at trial time `at`.
    #[allow(clippy::too_many_arguments)]
    fn enter(
        &self,
        run: &mut Run<'_>,
        index: usize,
        cause: Option<TrialEvent>,
        at: Duration,
        outputs: &mut impl OutputPort,
        dispatcher: &mut impl SoftCodeDispatch,
        sink: &mut impl TrialSink,
    ) -> Result<(), RunError> {
        let machine = run.machine;
        let state = machine.state(index);
        run.current = index;
        run.entered_at = at;
        run.log.record_entry(at, &state.name, cause);
        debug!("{:.3}s: entered {}", at.as_secs_f64(), state.name);
        sink.emit(&AppEvent::StateEntered {
            at,
            state: &state.name,
            cause,
        });

        for action in &state.outputs {
            match action.channel {
                OutputChannel::GlobalTimerTrig => run.timers.arm(action.value, at)?,
                OutputChannel::GlobalTimerCancel => {
                    run.timers.cancel(action.value)?;
                }
                OutputChannel::SoftCode => dispatcher.dispatch(action.value),
                channel => outputs.set(channel, action.value)?,
            }
        }
        for &id in &state.cancels {
            run.timers.cancel(id)?;
        }
        for &id in &state.arms {
            run.timers.arm(id, at)?;
        }

        run.state_deadline = state.is_timed().then(|| at + state.duration);
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
