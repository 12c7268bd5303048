//! Simulated event source on a virtual clock.
//!
//! Time only moves when the runner waits: the clock jumps straight to the
//! next scripted event or to the requested deadline, so simulated trials
//! are deterministic and finish instantly.

use std::collections::VecDeque;
use std::time::Duration;

use crate::app::ports::{EventSource, Wait};
use crate::events::TrialEvent;

#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    now: Duration,
    /// Sorted by time; equal times keep insertion order.
    script: VecDeque<(Duration, TrialEvent)>,
    abort_at: Option<Duration>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject `event` at trial time `at`.
    #[must_use]
    pub fn with_event(mut self, at: Duration, event: TrialEvent) -> Self {
        self.push(at, event);
        self
    }

    /// Abort the trial when the clock reaches `at`.
    #[must_use]
    pub fn abort_at(mut self, at: Duration) -> Self {
        self.abort_at = Some(at);
        self
    }

    pub fn push(&mut self, at: Duration, event: TrialEvent) {
        let index = self.script.partition_point(|(t, _)| *t <= at);
        self.script.insert(index, (at, event));
    }

    /// Events not yet delivered.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl EventSource for ScriptedSource {
    /// Only the clock is reset; the script is kept.
    fn start(&mut self) {
        self.now = Duration::ZERO;
    }

    fn now(&self) -> Duration {
        self.now
    }

    /// Scripted events at or before the current virtual time.
    fn try_next(&mut self) -> Option<Wait> {
        if self.abort_at.is_some_and(|abort| abort <= self.now) {
            return Some(Wait::Aborted);
        }
        if self.script.front().is_some_and(|(at, _)| *at <= self.now) {
            let (at, event) = self.script.pop_front()?;
            return Some(Wait::Event(event, at));
        }
        None
    }

    fn wait(&mut self, deadline: Option<Duration>) -> Wait {
        let next = self.script.front().map(|(at, _)| *at);
        let horizon = match (next, deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        if let Some(abort) = self.abort_at {
            if horizon.is_none_or(|h| abort <= h) {
                self.now = self.now.max(abort);
                return Wait::Aborted;
            }
        }

        match (next, deadline) {
            // Internal deadlines win ties with scripted events.
            (Some(at), Some(d)) if at >= d => {
                self.now = self.now.max(d);
                Wait::Deadline
            }
            (Some(_), _) => match self.script.pop_front() {
                Some((at, event)) => {
                    self.now = self.now.max(at);
                    Wait::Event(event, self.now)
                }
                None => Wait::Closed,
            },
            (None, Some(d)) => {
                self.now = self.now.max(d);
                Wait::Deadline
            }
            (None, None) => Wait::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn events_come_out_in_time_order() {
        let mut s = ScriptedSource::new()
            .with_event(ms(20), TrialEvent::port_in(2))
            .with_event(ms(10), TrialEvent::port_in(1));
        assert_eq!(s.wait(None), Wait::Event(TrialEvent::port_in(1), ms(10)));
        assert_eq!(s.wait(None), Wait::Event(TrialEvent::port_in(2), ms(20)));
        assert_eq!(s.wait(None), Wait::Closed);
    }

    #[test]
    fn deadline_before_event() {
        let mut s = ScriptedSource::new().with_event(ms(50), TrialEvent::Tup);
        assert_eq!(s.wait(Some(ms(30))), Wait::Deadline);
        assert_eq!(s.now(), ms(30));
        assert_eq!(s.wait(Some(ms(50))), Wait::Deadline);
        assert_eq!(s.wait(None), Wait::Event(TrialEvent::Tup, ms(50)));
    }

    #[test]
    fn try_next_only_sees_elapsed_events() {
        let mut s = ScriptedSource::new()
            .with_event(ms(30), TrialEvent::port_in(1))
            .with_event(ms(80), TrialEvent::port_in(2));
        assert_eq!(s.try_next(), None);
        assert_eq!(s.wait(Some(ms(30))), Wait::Deadline);
        assert_eq!(s.try_next(), Some(Wait::Event(TrialEvent::port_in(1), ms(30))));
        assert_eq!(s.try_next(), None);
        assert_eq!(s.remaining(), 1);
    }

    #[test]
    fn abort_preempts_later_work() {
        let mut s = ScriptedSource::new()
            .with_event(ms(100), TrialEvent::port_in(1))
            .abort_at(ms(40));
        assert_eq!(s.wait(Some(ms(20))), Wait::Deadline);
        assert_eq!(s.wait(Some(ms(60))), Wait::Aborted);
        assert_eq!(s.now(), ms(40));
    }
}
