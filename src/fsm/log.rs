//! Per-trial record of state entries and consumed events.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::events::TrialEvent;

/// One state entry.  `cause` is `None` for the initial state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub at: Duration,
    pub state: String,
    pub cause: Option<TrialEvent>,
}

/// One consumed event and whether the current state handled it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub at: Duration,
    pub event: TrialEvent,
    pub matched: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrialLog {
    trial: u32,
    entries: Vec<LogEntry>,
    events: Vec<EventRecord>,
    finished: Option<(Duration, TrialEvent)>,
}

impl TrialLog {
    pub fn new(trial: u32) -> Self {
        Self {
            trial,
            ..Self::default()
        }
    }

    pub fn trial(&self) -> u32 {
        self.trial
    }

    pub fn record_entry(&mut self, at: Duration, state: &str, cause: Option<TrialEvent>) {
        self.entries.push(LogEntry {
            at,
            state: state.to_owned(),
            cause,
        });
    }

    pub fn record_event(&mut self, at: Duration, event: TrialEvent, matched: bool) {
        self.events.push(EventRecord { at, event, matched });
    }

    pub fn finish(&mut self, at: Duration, cause: TrialEvent) {
        self.finished = Some((at, cause));
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    /// Names of the visited states, in order.
    pub fn states_visited(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.state.as_str())
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    pub fn ended_at(&self) -> Option<Duration> {
        self.finished.map(|(at, _)| at)
    }

    /// The event that led to `exit`.
    pub fn exit_cause(&self) -> Option<TrialEvent> {
        self.finished.map(|(_, cause)| cause)
    }

    /// Flatten into the per-trial export layout: every visit of a state as
    /// `[start, end]` in seconds, every event as its list of timestamps.
    pub fn export(&self) -> TrialData {
        let end = self
            .ended_at()
            .or_else(|| self.events.last().map(|e| e.at))
            .or_else(|| self.entries.last().map(|e| e.at))
            .unwrap_or_default();

        let mut states: BTreeMap<String, Vec<[f64; 2]>> = BTreeMap::new();
        for (i, entry) in self.entries.iter().enumerate() {
            let left = self.entries.get(i + 1).map_or(end, |next| next.at);
            states
                .entry(entry.state.clone())
                .or_default()
                .push([entry.at.as_secs_f64(), left.as_secs_f64()]);
        }

        let mut events: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for record in &self.events {
            events
                .entry(record.event.to_string())
                .or_default()
                .push(record.at.as_secs_f64());
        }

        TrialData {
            trial_number: self.trial,
            trial_start: 0.0,
            trial_end: end.as_secs_f64(),
            states,
            events,
        }
    }
}

/// Serialisable per-trial summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialData {
    pub trial_number: u32,
    #[serde(rename = "Trial start timestamp")]
    pub trial_start: f64,
    #[serde(rename = "Trial end timestamp")]
    pub trial_end: f64,
    #[serde(rename = "States timestamps")]
    pub states: BTreeMap<String, Vec<[f64; 2]>>,
    #[serde(rename = "Events timestamps")]
    pub events: BTreeMap<String, Vec<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn export_pairs_visits_with_next_entry() {
        let mut log = TrialLog::new(7);
        log.record_entry(ms(0), "A", None);
        log.record_event(ms(250), TrialEvent::Tup, true);
        log.record_entry(ms(250), "B", Some(TrialEvent::Tup));
        log.record_event(ms(400), TrialEvent::port_in(1), false);
        log.record_event(ms(500), TrialEvent::Tup, true);
        log.record_entry(ms(500), "A", Some(TrialEvent::Tup));
        log.record_event(ms(750), TrialEvent::Tup, true);
        log.finish(ms(750), TrialEvent::Tup);

        let data = log.export();
        assert_eq!(data.trial_number, 7);
        assert_eq!(data.states["A"], vec![[0.0, 0.25], [0.5, 0.75]]);
        assert_eq!(data.states["B"], vec![[0.25, 0.5]]);
        assert_eq!(data.events["Tup"], vec![0.25, 0.5, 0.75]);
        assert_eq!(data.events["Port1In"], vec![0.4]);
        assert!((data.trial_end - 0.75).abs() < 1e-9);
    }

    #[test]
    fn export_uses_original_key_names() {
        let mut log = TrialLog::new(1);
        log.record_entry(ms(0), "Only", None);
        let json = serde_json::to_value(log.export()).unwrap();
        assert!(json.get("States timestamps").is_some());
        assert!(json.get("Events timestamps").is_some());
    }
}
