//! Per-trial state machine descriptions.
//!
//! A [`StateMachineDescription`] is plain data: states, transitions,
//! output actions, global timers.  It can be built in code or loaded from
//! JSON, and is checked by [`build`](super::machine::build) before a trial
//! runs.
//!
//! ```text
//!   State::new("TimerTrig", 1ms)
//!       .on(Tup, "Port1Lit")
//!       .output(GlobalTimerTrig, 1)
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::actions::{OutputAction, OutputChannel};
use super::machine::{self, Machine};
use crate::error::BuildError;
use crate::events::TrialEvent;

/// Reserved transition target that ends the trial.
pub const EXIT: &str = "exit";

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// Where a transition leads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    State(String),
    Exit,
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        if name == EXIT {
            Self::Exit
        } else {
            Self::State(name.to_owned())
        }
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        if name == EXIT {
            Self::Exit
        } else {
            Self::State(name)
        }
    }
}

impl Target {
    pub fn as_str(&self) -> &str {
        match self {
            Self::State(name) => name,
            Self::Exit => EXIT,
        }
    }
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(String::deserialize(deserializer)?.into())
    }
}

// ---------------------------------------------------------------------------
// Durations as fractional seconds
// ---------------------------------------------------------------------------

pub(crate) mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub name: String,
    /// Zero means the state only leaves on an event; no `Tup` is generated.
    #[serde(with = "secs", default)]
    pub duration: Duration,
    #[serde(default)]
    pub transitions: BTreeMap<TrialEvent, Target>,
    /// Applied in order on every entry.
    #[serde(default)]
    pub outputs: Vec<OutputAction>,
}

impl State {
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
            transitions: BTreeMap::new(),
            outputs: Vec::new(),
        }
    }

    /// Add a transition.  A later call for the same event replaces it.
    #[must_use]
    pub fn on(mut self, event: TrialEvent, target: impl Into<Target>) -> Self {
        self.transitions.insert(event, target.into());
        self
    }

    #[must_use]
    pub fn output(mut self, channel: OutputChannel, value: u8) -> Self {
        self.outputs.push(OutputAction::new(channel, value));
        self
    }
}

// ---------------------------------------------------------------------------
// Global timers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalTimerConfig {
    /// 1..=16.
    pub id: u8,
    #[serde(with = "secs")]
    pub duration: Duration,
    /// Delay between arming and the `_Start` edge.
    #[serde(with = "secs", default)]
    pub onset_delay: Duration,
    /// Entering any of these states arms the timer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trigger_states: Vec<String>,
    /// Entering any of these states cancels the timer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cancel_states: Vec<String>,
}

impl GlobalTimerConfig {
    pub fn new(id: u8, duration: Duration) -> Self {
        Self {
            id,
            duration,
            onset_delay: Duration::ZERO,
            trigger_states: Vec::new(),
            cancel_states: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_onset_delay(mut self, delay: Duration) -> Self {
        self.onset_delay = delay;
        self
    }

    #[must_use]
    pub fn triggered_by(mut self, state: impl Into<String>) -> Self {
        self.trigger_states.push(state.into());
        self
    }

    #[must_use]
    pub fn cancelled_by(mut self, state: impl Into<String>) -> Self {
        self.cancel_states.push(state.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Description
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateMachineDescription {
    pub states: Vec<State>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub global_timers: Vec<GlobalTimerConfig>,
    /// Defaults to the first state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<String>,
}

impl StateMachineDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_state(&mut self, state: State) -> &mut Self {
        self.states.push(state);
        self
    }

    pub fn set_global_timer(&mut self, timer: GlobalTimerConfig) -> &mut Self {
        self.global_timers.push(timer);
        self
    }

    pub fn set_initial(&mut self, name: impl Into<String>) -> &mut Self {
        self.initial = Some(name.into());
        self
    }

    /// Name of the state the trial starts in.
    pub fn initial_state(&self) -> Option<&str> {
        self.initial
            .as_deref()
            .or_else(|| self.states.first().map(|s| s.name.as_str()))
    }

    /// Validate and compile into an immutable [`Machine`].
    pub fn build(&self) -> Result<Machine, BuildError> {
        machine::build(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_is_reserved() {
        assert_eq!(Target::from("exit"), Target::Exit);
        assert_eq!(Target::from("Exit"), Target::State("Exit".into()));
    }

    #[test]
    fn initial_defaults_to_first_state() {
        let mut sm = StateMachineDescription::new();
        sm.add_state(State::new("A", Duration::ZERO))
            .add_state(State::new("B", Duration::ZERO));
        assert_eq!(sm.initial_state(), Some("A"));
        sm.set_initial("B");
        assert_eq!(sm.initial_state(), Some("B"));
    }

    #[test]
    fn json_round_trip_keeps_description() {
        let mut sm = StateMachineDescription::new();
        sm.set_global_timer(GlobalTimerConfig::new(1, Duration::from_secs(3)))
            .add_state(
                State::new("TimerTrig", Duration::from_millis(1))
                    .on(TrialEvent::Tup, "Port1Lit")
                    .output(OutputChannel::GlobalTimerTrig, 1),
            )
            .add_state(
                State::new("Port1Lit", Duration::from_millis(250))
                    .on(TrialEvent::Tup, "exit")
                    .on(TrialEvent::global_timer_end(1), "exit")
                    .output(OutputChannel::Pwm(1), 255),
            );

        let json = sm.to_json().unwrap();
        assert!(json.contains("\"GlobalTimer1_End\": \"exit\""));
        let back = StateMachineDescription::from_json(&json).unwrap();
        assert_eq!(back, sm);
    }

    #[test]
    fn negative_durations_are_rejected() {
        let json = r#"{"states":[{"name":"A","duration":-1.0}]}"#;
        assert!(StateMachineDescription::from_json(json).is_err());
    }

    #[test]
    fn minimal_json_loads_with_defaults() {
        let json = r#"{"states":[{"name":"Wait","transitions":{"Port1In":"exit"}}]}"#;
        let sm = StateMachineDescription::from_json(json).unwrap();
        assert_eq!(sm.states[0].duration, Duration::ZERO);
        assert_eq!(
            sm.states[0].transitions.get(&TrialEvent::port_in(1)),
            Some(&Target::Exit)
        );
    }
}
