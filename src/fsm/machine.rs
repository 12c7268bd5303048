//! Validated, immutable state machines.
//!
//! [`build`] checks a [`StateMachineDescription`] and resolves every state
//! name into an index so that the runner never looks a name up while a
//! trial is running.
//!
//! ```text
//! ┌───────┬───────────┬────────────────────┬──────────┬────────────┐
//! │ index │ name      │ transitions        │ outputs  │ timer link │
//! ├───────┼───────────┼────────────────────┼──────────┼────────────┤
//! │ 0     │ TimerTrig │ Tup -> 1           │ GTTrig 1 │            │
//! │ 1     │ Port1Lit  │ Tup -> 2, GT1 -> X │ PWM1 255 │            │
//! │ 2     │ Port3Lit  │ Tup -> 1, GT1 -> X │ PWM3 255 │            │
//! └───────┴───────────┴────────────────────┴──────────┴────────────┘
//! ```

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use log::warn;

use super::actions::{OutputAction, OutputChannel};
use super::description::{EXIT, GlobalTimerConfig, StateMachineDescription, Target};
use crate::error::BuildError;
use crate::events::TrialEvent;

/// Highest global timer id.
pub const MAX_GLOBAL_TIMER_ID: u8 = 16;

/// Resolved transition target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    State(usize),
    Exit,
}

/// One row of the compiled state table.
#[derive(Debug, Clone)]
pub struct CompiledState {
    pub name: String,
    pub duration: Duration,
    pub outputs: Vec<OutputAction>,
    transitions: HashMap<TrialEvent, Next>,
    /// Timers armed by entering this state (state linkage).
    pub arms: Vec<u8>,
    /// Timers cancelled by entering this state (state linkage).
    pub cancels: Vec<u8>,
}

impl CompiledState {
    pub fn transition(&self, event: &TrialEvent) -> Option<Next> {
        self.transitions.get(event).copied()
    }

    /// `true` if this state ever times out on its own.
    pub fn is_timed(&self) -> bool {
        !self.duration.is_zero()
    }
}

/// An immutable, validated state machine for one trial.
#[derive(Debug, Clone)]
pub struct Machine {
    states: Vec<CompiledState>,
    initial: usize,
    global_timers: Vec<GlobalTimerConfig>,
}

impl Machine {
    pub fn initial(&self) -> usize {
        self.initial
    }

    pub fn state(&self, index: usize) -> &CompiledState {
        &self.states[index]
    }

    pub fn states(&self) -> &[CompiledState] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.states.iter().position(|s| s.name == name)
    }

    pub fn global_timers(&self) -> &[GlobalTimerConfig] {
        &self.global_timers
    }

    pub fn has_global_timer(&self, id: u8) -> bool {
        self.global_timers.iter().any(|t| t.id == id)
    }
}

/// Validate `description` and compile it.
pub fn build(description: &StateMachineDescription) -> Result<Machine, BuildError> {
    if description.states.is_empty() {
        return Err(BuildError::Empty);
    }

    let mut index: HashMap<&str, usize> = HashMap::with_capacity(description.states.len());
    for (i, state) in description.states.iter().enumerate() {
        if state.name == EXIT {
            return Err(BuildError::ReservedStateName(state.name.clone()));
        }
        if index.insert(state.name.as_str(), i).is_some() {
            return Err(BuildError::DuplicateState(state.name.clone()));
        }
    }

    let mut timer_ids = HashSet::new();
    for timer in &description.global_timers {
        if timer.id == 0 || timer.id > MAX_GLOBAL_TIMER_ID {
            return Err(BuildError::GlobalTimerOutOfRange(timer.id));
        }
        if !timer_ids.insert(timer.id) {
            return Err(BuildError::DuplicateGlobalTimer(timer.id));
        }
    }

    let initial_name = description.initial_state().unwrap_or_default();
    let initial = *index
        .get(initial_name)
        .ok_or_else(|| BuildError::UnknownInitialState(initial_name.to_owned()))?;

    let mut states = Vec::with_capacity(description.states.len());
    for state in &description.states {
        let undefined_timer = |id| BuildError::UndefinedGlobalTimer {
            state: state.name.clone(),
            id,
        };

        let mut transitions = HashMap::with_capacity(state.transitions.len());
        for (event, target) in &state.transitions {
            if let Some(id) = event.global_timer_id() {
                if !timer_ids.contains(&id) {
                    return Err(undefined_timer(id));
                }
            }
            let next = match target {
                Target::Exit => Next::Exit,
                Target::State(name) => {
                    Next::State(*index.get(name.as_str()).ok_or_else(|| {
                        BuildError::UndefinedTarget {
                            state: state.name.clone(),
                            event: *event,
                            target: name.clone(),
                        }
                    })?)
                }
            };
            transitions.insert(*event, next);
        }

        if state.duration.is_zero() && transitions.contains_key(&TrialEvent::Tup) {
            warn!(
                "State '{}' has no duration; its Tup transition will never fire",
                state.name
            );
        }

        for action in &state.outputs {
            if matches!(
                action.channel,
                OutputChannel::GlobalTimerTrig | OutputChannel::GlobalTimerCancel
            ) && !timer_ids.contains(&action.value)
            {
                return Err(undefined_timer(action.value));
            }
        }

        states.push(CompiledState {
            name: state.name.clone(),
            duration: state.duration,
            outputs: state.outputs.clone(),
            transitions,
            arms: Vec::new(),
            cancels: Vec::new(),
        });
    }

    for timer in &description.global_timers {
        for name in &timer.trigger_states {
            let i = linked_state(&index, timer.id, name)?;
            states[i].arms.push(timer.id);
        }
        for name in &timer.cancel_states {
            let i = linked_state(&index, timer.id, name)?;
            states[i].cancels.push(timer.id);
        }
    }

    Ok(Machine {
        states,
        initial,
        global_timers: description.global_timers.clone(),
    })
}

fn linked_state(index: &HashMap<&str, usize>, timer: u8, name: &str) -> Result<usize, BuildError> {
    index
        .get(name)
        .copied()
        .ok_or_else(|| BuildError::UndefinedLinkedState {
            timer,
            state: name.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::description::State;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn ping_pong() -> StateMachineDescription {
        let mut sm = StateMachineDescription::new();
        sm.set_global_timer(GlobalTimerConfig::new(1, Duration::from_secs(3)))
            .add_state(
                State::new("TimerTrig", ms(1))
                    .on(TrialEvent::Tup, "Port1Lit")
                    .output(OutputChannel::GlobalTimerTrig, 1),
            )
            .add_state(
                State::new("Port1Lit", ms(250))
                    .on(TrialEvent::Tup, "Port3Lit")
                    .on(TrialEvent::global_timer_end(1), "exit"),
            )
            .add_state(
                State::new("Port3Lit", ms(250))
                    .on(TrialEvent::Tup, "Port1Lit")
                    .on(TrialEvent::global_timer_end(1), "exit"),
            );
        sm
    }

    #[test]
    fn resolves_targets_to_indices() {
        let m = build(&ping_pong()).unwrap();
        assert_eq!(m.len(), 3);
        assert_eq!(m.initial(), 0);
        assert_eq!(m.state(0).transition(&TrialEvent::Tup), Some(Next::State(1)));
        assert_eq!(m.state(2).transition(&TrialEvent::Tup), Some(Next::State(1)));
        assert_eq!(
            m.state(1).transition(&TrialEvent::global_timer_end(1)),
            Some(Next::Exit)
        );
        assert_eq!(m.state(1).transition(&TrialEvent::port_in(1)), None);
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(
            build(&StateMachineDescription::new()).unwrap_err(),
            BuildError::Empty
        );
    }

    #[test]
    fn rejects_duplicate_state() {
        let mut sm = ping_pong();
        sm.add_state(State::new("Port1Lit", ms(1)));
        assert_eq!(
            build(&sm).unwrap_err(),
            BuildError::DuplicateState("Port1Lit".into())
        );
    }

    #[test]
    fn rejects_state_named_exit() {
        let mut sm = StateMachineDescription::new();
        sm.add_state(State::new("A", ms(10)).on(TrialEvent::Tup, "exit"))
            .add_state(State::new("exit", ms(10)));
        assert_eq!(
            build(&sm).unwrap_err(),
            BuildError::ReservedStateName("exit".into())
        );
    }

    #[test]
    fn rejects_undefined_target() {
        let mut sm = StateMachineDescription::new();
        sm.add_state(State::new("A", ms(10)).on(TrialEvent::Tup, "B"));
        assert!(matches!(
            build(&sm).unwrap_err(),
            BuildError::UndefinedTarget { ref target, .. } if target == "B"
        ));
    }

    #[test]
    fn rejects_unknown_initial() {
        let mut sm = ping_pong();
        sm.set_initial("Nowhere");
        assert_eq!(
            build(&sm).unwrap_err(),
            BuildError::UnknownInitialState("Nowhere".into())
        );
    }

    #[test]
    fn rejects_duplicate_and_out_of_range_timers() {
        let mut sm = ping_pong();
        sm.set_global_timer(GlobalTimerConfig::new(1, ms(5)));
        assert_eq!(build(&sm).unwrap_err(), BuildError::DuplicateGlobalTimer(1));

        let mut sm = ping_pong();
        sm.set_global_timer(GlobalTimerConfig::new(17, ms(5)));
        assert_eq!(build(&sm).unwrap_err(), BuildError::GlobalTimerOutOfRange(17));
    }

    #[test]
    fn rejects_references_to_undeclared_timers() {
        let mut sm = StateMachineDescription::new();
        sm.add_state(State::new("A", ms(10)).output(OutputChannel::GlobalTimerTrig, 2));
        assert!(matches!(
            build(&sm).unwrap_err(),
            BuildError::UndefinedGlobalTimer { id: 2, .. }
        ));

        let mut sm = StateMachineDescription::new();
        sm.add_state(State::new("A", ms(10)).on(TrialEvent::global_timer_end(3), "exit"));
        assert!(matches!(
            build(&sm).unwrap_err(),
            BuildError::UndefinedGlobalTimer { id: 3, .. }
        ));
    }

    #[test]
    fn resolves_state_linkage() {
        let mut sm = ping_pong();
        sm.set_global_timer(
            GlobalTimerConfig::new(2, ms(100))
                .triggered_by("Port1Lit")
                .cancelled_by("Port3Lit"),
        );
        let m = build(&sm).unwrap();
        assert_eq!(m.state(1).arms, vec![2]);
        assert_eq!(m.state(2).cancels, vec![2]);

        sm.set_global_timer(GlobalTimerConfig::new(3, ms(100)).triggered_by("Ghost"));
        assert!(matches!(
            build(&sm).unwrap_err(),
            BuildError::UndefinedLinkedState { timer: 3, .. }
        ));
    }

    #[test]
    fn zero_duration_tup_is_accepted() {
        let mut sm = StateMachineDescription::new();
        sm.add_state(State::new("Wait", Duration::ZERO).on(TrialEvent::Tup, "exit"));
        let m = build(&sm).unwrap();
        assert!(!m.state(0).is_timed());
    }
}
