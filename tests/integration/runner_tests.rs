//! Integration tests for the TrialRunner → outputs / soft codes / sinks
//! pipeline.
//!
//! Trials run on the scripted virtual clock unless stated otherwise, so
//! timestamps are exact.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::mock_hw::{MockOutputs, Recorded, RecordingDispatcher, RecordingSink};

use trialrig::adapters::queue_source::QueueEventSource;
use trialrig::adapters::sim::ScriptedSource;
use trialrig::app::context::TrialContext;
use trialrig::app::service::TrialRunner;
use trialrig::error::RunError;
use trialrig::events::{EventQueue, Level, TrialEvent};
use trialrig::fsm::{GlobalTimerConfig, Machine, OutputChannel, State, StateMachineDescription};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Cue (100 ms) → Reward, which waits for a poke.
fn cue_reward() -> Machine {
    let mut sma = StateMachineDescription::new();
    sma.add_state(
        State::new("Cue", ms(100))
            .on(TrialEvent::Tup, "Reward")
            .output(OutputChannel::Valve(1), 255)
            .output(OutputChannel::SoftCode, 3)
            .output(OutputChannel::Bnc(1), 1),
    )
    .add_state(
        State::new("Reward", Duration::ZERO)
            .on(TrialEvent::port_in(1), "exit")
            .output(OutputChannel::Valve(1), 0)
            .output(OutputChannel::SoftCode, 4),
    );
    sma.build().unwrap()
}

struct Rig {
    outputs: MockOutputs,
    codes: RecordingDispatcher,
    sink: RecordingSink,
}

impl Rig {
    fn new() -> Self {
        Self {
            outputs: MockOutputs::new(),
            codes: RecordingDispatcher::default(),
            sink: RecordingSink::default(),
        }
    }

    fn run(
        &mut self,
        runner: &mut TrialRunner,
        machine: &Machine,
        source: &mut ScriptedSource,
    ) -> Result<trialrig::fsm::TrialLog, RunError> {
        runner.run(
            machine,
            source,
            &mut self.outputs,
            &mut self.codes,
            &mut self.sink,
        )
    }
}

// ═══════════════════════════════════════════════════════════════
// Outputs and soft codes
// ═══════════════════════════════════════════════════════════════

#[test]
fn outputs_and_soft_codes_follow_state_order() {
    let machine = cue_reward();
    let mut runner = TrialRunner::new(&TrialContext::default());
    let mut source = ScriptedSource::new().with_event(ms(500), TrialEvent::port_in(1));
    let mut rig = Rig::new();

    let log = rig.run(&mut runner, &machine, &mut source).unwrap();

    assert_eq!(
        rig.outputs.calls,
        vec![
            (OutputChannel::Valve(1), 255),
            (OutputChannel::Bnc(1), 1),
            (OutputChannel::Valve(1), 0),
        ]
    );
    assert_eq!(rig.codes.codes, vec![3, 4]);
    assert_eq!(log.states_visited().collect::<Vec<_>>(), vec!["Cue", "Reward"]);
    assert_eq!(log.ended_at(), Some(ms(500)));
    assert_eq!(log.exit_cause(), Some(TrialEvent::port_in(1)));
}

#[test]
fn early_pokes_are_ignored_and_reported() {
    let machine = cue_reward();
    let mut runner = TrialRunner::new(&TrialContext::default());
    let mut source = ScriptedSource::new()
        .with_event(ms(50), TrialEvent::port_in(1))
        .with_event(ms(60), TrialEvent::bnc(2, Level::High))
        .with_event(ms(300), TrialEvent::port_in(1));
    let mut rig = Rig::new();

    let log = rig.run(&mut runner, &machine, &mut source).unwrap();

    assert_eq!(log.ended_at(), Some(ms(300)));
    assert_eq!(
        rig.sink.events,
        vec![
            Recorded::Started("Cue".into()),
            Recorded::Entered("Cue".into()),
            Recorded::Ignored("Port1In".into()),
            Recorded::Ignored("BNC2High".into()),
            Recorded::Entered("Reward".into()),
            Recorded::Finished(1),
        ]
    );
    let unmatched = log.events().iter().filter(|e| !e.matched).count();
    assert_eq!(unmatched, 2);
}

#[test]
fn output_failure_aborts_and_reports() {
    let machine = cue_reward();
    let mut runner = TrialRunner::new(&TrialContext::default());
    let mut source = ScriptedSource::new();
    let mut rig = Rig::new();
    rig.outputs = MockOutputs::failing_on(OutputChannel::Bnc(1));

    let err = rig.run(&mut runner, &machine, &mut source).unwrap_err();

    assert!(matches!(err, RunError::Output(e) if e.channel == OutputChannel::Bnc(1)));
    // The valve was opened before the failing line.
    assert_eq!(rig.outputs.calls, vec![(OutputChannel::Valve(1), 255)]);
    assert!(matches!(rig.sink.events.last(), Some(Recorded::Aborted(_))));
}

// ═══════════════════════════════════════════════════════════════
// Sessions
// ═══════════════════════════════════════════════════════════════

#[test]
fn consecutive_trials_are_numbered() {
    let machine = cue_reward();
    let mut ctx = TrialContext::default();
    let mut runner = TrialRunner::new(&ctx);
    let mut rig = Rig::new();

    let mut numbers = Vec::new();
    for _ in 0..3 {
        let mut source = ScriptedSource::new().with_event(ms(200), TrialEvent::port_in(1));
        let log = rig.run(&mut runner, &machine, &mut source).unwrap();
        numbers.push(log.export().trial_number);
        ctx = ctx.next();
        runner.advance(&ctx);
    }

    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(rig.codes.codes, vec![3, 4, 3, 4, 3, 4]);
}

#[test]
fn export_uses_session_keys() {
    let machine = cue_reward();
    let mut runner = TrialRunner::new(&TrialContext::default());
    let mut source = ScriptedSource::new().with_event(ms(400), TrialEvent::port_in(1));
    let mut rig = Rig::new();

    let log = rig.run(&mut runner, &machine, &mut source).unwrap();
    let json = serde_json::to_value(log.export()).unwrap();

    assert_eq!(json["Trial start timestamp"], 0.0);
    assert_eq!(json["Trial end timestamp"], 0.4);
    assert_eq!(json["States timestamps"]["Cue"][0][1], 0.1);
    assert_eq!(json["States timestamps"]["Reward"][0][0], 0.1);
    assert_eq!(json["Events timestamps"]["Port1In"][0], 0.4);
}

#[test]
fn json_description_with_global_timer() {
    let json = r#"{
        "states": [
            {"name": "Arm", "duration": 0.01,
             "transitions": {"Tup": "Hold"},
             "outputs": [{"channel": "GlobalTimerTrig", "value": 2}]},
            {"name": "Hold",
             "transitions": {"GlobalTimer2_End": "exit", "Port1In": "Hold"},
             "outputs": [{"channel": "PWM2", "value": 128}]}
        ],
        "global_timers": [{"id": 2, "duration": 1.5}]
    }"#;
    let machine = StateMachineDescription::from_json(json).unwrap().build().unwrap();
    let mut runner = TrialRunner::new(&TrialContext::default());
    let mut source = ScriptedSource::new().with_event(ms(700), TrialEvent::port_in(1));
    let mut rig = Rig::new();

    let log = rig.run(&mut runner, &machine, &mut source).unwrap();

    assert_eq!(log.ended_at(), Some(ms(1500)));
    assert_eq!(log.exit_cause(), Some(TrialEvent::global_timer_end(2)));
    // Re-entering Hold on the poke re-applies its outputs.
    assert_eq!(rig.outputs.calls, vec![(OutputChannel::Pwm(2), 128); 2]);
}

#[test]
fn linked_timer_is_cancelled_by_state_entry() {
    let mut sma = StateMachineDescription::new();
    sma.set_global_timer(
        GlobalTimerConfig::new(1, ms(200))
            .triggered_by("Start")
            .cancelled_by("Safe"),
    )
    .add_state(State::new("Start", ms(50)).on(TrialEvent::Tup, "Safe"))
    .add_state(
        State::new("Safe", ms(500))
            .on(TrialEvent::global_timer_end(1), "exit")
            .on(TrialEvent::Tup, "exit"),
    );
    let machine = sma.build().unwrap();
    let mut runner = TrialRunner::new(&TrialContext::default());
    let mut source = ScriptedSource::new();
    let mut rig = Rig::new();

    let log = rig.run(&mut runner, &machine, &mut source).unwrap();

    assert_eq!(log.exit_cause(), Some(TrialEvent::Tup));
    assert_eq!(log.ended_at(), Some(ms(550)));
}

// ═══════════════════════════════════════════════════════════════
// Real-time source
// ═══════════════════════════════════════════════════════════════

#[test]
fn live_queue_delivers_events_from_another_thread() {
    let mut sma = StateMachineDescription::new();
    sma.add_state(State::new("Wait", Duration::ZERO).on(TrialEvent::port_in(2), "exit"));
    let machine = sma.build().unwrap();

    let queue = Arc::new(EventQueue::new());
    let mut source = QueueEventSource::new(Arc::clone(&queue));
    let producer = thread::spawn(move || {
        thread::sleep(ms(50));
        queue.push(TrialEvent::port_in(1));
        queue.push(TrialEvent::port_in(2));
    });

    let mut runner = TrialRunner::new(&TrialContext::default());
    let mut outputs = MockOutputs::new();
    let mut codes = RecordingDispatcher::default();
    let mut sink = RecordingSink::default();
    let log = runner
        .run(&machine, &mut source, &mut outputs, &mut codes, &mut sink)
        .unwrap();
    producer.join().unwrap();

    let ended = log.ended_at().unwrap();
    assert!(ended >= ms(40), "ended at {ended:?}");
    assert_eq!(log.events().len(), 2);
    assert!(!log.events()[0].matched);
}

#[test]
fn live_abort_handle_stops_waiting_trial() {
    let mut sma = StateMachineDescription::new();
    sma.add_state(State::new("Wait", Duration::ZERO).on(TrialEvent::port_in(1), "exit"));
    let machine = sma.build().unwrap();

    let mut source = QueueEventSource::new(Arc::new(EventQueue::new()));
    let handle = source.abort_handle();
    let aborter = thread::spawn(move || {
        thread::sleep(ms(50));
        handle.abort();
    });

    let mut runner = TrialRunner::new(&TrialContext::default());
    let mut outputs = MockOutputs::new();
    let mut codes = RecordingDispatcher::default();
    let mut sink = RecordingSink::default();
    let result = runner.run(&machine, &mut source, &mut outputs, &mut codes, &mut sink);
    aborter.join().unwrap();

    assert_eq!(result.unwrap_err(), RunError::Aborted);
}
