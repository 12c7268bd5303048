//! Fuzz target: event and output channel names
//!
//! Any string either fails to parse or parses to a value whose canonical
//! name parses back to the same value.
//!
//! cargo fuzz run fuzz_event_names

#![no_main]

use libfuzzer_sys::fuzz_target;
use trialrig::events::TrialEvent;
use trialrig::fsm::{OutputChannel, StateMachineDescription};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(event) = text.parse::<TrialEvent>() {
        assert_eq!(event.to_string().parse::<TrialEvent>(), Ok(event));
    }
    if let Ok(channel) = text.parse::<OutputChannel>() {
        assert_eq!(channel.to_string().parse::<OutputChannel>(), Ok(channel));
    }

    // Descriptions from untrusted JSON must fail cleanly, never panic.
    if let Ok(description) = StateMachineDescription::from_json(text) {
        let _ = description.build();
    }
});
