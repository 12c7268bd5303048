//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter          | Implements        | Connects to                 |
//! |------------------|-------------------|-----------------------------|
//! | `jsonl`          | TelemetrySink     | JSON-lines file             |
//! | `log_sink`       | TrialSink         | `log` records               |
//! |                  | TelemetrySink     |                             |
//! | `osc`            | SoftCodeDispatch  | OSC over UDP                |
//! | `outputs`        | OutputPort        | Log only (dry run)          |
//! | `pins`           | OutputPort        | embedded-hal GPIO / PWM     |
//! | `queue_source`   | EventSource       | Shared [`EventQueue`]       |
//! | `serial_device`  | HardwarePort      | OS serial port              |
//! | `sim`            | EventSource       | Scripted event list         |
//! | `stream_task`    | (worker)          | StreamDecoder → sink        |
//! | `time`           | (clock)           | Monotonic trial clock       |
//!
//! [`EventQueue`]: crate::events::EventQueue

pub mod jsonl;
pub mod log_sink;
pub mod osc;
pub mod outputs;
pub mod pins;
pub mod queue_source;
pub mod serial_device;
pub mod sim;
pub mod stream_task;
pub mod time;
