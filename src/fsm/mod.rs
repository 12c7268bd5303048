//! Table-driven trial state machines.
//!
//! ```text
//! ┌────────────────────────────┐  build()  ┌──────────────────────────┐
//! │ StateMachineDescription    │──────────▶│ Machine                  │
//! │  states (by name)          │           │  CompiledState table     │
//! │  global timers             │           │  transitions -> indices  │
//! │  initial state             │           │  timer linkage resolved  │
//! └────────────────────────────┘           └────────────┬─────────────┘
//!                                                       │ run()
//!                                                       ▼
//!                                          ┌──────────────────────────┐
//!                                          │ TrialRunner -> TrialLog  │
//!                                          └──────────────────────────┘
//! ```
//!
//! A description is built fresh for every trial, validated once, run once
//! by the [`TrialRunner`](crate::app::service::TrialRunner) and discarded.
//! Each state applies its output actions on entry, then waits for the
//! first of its own timeout (`Tup`), an external event, or a global timer
//! edge.  Events the current state has no transition for are ignored.

pub mod actions;
pub mod description;
pub mod log;
pub mod machine;

pub use actions::{OutputAction, OutputChannel};
pub use description::{EXIT, GlobalTimerConfig, State, StateMachineDescription, Target};
pub use self::log::{EventRecord, LogEntry, TrialData, TrialLog};
pub use machine::{CompiledState, MAX_GLOBAL_TIMER_ID, Machine, Next, build};
