//! Trialrig: behavioural-trial state machines and rig telemetry.
//!
//! Exposes the engine, the serial decoders and the host adapters for the
//! binary and for integration testing.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod fsm;
pub mod serial;
pub mod softcode;
pub mod timers;
