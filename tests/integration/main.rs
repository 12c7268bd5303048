//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters.  All tests run on the host with no rig attached.

mod mock_hw;
mod runner_tests;
mod serial_tests;
