//! Per-trial context.
//!
//! Replaces a process-wide session handle: everything a trial needs to know
//! about the rig is passed in explicitly, once per trial.

use crate::config::RigConfig;

#[derive(Debug, Clone)]
pub struct TrialContext {
    /// 1-based trial counter within the session.
    pub trial_number: u32,
    pub config: RigConfig,
}

impl TrialContext {
    pub fn new(trial_number: u32, config: RigConfig) -> Self {
        Self {
            trial_number,
            config,
        }
    }

    /// Context for the trial after this one.
    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            trial_number: self.trial_number + 1,
            config: self.config.clone(),
        }
    }
}

impl Default for TrialContext {
    fn default() -> Self {
        Self::new(1, RigConfig::default())
    }
}
