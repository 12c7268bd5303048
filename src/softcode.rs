//! Soft-code dispatch to the external stimulus controller.
//!
//! A soft code is a small integer a state emits as an output action to ask
//! an external process for a side effect (play a tone, start a camera).
//! Dispatch is fire-and-forget: no acknowledgement, no retry, and it never
//! waits for the effect to happen.  Meanings are defined entirely by the
//! controller on the other side.
//!
//! ```text
//!   TrialRunner ──dispatch(code)──▶ SoftCodeDispatch
//!                                     ├─ OscDispatcher      (UDP / OSC)
//!                                     ├─ CallbackDispatcher (in-process)
//!                                     ├─ BackgroundDispatcher (worker thread)
//!                                     └─ NullDispatcher
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use futures_lite::future::block_on;
use log::{debug, warn};

/// Upper bound on how long a dispatch may take to leave the engine
/// (one display frame at 60 Hz).
pub const DISPATCH_BUDGET_US: u64 = 16_700;

/// Sends soft codes to whatever is listening.  Must not block.
pub trait SoftCodeDispatch {
    fn dispatch(&mut self, code: u8);
}

impl<T: SoftCodeDispatch + ?Sized> SoftCodeDispatch for Box<T> {
    fn dispatch(&mut self, code: u8) {
        (**self).dispatch(code);
    }
}

/// Discards every code.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDispatcher;

impl SoftCodeDispatch for NullDispatcher {
    fn dispatch(&mut self, code: u8) {
        debug!("SoftCode {} discarded", code);
    }
}

/// Runs a local handler for every code, on the caller's thread.
///
/// The handler must return quickly; wrap it in a [`BackgroundDispatcher`]
/// if it does real work.
pub struct CallbackDispatcher<F> {
    handler: F,
}

impl<F: FnMut(u8)> CallbackDispatcher<F> {
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F: FnMut(u8)> SoftCodeDispatch for CallbackDispatcher<F> {
    fn dispatch(&mut self, code: u8) {
        (self.handler)(code);
    }
}

// ───────────────────────────────────────────────────────────────
// Background dispatch
// ───────────────────────────────────────────────────────────────

const BACKGROUND_DEPTH: usize = 16;

enum Job {
    Code(u8),
    Stop,
}

type JobChannel = Channel<CriticalSectionRawMutex, Job, BACKGROUND_DEPTH>;

/// Hands codes to a worker thread that drives the wrapped dispatcher, so a
/// slow handler never stalls the trial.  Codes are dropped with a warning
/// when the worker falls behind.
pub struct BackgroundDispatcher {
    jobs: Arc<JobChannel>,
    worker: Option<JoinHandle<()>>,
    dropped: u32,
}

impl BackgroundDispatcher {
    pub fn spawn<D>(mut inner: D) -> Self
    where
        D: SoftCodeDispatch + Send + 'static,
    {
        let jobs: Arc<JobChannel> = Arc::new(Channel::new());
        let rx = Arc::clone(&jobs);
        let worker = thread::Builder::new()
            .name("softcode".into())
            .spawn(move || {
                loop {
                    match block_on(rx.receive()) {
                        Job::Code(code) => inner.dispatch(code),
                        Job::Stop => break,
                    }
                }
            })
            .map_err(|e| warn!("SoftCode worker failed to start: {}", e))
            .ok();
        Self {
            jobs,
            worker,
            dropped: 0,
        }
    }

    /// Codes discarded because the worker queue was full.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

impl SoftCodeDispatch for BackgroundDispatcher {
    fn dispatch(&mut self, code: u8) {
        if self.worker.is_none() || self.jobs.try_send(Job::Code(code)).is_err() {
            self.dropped += 1;
            warn!("SoftCode {} dropped (worker unavailable or busy)", code);
        }
    }
}

impl Drop for BackgroundDispatcher {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            // A dead worker never drains the queue.
            while self.jobs.try_send(Job::Stop).is_err() && !worker.is_finished() {
                thread::sleep(Duration::from_millis(1));
            }
            if worker.join().is_err() {
                warn!("SoftCode worker panicked");
            }
        }
    }
}
