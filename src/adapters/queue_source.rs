//! Live event source over the shared [`EventQueue`].
//!
//! ```text
//!  ┌────────────────────────────────────────────────────────┐
//!  │  QueueEventSource::wait(deadline)                      │
//!  │                                                        │
//!  │  futures_lite::future::block_on(                       │
//!  │      queue.pop()                                       │
//!  │   or queue.wait_abort()                                │
//!  │   or async_io_mini::Timer::after(deadline - now))      │
//!  └────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_lite::future::{block_on, or};

use super::time::MonotonicClock;
use crate::app::ports::{EventSource, Wait};
use crate::events::{EventQueue, QueuedEvent};

/// Wakes a waiting [`QueueEventSource`] and aborts its trial.
#[derive(Clone)]
pub struct AbortHandle {
    queue: Arc<EventQueue>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.queue.abort();
    }
}

/// Real-time event source.  Producers push into the queue from any thread.
pub struct QueueEventSource {
    queue: Arc<EventQueue>,
    clock: MonotonicClock,
}

enum Woken {
    Event(QueuedEvent),
    Abort,
    Deadline,
}

impl QueueEventSource {
    pub fn new(queue: Arc<EventQueue>) -> Self {
        Self {
            queue,
            clock: MonotonicClock::new(),
        }
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            queue: Arc::clone(&self.queue),
        }
    }

    fn deliver(&self, queued: QueuedEvent) -> Wait {
        Wait::Event(queued.event, self.clock.since_origin(queued.at))
    }
}

impl EventSource for QueueEventSource {
    /// Restart the clock and drop anything queued before the trial.
    fn start(&mut self) {
        self.queue.reset();
        self.clock.restart();
    }

    fn now(&self) -> Duration {
        self.clock.elapsed()
    }

    fn try_next(&mut self) -> Option<Wait> {
        if self.queue.is_aborted() {
            return Some(Wait::Aborted);
        }
        self.queue.try_pop().map(|queued| self.deliver(queued))
    }

    fn wait(&mut self, deadline: Option<Duration>) -> Wait {
        if let Some(ready) = self.try_next() {
            return ready;
        }

        let queue = &*self.queue;
        let event = async { Woken::Event(queue.pop().await) };
        let abort = async {
            queue.wait_abort().await;
            Woken::Abort
        };

        let woken = match deadline {
            Some(at) => {
                let remaining = at.saturating_sub(self.clock.elapsed());
                if remaining.is_zero() {
                    return Wait::Deadline;
                }
                let timer = async {
                    async_io_mini::Timer::after(remaining).await;
                    Woken::Deadline
                };
                block_on(or(abort, or(event, timer)))
            }
            None => block_on(or(abort, event)),
        };

        match woken {
            Woken::Event(queued) => self.deliver(queued),
            Woken::Abort => Wait::Aborted,
            Woken::Deadline => Wait::Deadline,
        }
    }
}
