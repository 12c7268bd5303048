//! Background streaming worker.
//!
//! Runs a [`StreamDecoder`] on its own thread and feeds every sample (and
//! batch marker) to a [`TelemetrySink`].  The trial loop never blocks on
//! serial reads.
//!
//! ```text
//!   spawn ──▶ 'S' ──▶ poll ─┬─ sample ──▶ sink
//!                           ├─ timeout ─▶ retry
//!                           ├─ framing ─▶ warn, continue
//!                           └─ other ───▶ 'S', exit Err
//!   stop  ──▶ flag ──▶ 'S' ──▶ join ──▶ port back
//! ```

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use log::{error, info, warn};

use crate::app::ports::TelemetrySink;
use crate::error::SerialError;
use crate::serial::{HardwarePort, StreamDecoder};

/// Why a worker ended without a clean stop.
///
/// `port` is handed back whenever the thread itself survived, so the next
/// recording can reuse the handle.
#[derive(Debug)]
pub struct StreamFailure<P> {
    pub port: Option<P>,
    pub error: SerialError,
}

type Outcome<P> = Result<P, StreamFailure<P>>;

/// Dropping a running worker stops it the same way [`stop`](Self::stop)
/// does, and discards the port.
pub struct StreamWorker<P> {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Outcome<P>>>,
}

impl<P> StreamWorker<P>
where
    P: HardwarePort + Send + 'static,
{
    pub fn spawn<S>(decoder: StreamDecoder<P>, sink: S) -> io::Result<Self>
    where
        S: TelemetrySink + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("stream".into())
            .spawn(move || work(decoder, sink, &flag))?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Whether the worker has exited on its own.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Switch the stream off and return the port.
    pub fn stop(mut self) -> Outcome<P> {
        self.join()
    }
}

impl<P> StreamWorker<P> {
    fn join(&mut self) -> Outcome<P> {
        self.stop.store(true, Ordering::Release);
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(outcome)) => outcome,
            Some(Err(_)) | None => Err(StreamFailure {
                port: None,
                error: SerialError::WorkerLost,
            }),
        }
    }
}

impl<P> Drop for StreamWorker<P> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(failure) = self.join() {
                warn!("Stream worker dropped after failure: {}", failure.error);
            }
        }
    }
}

fn work<P, S>(mut decoder: StreamDecoder<P>, mut sink: S, stop: &AtomicBool) -> Outcome<P>
where
    P: HardwarePort,
    S: TelemetrySink,
{
    let failed = |decoder: StreamDecoder<P>, error| StreamFailure {
        port: Some(decoder.into_inner()),
        error,
    };

    if let Err(e) = decoder.start() {
        return Err(failed(decoder, e));
    }
    while !stop.load(Ordering::Acquire) {
        match decoder.poll() {
            Ok(reading) => {
                sink.record(&reading.sample);
                if let Some(batch) = reading.batch {
                    sink.record(&batch);
                }
            }
            Err(SerialError::Timeout { .. }) => thread::yield_now(),
            Err(e @ SerialError::Framing { .. }) => warn!("Stream: {}", e),
            Err(e) => {
                error!("Stream worker exiting: {}", e);
                if let Err(stop_err) = decoder.stop() {
                    warn!("Stream stop failed: {}", stop_err);
                }
                return Err(failed(decoder, e));
            }
        }
    }
    if let Err(e) = decoder.stop() {
        return Err(failed(decoder, e));
    }
    info!("Stream worker stopped after {} samples", decoder.samples());
    Ok(decoder.into_inner())
}
