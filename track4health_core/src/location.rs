//! Location tracking with a single update channel.
//!
//! Position updates come from two producers: a periodic poll of a
//! [`LocationSource`] and pushed "watch" fixes. Both feed one channel that a
//! single background thread drains, so the last fix to arrive wins. The
//! [`TrackingHandle`] returned by [`LocationTracker::start`] owns that thread;
//! stopping or dropping it cancels both producers and joins the thread.

use crate::Location;
use chrono::{DateTime, Utc};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Something that can report the device position on demand
pub trait LocationSource: Send + 'static {
    fn current_fix(&mut self) -> Option<Location>;
}

/// Where a fix came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FixOrigin {
    Poll,
    Watch,
}

/// A position update as applied to the shared state
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fix {
    pub location: Location,
    pub origin: FixOrigin,
    pub received_at: DateTime<Utc>,
}

enum Message {
    Fix(Location),
    Stop,
}

/// Pushes watch-style fixes into a running tracker
#[derive(Clone)]
pub struct WatchSender {
    tx: Sender<Message>,
}

impl WatchSender {
    /// Returns false once tracking has stopped
    pub fn push(&self, location: Location) -> bool {
        self.tx.send(Message::Fix(location)).is_ok()
    }
}

/// Shortest accepted poll interval; anything below is raised to this
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

pub struct LocationTracker;

impl LocationTracker {
    /// Start polling `source` every `poll_interval`
    pub fn start<L: LocationSource>(source: L, poll_interval: Duration) -> TrackingHandle {
        Self::start_with(source, poll_interval, |_| {})
    }

    /// Like [`start`](Self::start), calling `on_fix` for every applied update
    pub fn start_with<L, F>(mut source: L, poll_interval: Duration, mut on_fix: F) -> TrackingHandle
    where
        L: LocationSource,
        F: FnMut(&Fix) + Send + 'static,
    {
        let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        let (tx, rx) = mpsc::channel();
        let latest: Arc<Mutex<Option<Fix>>> = Arc::new(Mutex::new(None));
        let shared = Arc::clone(&latest);

        let worker = std::thread::spawn(move || {
            let mut apply = |location: Location, origin: FixOrigin| {
                let fix = Fix {
                    location,
                    origin,
                    received_at: Utc::now(),
                };
                if let Ok(mut slot) = shared.lock() {
                    *slot = Some(fix);
                }
                on_fix(&fix);
            };

            let mut next_poll = Instant::now();
            loop {
                let now = Instant::now();
                if now >= next_poll {
                    if let Some(location) = source.current_fix() {
                        apply(location, FixOrigin::Poll);
                    }
                    next_poll = now + poll_interval;
                    continue;
                }

                match rx.recv_timeout(next_poll - now) {
                    Ok(Message::Fix(location)) => apply(location, FixOrigin::Watch),
                    Ok(Message::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
            }
            tracing::debug!("Location tracking stopped");
        });

        tracing::debug!("Location tracking started (poll every {:?})", poll_interval);
        TrackingHandle {
            tx,
            latest,
            worker: Some(worker),
        }
    }
}

/// Cancellation handle for a running tracker
pub struct TrackingHandle {
    tx: Sender<Message>,
    latest: Arc<Mutex<Option<Fix>>>,
    worker: Option<JoinHandle<()>>,
}

impl TrackingHandle {
    /// Most recently applied fix, from either producer
    pub fn latest(&self) -> Option<Fix> {
        self.latest.lock().ok().and_then(|slot| *slot)
    }

    /// A sender for watch-style updates feeding the same channel
    pub fn watch_sender(&self) -> WatchSender {
        WatchSender {
            tx: self.tx.clone(),
        }
    }

    /// Cancel polling and watching; no update is applied after this returns
    pub fn stop(mut self) -> Option<Fix> {
        self.shutdown();
        self.latest()
    }

    fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.tx.send(Message::Stop);
            if worker.join().is_err() {
                tracing::warn!("Location tracking thread panicked");
            }
        }
    }
}

impl Drop for TrackingHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
