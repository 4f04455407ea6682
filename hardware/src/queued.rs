//! Non-blocking wrapper for blocking axis transports.
//!
//! Serial/Modbus drivers block for a full request/response round trip. The
//! control tick must not wait on that, so [`QueuedAxis`] moves the driver onto
//! a dedicated worker thread and feeds it through a bounded channel. Writes
//! return as soon as the request is queued; status queries answer from the
//! worker's most recent observation.
//!
//! A stop never waits in line. [`ServoAxis::stop`] raises a priority flag
//! that the worker checks before every request, so the driver sees the stop
//! as soon as its current call returns, and motion requests queued before
//! the stop are discarded. The stop is accepted even when the queue is full.
//! Alarm polls are coalesced: at most one is queued at a time.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, trace, warn};

use crate::axis::{AxisAlarm, AxisError, AxisResult, ServoAxis};

/// Default depth of the request queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
enum AxisRequest {
    Velocity(i32),
    TargetPosition(i64),
    Acceleration(u32),
    Stop,
    ClearAlarm,
    PollAlarm,
}

impl AxisRequest {
    /// Requests made obsolete by a later stop.
    fn is_superseded_by_stop(self) -> bool {
        matches!(
            self,
            AxisRequest::Velocity(_) | AxisRequest::TargetPosition(_) | AxisRequest::Stop
        )
    }
}

/// A request tagged with its submission order.
#[derive(Debug, Clone, Copy)]
struct Envelope {
    seq: u64,
    request: AxisRequest,
}

/// Flags the wrapper raises for the worker outside the FIFO.
#[derive(Debug, Default)]
struct Signals {
    /// Sequence number of the most recent stop; 0 when none was requested
    stop_seq: AtomicU64,
    /// An alarm poll is queued and not yet served
    poll_pending: AtomicBool,
}

/// Shared state between the wrapper and its worker thread.
#[derive(Debug, Default)]
struct WorkerStatus {
    connected: bool,
    alarm: Option<AxisAlarm>,
    last_error: Option<AxisError>,
}

/// A [`ServoAxis`] that forwards every request to a background worker.
pub struct QueuedAxis {
    name: String,
    tx: Option<Sender<Envelope>>,
    status: Arc<Mutex<WorkerStatus>>,
    signals: Arc<Signals>,
    handle: Option<JoinHandle<()>>,
    seq: u64,
    dropped: usize,
}

impl QueuedAxis {
    /// Move `axis` onto a worker thread with the default queue depth.
    pub fn spawn<A>(name: impl Into<String>, axis: A) -> Self
    where
        A: ServoAxis + Send + 'static,
    {
        Self::spawn_with_depth(name, axis, DEFAULT_QUEUE_DEPTH)
    }

    /// Move `axis` onto a worker thread fed by a queue of `depth` requests.
    pub fn spawn_with_depth<A>(name: impl Into<String>, axis: A, depth: usize) -> Self
    where
        A: ServoAxis + Send + 'static,
    {
        let name = name.into();
        let (tx, rx) = bounded(depth.max(1));
        let status = Arc::new(Mutex::new(WorkerStatus {
            connected: axis.is_connected(),
            ..Default::default()
        }));

        let signals = Arc::new(Signals::default());

        let status_clone = status.clone();
        let signals_clone = signals.clone();
        let worker_name = name.clone();
        let handle = thread::spawn(move || {
            Self::worker_loop(worker_name, axis, rx, status_clone, signals_clone);
        });

        Self {
            name,
            tx: Some(tx),
            status,
            signals,
            handle: Some(handle),
            seq: 0,
            dropped: 0,
        }
    }

    /// Number of requests dropped because the queue was full.
    pub fn dropped_requests(&self) -> usize {
        self.dropped
    }

    /// Last error reported by the underlying driver, if any.
    pub fn last_error(&self) -> Option<AxisError> {
        lock(&self.status).last_error.clone()
    }

    fn enqueue(&mut self, request: AxisRequest) -> AxisResult<()> {
        let tx = self.tx.as_ref().ok_or(AxisError::WorkerStopped)?;
        self.seq += 1;
        let envelope = Envelope {
            seq: self.seq,
            request,
        };
        match tx.try_send(envelope) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                warn!(
                    "{}: queue full, dropped {:?} ({} total)",
                    self.name, request, self.dropped
                );
                Err(AxisError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(AxisError::WorkerStopped),
        }
    }

    fn worker_loop<A: ServoAxis>(
        name: String,
        mut axis: A,
        rx: Receiver<Envelope>,
        status: Arc<Mutex<WorkerStatus>>,
        signals: Arc<Signals>,
    ) {
        debug!("{name}: axis worker started");
        let mut stopped_at = 0;
        for Envelope { seq, request } in rx.iter() {
            let pending_stop = signals.stop_seq.load(Ordering::Acquire);
            if pending_stop > stopped_at {
                stopped_at = pending_stop;
                Self::execute(&name, &mut axis, AxisRequest::Stop, &status);
            }

            if seq <= stopped_at && request.is_superseded_by_stop() {
                trace!("{name}: discarding {request:?} issued before stop");
                continue;
            }
            if request == AxisRequest::PollAlarm {
                signals.poll_pending.store(false, Ordering::Release);
            }
            Self::execute(&name, &mut axis, request, &status);
        }
        debug!("{name}: axis worker stopped");
    }

    fn execute<A: ServoAxis>(
        name: &str,
        axis: &mut A,
        request: AxisRequest,
        status: &Mutex<WorkerStatus>,
    ) {
        let result = match request {
            AxisRequest::Velocity(speed) => axis.write_velocity(speed),
            AxisRequest::TargetPosition(steps) => axis.write_target_position(steps),
            AxisRequest::Acceleration(accel) => axis.set_acceleration(accel),
            AxisRequest::Stop => axis.stop(),
            AxisRequest::ClearAlarm => axis.clear_alarm(),
            AxisRequest::PollAlarm => axis.read_alarm_status().map(|alarm| {
                lock(status).alarm = alarm;
            }),
        };

        let mut s = lock(status);
        s.connected = axis.is_connected();
        if let Err(e) = result {
            warn!("{name}: {request:?} failed: {e}");
            s.last_error = Some(e);
        }
    }
}

impl ServoAxis for QueuedAxis {
    fn write_velocity(&mut self, steps_per_sec: i32) -> AxisResult<()> {
        self.enqueue(AxisRequest::Velocity(steps_per_sec))
    }

    fn write_target_position(&mut self, steps: i64) -> AxisResult<()> {
        self.enqueue(AxisRequest::TargetPosition(steps))
    }

    fn set_acceleration(&mut self, steps_per_sec2: u32) -> AxisResult<()> {
        self.enqueue(AxisRequest::Acceleration(steps_per_sec2))
    }

    /// Preempts every queued motion request; never rejected for a full queue.
    fn stop(&mut self) -> AxisResult<()> {
        let tx = self.tx.as_ref().ok_or(AxisError::WorkerStopped)?;
        self.seq += 1;
        self.signals.stop_seq.store(self.seq, Ordering::Release);
        let envelope = Envelope {
            seq: self.seq,
            request: AxisRequest::Stop,
        };
        // The envelope only wakes an idle worker. When the queue is full the
        // worker already has a request to wake on and sees the flag first.
        match tx.try_send(envelope) {
            Ok(()) | Err(TrySendError::Full(_)) => Ok(()),
            Err(TrySendError::Disconnected(_)) => Err(AxisError::WorkerStopped),
        }
    }

    /// Requests a fresh poll and returns the previously cached status.
    fn read_alarm_status(&mut self) -> AxisResult<Option<AxisAlarm>> {
        if !self.signals.poll_pending.swap(true, Ordering::AcqRel)
            && self.enqueue(AxisRequest::PollAlarm).is_err()
        {
            // A full queue only delays the refresh.
            self.signals.poll_pending.store(false, Ordering::Release);
        }
        Ok(lock(&self.status).alarm.clone())
    }

    fn clear_alarm(&mut self) -> AxisResult<()> {
        self.enqueue(AxisRequest::ClearAlarm)
    }

    fn is_connected(&self) -> bool {
        lock(&self.status).connected
    }
}

impl Drop for QueuedAxis {
    fn drop(&mut self) {
        // Closing the channel ends the worker's receive loop.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("{}: axis worker panicked", self.name);
            }
        }
    }
}

fn lock(status: &Mutex<WorkerStatus>) -> MutexGuard<'_, WorkerStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}
