//! [`PlaybackQueue`] (spec.md §4.11): one ordered run of time buckets, fed
//! from either a live feed (dispatch as fast as possible, preserving order)
//! or a scheduled replay (dispatch against a virtual clock).
//!
//! There is no `async-trait` dependency in this workspace, so the handler
//! seam below is the same hand-expansion `async-trait` itself generates: a
//! boxed, pinned `Future` returned from a plain trait method.

use frame_protocol::Frame;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

pub type BoxFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Receives frames one at a time, strictly sequentially: `PlaybackQueue`
/// never begins a new call before the previous one's future resolves.
pub trait FrameHandler: Send {
    fn handle<'a>(&'a mut self, frame: Frame) -> BoxFuture<'a>;
}

struct TimeBucket {
    timestamp_ms: i64,
    frames: VecDeque<Frame>,
}

/// A cloneable cancellation token for a [`PlaybackQueue`]'s scheduled-mode
/// run loop, since `run_scheduled` holds `&mut self` for its entire
/// lifetime and nothing else could otherwise signal it.
#[derive(Clone)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl StopHandle {
    /// Requests that the run loop stop at its next opportunity. In-flight
    /// handler invocations are allowed to finish (spec.md §4.11/§5); there
    /// is no resume beyond continuing to enqueue.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }
}

pub struct PlaybackQueue<H: FrameHandler> {
    handler: H,
    buckets: VecDeque<TimeBucket>,
    last_timestamp_ms: i64,
    draining: bool,
    operation_in_flight: bool,
    stopped: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl<H: FrameHandler> PlaybackQueue<H> {
    pub fn new(handler: H) -> Self {
        PlaybackQueue {
            handler,
            buckets: VecDeque::new(),
            last_timestamp_ms: 0,
            draining: false,
            operation_in_flight: false,
            stopped: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle { stopped: self.stopped.clone(), wake: self.wake.clone() }
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|b| b.frames.is_empty())
    }

    fn open_bucket(&mut self, timestamp_ms: i64) {
        self.buckets.push_back(TimeBucket { timestamp_ms, frames: VecDeque::new() });
    }

    fn append(&mut self, frame: Frame) {
        if self.buckets.is_empty() {
            self.open_bucket(self.last_timestamp_ms);
        }
        self.buckets.back_mut().expect("just ensured non-empty").frames.push_back(frame);
    }

    /// Pops the next frame in document order, dropping any bucket whose
    /// frames have all been drained and recording its timestamp as the
    /// last-played one.
    fn pop_front_frame(&mut self) -> Option<Frame> {
        while let Some(bucket) = self.buckets.front_mut() {
            if let Some(frame) = bucket.frames.pop_front() {
                return Some(frame);
            }
            self.last_timestamp_ms = bucket.timestamp_ms;
            self.buckets.pop_front();
        }
        None
    }

    async fn dispatch(&mut self, frame: Frame) {
        self.operation_in_flight = true;
        self.handler.handle(frame).await;
        self.operation_in_flight = false;
    }

    /// Live-mode entry point. `Timestamp` frames only open a bucket and
    /// are never themselves dispatched to the handler.
    pub async fn enqueue_live(&mut self, frame: Frame) {
        if let Frame::Timestamp { timestamp_ms } = frame {
            self.open_bucket(timestamp_ms);
            return;
        }
        let dispatch_now = self.buckets.is_empty() && !self.operation_in_flight && !self.draining;
        if dispatch_now {
            self.dispatch(frame).await;
            // A reentrant enqueue that arrived while the handler above was
            // awaiting would have had nowhere to go but a fresh bucket;
            // drain it before returning so nothing is stranded.
            self.drain_live().await;
        } else {
            self.append(frame);
            self.drain_live().await;
        }
    }

    async fn drain_live(&mut self) {
        if self.draining {
            return;
        }
        self.draining = true;
        while !self.operation_in_flight {
            let Some(frame) = self.pop_front_frame() else { break };
            self.dispatch(frame).await;
        }
        self.draining = false;
    }

    /// Scheduled-mode entry point: only enqueues. `run_scheduled` drains
    /// against the virtual clock.
    pub fn enqueue_scheduled(&mut self, frame: Frame) {
        match frame {
            Frame::Timestamp { timestamp_ms } => self.open_bucket(timestamp_ms),
            other => self.append(other),
        }
        self.wake.notify_one();
    }

    /// Runs the scheduled-mode drain loop against virtual time
    /// `elapsed = (now - epoch) / playback_speed` (spec.md §4.11's literal
    /// formula) until `stop_handle().stop()` is called or the caller drops
    /// the future. Returns once stopped; does not drain a final time after
    /// `stopped` flips, matching "in-flight operations are allowed to
    /// finish" rather than "drain everything outstanding".
    pub async fn run_scheduled(&mut self, epoch: Instant, playback_speed: f64) {
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return;
            }
            let Some(due_ms) = self.buckets.front().map(|b| b.timestamp_ms) else {
                self.wake.notified().await;
                continue;
            };
            let elapsed_ms = virtual_elapsed_ms(epoch, playback_speed);
            if elapsed_ms >= due_ms as f64 {
                if let Some(frame) = self.pop_front_frame() {
                    self.dispatch(frame).await;
                }
                // Re-check after each drain step: processing may itself
                // take real time, changing what's now due.
                continue;
            }
            let gap_virtual_ms = due_ms as f64 - elapsed_ms;
            let wait = Duration::from_secs_f64(((gap_virtual_ms * playback_speed) / 1000.0).max(0.0));
            tokio::select! {
                _ = tokio::time::sleep(wait) => {},
                _ = self.wake.notified() => {},
            }
        }
    }
}

fn virtual_elapsed_ms(epoch: Instant, playback_speed: f64) -> f64 {
    Instant::now().saturating_duration_since(epoch).as_secs_f64() * 1000.0 / playback_speed
}
