//! The recording side of the protocol: watches a `dom_model::LiveDocument`
//! for changes (spec.md §4.6), discovers and inlines assets along the way
//! (§4.5), and ships the resulting frames out over a transport (§4.10).
//!
//! A host embedder wires these together roughly like:
//! ```ignore
//! let mut doc = LiveDocument::new();
//! let mut detector = DomChangeDetector::new(base_url);
//! // ... mutate `doc` through `detector` (for removals) and directly
//! // (for inserts/attribute/text changes) as the page changes ...
//! let (keyframe, assets) = detector.keyframe(&doc)?;
//! client.send_frame(Frame::Keyframe { document: keyframe, viewport_width, viewport_height, asset_count: assets.len() as u32 }).await?;
//! for frame in detector.flush(&mut doc) {
//!     client.send_frame(frame).await?;
//! }
//! ```

mod change_detector;
mod recording_client;

pub use change_detector::DomChangeDetector;
pub use recording_client::{RecorderError, RecordingClient};

use std::time::Duration;

/// Tunables spec.md §9 leaves to the implementer: how long to wait for DOM
/// activity to settle before treating a batch as closed, how large a wire
/// chunk can grow before it's flushed, and how often to heartbeat an idle
/// connection.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub quiet_window: Duration,
    pub chunk_capacity: usize,
    pub heartbeat_interval: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        RecorderConfig {
            quiet_window: Duration::from_millis(500),
            chunk_capacity: frame_protocol::ChunkWriter::DEFAULT_CAPACITY,
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}
