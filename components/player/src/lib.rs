//! The playback side of the protocol: decodes an inbound frame stream
//! (`frame_protocol`) and materializes/mutates a `dom_model::LiveDocument`
//! in place of a real browser DOM (spec.md §4.7/§4.8/§4.12).
//!
//! A host embedder wires these together roughly like:
//! ```ignore
//! let transport = connect_to_recording().await?;
//! let player = run_live(transport, PagePlayer::new()).await?;
//! render(player.document());
//! ```
//! or, for scheduled (virtual-clock) replay, via `PlaybackQueue` directly:
//! ```ignore
//! let mut queue = PlaybackQueue::new(PagePlayer::new());
//! for frame in decoded_frames {
//!     queue.enqueue_scheduled(frame);
//! }
//! queue.run_scheduled(epoch, playback_speed).await;
//! let player = queue.into_handler();
//! ```

mod asset_host;
mod dom_materializer;
mod dom_mutator;
mod node_map;
mod page_player;
mod playback_queue;

pub use asset_host::AssetHost;
pub use dom_materializer::{DomMaterializer, MaterializeError};
pub use dom_mutator::DomMutator;
pub use node_map::PlayerNodeMap;
pub use page_player::PagePlayer;
pub use playback_queue::{BoxFuture, FrameHandler, PlaybackQueue, StopHandle};

use frame_protocol::FrameChunkCodec;
use std::fmt;
use tokio::io::AsyncReadExt;
use tokio_util::codec::Decoder;

/// The one condition spec.md §7 marks terminal for playback: a malformed
/// frame stream. Every other per-frame problem (an open-frame mismatch, an
/// unknown node id on a structural op) is logged and the frame is dropped,
/// not propagated — a single bad frame must never take down the rest of a
/// recording.
#[derive(Debug)]
pub enum PlayerError {
    Io(std::io::Error),
}

impl fmt::Display for PlayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerError::Io(err) => write!(f, "playback transport error: {err}"),
        }
    }
}

impl std::error::Error for PlayerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlayerError::Io(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for PlayerError {
    fn from(err: std::io::Error) -> Self {
        PlayerError::Io(err)
    }
}

/// Decodes `transport` as a live frame stream and drives `player` with it
/// until a clean EOF, returning the player so the caller can read its final
/// document. Mirrors `recorder::RecordingClient`'s read loop: no
/// `tokio_util::codec::Framed`/`Sink`/`Stream` combinators (this workspace
/// has no `futures`/`futures-util` dependency), just `AsyncReadExt::read_buf`
/// into a `BytesMut` accumulator drained with `FrameChunkCodec::decode`
/// directly.
pub async fn run_live<S>(mut transport: S, player: PagePlayer) -> Result<PagePlayer, PlayerError>
where
    S: tokio::io::AsyncRead + Unpin,
{
    let mut decoder = FrameChunkCodec::new();
    let mut read_buf = bytes::BytesMut::new();
    let mut queue = PlaybackQueue::new(player);

    loop {
        while let Some(frame) = decoder.decode(&mut read_buf)? {
            queue.enqueue_live(frame).await;
        }
        let n = transport.read_buf(&mut read_buf).await?;
        if n == 0 {
            return Ok(queue.into_handler());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_protocol::{encode_payload, Frame};
    use node_id::NodeId;
    use tokio::io::duplex;

    #[tokio::test]
    async fn run_live_drains_a_frame_stream_and_returns_the_player_at_eof() {
        let (mut writer, reader) = duplex(4096);

        let mut buf = bytes::BytesMut::new();
        let mut payload = bytes::BytesMut::new();
        encode_payload(
            &Frame::Keyframe {
                document: dom_model::VDocument {
                    id: NodeId::from_raw(0),
                    children: vec![dom_model::VNode::Element(dom_model::VElement {
                        id: NodeId::from_raw(1),
                        tag: "div".to_string(),
                        namespace: None,
                        attrs: vec![],
                        children: vec![],
                        shadow: None,
                    })],
                    adopted_style_sheets: vec![],
                },
                viewport_width: 320,
                viewport_height: 240,
                asset_count: 0,
            },
            &mut payload,
        );
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&payload);

        tokio::io::AsyncWriteExt::write_all(&mut writer, &buf).await.unwrap();
        drop(writer);

        let player = run_live(reader, PagePlayer::new()).await.unwrap();
        assert_eq!(player.viewport(), (320, 240));
        assert!(player.node_ids().contains_id(NodeId::from_raw(1)));
    }

    #[tokio::test]
    async fn run_live_surfaces_a_malformed_length_prefix_as_an_error() {
        let (mut writer, reader) = duplex(4096);
        tokio::io::AsyncWriteExt::write_all(&mut writer, &(u32::MAX).to_be_bytes()).await.unwrap();
        drop(writer);

        let result = run_live(reader, PagePlayer::new()).await;
        assert!(result.is_err());
    }
}
