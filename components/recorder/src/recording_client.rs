//! [`RecordingClient`] (spec.md §4.10): owns the wire side of a recording
//! session — handshake, heartbeats, chunked writes, and the cache-manifest
//! optimization that lets a returning viewer skip re-sending bytes it
//! already has.
//!
//! The workspace's `tokio` feature set has no `"net"` and there is no
//! `futures`/`futures-util` dependency, so this does not drive
//! `tokio_util::codec::Framed`'s `Sink`/`Stream` combinators. Instead it
//! pushes encoded frames through the already-buffering `ChunkWriter` and
//! writes whole chunks out with `AsyncWriteExt::write_all`, and decodes
//! inbound bytes by feeding `AsyncReadExt::read_buf` into a `BytesMut`
//! accumulator and draining it with `FrameChunkCodec::decode` directly —
//! the same two primitives `frame_protocol` already exposes for this
//! purpose, with no new dependency.

use frame_protocol::{ChunkWriter, Frame, FrameChunkCodec};
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::codec::Decoder;

#[derive(Debug)]
pub enum RecorderError {
    /// The peer closed the connection (a clean EOF on the read half).
    TransportClosed,
    Io(std::io::Error),
}

impl fmt::Display for RecorderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecorderError::TransportClosed => write!(f, "recording transport closed"),
            RecorderError::Io(err) => write!(f, "recording transport error: {err}"),
        }
    }
}

impl std::error::Error for RecorderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RecorderError::TransportClosed => None,
            RecorderError::Io(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for RecorderError {
    fn from(err: std::io::Error) -> Self {
        RecorderError::Io(err)
    }
}

/// Drives the wire protocol for one recording session over `S`. Transport
/// selection (TCP, a Unix socket, an in-memory duplex for tests) is the
/// caller's concern — this type only knows how to frame and sequence.
pub struct RecordingClient<S> {
    transport: S,
    chunk: ChunkWriter,
    decoder: FrameChunkCodec,
    read_buf: bytes::BytesMut,
    heartbeat_interval: Duration,
    last_activity: Instant,
    /// sha256 hex digest -> url, learned from inbound `CacheManifest`
    /// frames. An outgoing `Asset` whose bytes hash to a known entry is
    /// rewritten into an `AssetReference` so the bytes are never resent.
    manifest: FxHashMap<String, String>,
}

impl<S> RecordingClient<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    /// Opens the session: sends `RecordingMetadata` immediately (spec.md
    /// §4.10 responsibility 1) and flushes it before returning.
    pub async fn connect(
        transport: S,
        initial_url: String,
        config: &crate::RecorderConfig,
    ) -> Result<Self, RecorderError> {
        let mut client = RecordingClient {
            transport,
            chunk: ChunkWriter::new(config.chunk_capacity),
            decoder: FrameChunkCodec::new(),
            read_buf: bytes::BytesMut::new(),
            heartbeat_interval: config.heartbeat_interval,
            last_activity: Instant::now(),
            manifest: FxHashMap::default(),
        };
        client
            .send_frame(Frame::RecordingMetadata {
                initial_url,
                heartbeat_interval_seconds: config.heartbeat_interval.as_secs() as u32,
            })
            .await?;
        client.flush().await?;
        Ok(client)
    }

    /// Pushes `frame` into the outgoing chunk buffer, substituting a cached
    /// `AssetReference` for an `Asset` whose bytes the peer already has
    /// (spec.md §4.10 responsibility 5). Writes a full chunk out as soon as
    /// one accumulates.
    pub async fn send_frame(&mut self, frame: Frame) -> Result<(), RecorderError> {
        let frame = self.substitute_cached_asset(frame);
        if let Some(chunk) = self.chunk.push(frame)? {
            self.transport.write_all(&chunk).await?;
        }
        self.last_activity = Instant::now();
        Ok(())
    }

    /// Flushes any partially-filled chunk out to the transport regardless
    /// of size.
    pub async fn flush(&mut self) -> Result<(), RecorderError> {
        if let Some(chunk) = self.chunk.flush() {
            self.transport.write_all(&chunk).await?;
        }
        Ok(())
    }

    /// Whether `heartbeat_interval` has elapsed since the last frame was
    /// queued (spec.md §4.10 responsibility 3).
    pub fn heartbeat_due(&self) -> bool {
        self.last_activity.elapsed() >= self.heartbeat_interval
    }

    /// Sends a `Heartbeat` and flushes it if (and only if) one is due.
    /// Returns whether it sent one.
    pub async fn send_heartbeat_if_due(&mut self) -> Result<bool, RecorderError> {
        if !self.heartbeat_due() {
            return Ok(false);
        }
        self.send_frame(Frame::Heartbeat).await?;
        self.flush().await?;
        Ok(true)
    }

    /// Reads and decodes the next inbound frame, transparently folding any
    /// `CacheManifest` into this client's manifest (spec.md §4.10
    /// responsibility 4) rather than surfacing it to the caller. Returns
    /// `Ok(None)` if the transport reached a clean EOF mid-frame boundary.
    pub async fn recv_frame(&mut self) -> Result<Option<Frame>, RecorderError> {
        loop {
            if let Some(frame) = self.decoder.decode(&mut self.read_buf).map_err(RecorderError::Io)? {
                match frame {
                    Frame::CacheManifest { entries } => {
                        for (url, sha256) in entries {
                            self.manifest.insert(sha256, url);
                        }
                        continue;
                    },
                    other => return Ok(Some(other)),
                }
            }
            let n = self.transport.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return if self.read_buf.is_empty() { Ok(None) } else { Err(RecorderError::TransportClosed) };
            }
        }
    }

    fn substitute_cached_asset(&self, frame: Frame) -> Frame {
        let Frame::Asset { asset_id, url, mime, bytes } = &frame else { return frame };
        if bytes.is_empty() {
            return frame;
        }
        let sha256 = sha256_hex(bytes);
        match self.manifest.get(&sha256) {
            Some(_) => Frame::AssetReference { asset_id: *asset_id, url: url.clone(), sha256, mime: mime.clone() },
            None => frame,
        }
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn connect_sends_recording_metadata_first() {
        let (client_side, mut server_side) = duplex(4096);
        let _client =
            RecordingClient::connect(client_side, "https://example.com".to_string(), &crate::RecorderConfig::default())
                .await
                .unwrap();

        let mut buf = bytes::BytesMut::new();
        let mut decoder = FrameChunkCodec::new();
        loop {
            let n = server_side.read_buf(&mut buf).await.unwrap();
            assert!(n > 0);
            if let Some(frame) = decoder.decode(&mut buf).unwrap() {
                assert!(matches!(frame, Frame::RecordingMetadata { .. }));
                break;
            }
        }
    }

    #[tokio::test]
    async fn cache_manifest_suppresses_matching_asset_bytes() {
        let (client_side, mut server_side) = duplex(1 << 20);
        let mut client =
            RecordingClient::connect(client_side, "https://example.com".to_string(), &crate::RecorderConfig::default())
                .await
                .unwrap();
        // Drain the handshake frame server-side so it isn't mixed into what
        // we read back below.
        let mut server_buf = bytes::BytesMut::new();
        let mut server_decoder = FrameChunkCodec::new();
        server_side.read_buf(&mut server_buf).await.unwrap();
        server_decoder.decode(&mut server_buf).unwrap();

        let bytes = b"hello world".to_vec();
        let sha256 = sha256_hex(&bytes);
        client.manifest.insert(sha256.clone(), "https://example.com/cached.png".to_string());

        client
            .send_frame(Frame::Asset { asset_id: 1, url: "https://example.com/cached.png".to_string(), mime: None, bytes })
            .await
            .unwrap();
        client.flush().await.unwrap();

        server_side.read_buf(&mut server_buf).await.unwrap();
        let frame = server_decoder.decode(&mut server_buf).unwrap().unwrap();
        match frame {
            Frame::AssetReference { sha256: got, .. } => assert_eq!(got, sha256),
            other => panic!("expected AssetReference, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn heartbeat_due_reflects_the_configured_interval() {
        let (client_side, _server_side) = duplex(4096);
        let config = crate::RecorderConfig { heartbeat_interval: Duration::from_secs(3600), ..Default::default() };
        let client =
            RecordingClient::connect(client_side, "https://example.com".to_string(), &config).await.unwrap();
        assert!(!client.heartbeat_due());
    }

    #[tokio::test]
    async fn recv_frame_returns_none_on_clean_eof() {
        let (client_side, server_side) = duplex(4096);
        let mut client =
            RecordingClient::connect(client_side, "https://example.com".to_string(), &crate::RecorderConfig::default())
                .await
                .unwrap();
        drop(server_side);
        assert!(client.recv_frame().await.unwrap().is_none());
    }
}
