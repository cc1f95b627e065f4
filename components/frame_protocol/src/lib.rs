//! Wire encoding for the frame stream a recorder emits and a player
//! consumes: primitive field codecs, the nested virtual-tree encoding
//! they build on, the tagged `Frame` enum, and the length-prefixed chunk
//! codec that turns a byte stream into a sequence of frames.

mod codec;
mod frame;
mod vdoc;
mod wire;

pub use codec::{ChunkWriter, FrameChunkCodec};
pub use frame::{decode_payload, encode_payload, node_id_from_wire, node_id_to_wire, Frame, FrameTag};
pub use vdoc::{decode_style_sheet, decode_style_sheet_id, decode_vdocument, decode_vnode, encode_style_sheet, encode_style_sheet_id, encode_vdocument, encode_vnode};
pub use wire::DecodeError;
