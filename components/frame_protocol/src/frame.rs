//! The frame-type registry (spec.md §4.9/§6) and each frame's field
//! encoding. Field order is part of the specification: writer and reader
//! must agree on it exactly, so every `encode_payload`/`decode_payload`
//! arm below lists fields in the same order spec.md §6 gives for the
//! frames it spells out, and follows "the same discipline" for the ones
//! it leaves to the implementer.

use crate::vdoc::{self, decode_style_sheet, decode_style_sheet_id, encode_style_sheet, encode_style_sheet_id};
use crate::wire::{self, DecodeError, Reader};
use bytes::BytesMut;
use dom_model::{VDocument, VNode, VStyleSheet};
use node_id::NodeId;
use text_diff::TextOp;

macro_rules! tags {
    ($($tag:expr => $name:ident),+ $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum FrameTag { $($name = $tag),+ }

        impl FrameTag {
            pub fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $($tag => Some(FrameTag::$name),)+
                    _ => None,
                }
            }
        }
    };
}

tags! {
    0 => Timestamp,
    1 => Keyframe,
    2 => Asset,
    3 => ViewportResized,
    4 => WindowScrolled,
    5 => MouseMoved,
    6 => MouseClicked,
    7 => KeyPressed,
    8 => ElementFocused,
    9 => TextSelectionChanged,
    10 => DomNodeAdded,
    11 => DomNodeRemoved,
    12 => DomAttributeChanged,
    13 => DomAttributeRemoved,
    14 => DomTextChanged,
    15 => DomNodeResized,
    16 => AdoptedStyleSheetsChanged,
    17 => AdoptedStyleSheetAdded,
    18 => ElementScrolled,
    19 => ElementBlurred,
    20 => WindowFocused,
    21 => WindowBlurred,
    22 => RecordingMetadata,
    23 => Heartbeat,
    24 => AssetReference,
    25 => CacheManifest,
    // [ADDED] spec.md §9's form-field property-change frame (SPEC_FULL.md
    // §4 "Supplemented feature"): same tagged-structure discipline as any
    // other structural op.
    26 => DomNodePropertyChanged,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Timestamp { timestamp_ms: i64 },
    Keyframe { document: VDocument, viewport_width: u32, viewport_height: u32, asset_count: u32 },
    Asset { asset_id: u32, url: String, mime: Option<String>, bytes: Vec<u8> },
    ViewportResized { width: u32, height: u32 },
    WindowScrolled { x: f64, y: f64 },
    MouseMoved { x: f64, y: f64 },
    MouseClicked { x: f64, y: f64, button: u32 },
    KeyPressed { key: String },
    ElementFocused { node_id: u32 },
    TextSelectionChanged { start_node_id: u32, start_offset: u32, end_node_id: u32, end_offset: u32 },
    DomNodeAdded { parent_node_id: u32, index: u32, node: VNode, asset_count: u32 },
    DomNodeRemoved { node_id: u32 },
    DomAttributeChanged { node_id: u32, name: String, value: String },
    DomAttributeRemoved { node_id: u32, name: String },
    DomTextChanged { node_id: u32, ops: Vec<TextOp> },
    DomNodeResized { node_id: u32, width: f64, height: f64 },
    AdoptedStyleSheetsChanged { target_node_id: u32, sheet_ids: Vec<dom_model::StyleSheetId> },
    AdoptedStyleSheetAdded { target_node_id: u32, sheet: VStyleSheet, asset_count: u32 },
    ElementScrolled { node_id: u32, x: f64, y: f64 },
    ElementBlurred { node_id: u32 },
    WindowFocused,
    WindowBlurred,
    RecordingMetadata { initial_url: String, heartbeat_interval_seconds: u32 },
    Heartbeat,
    AssetReference { asset_id: u32, url: String, sha256: String, mime: Option<String> },
    CacheManifest { entries: Vec<(String, String)> },
    DomNodePropertyChanged { node_id: u32, name: String, value: String },
}

impl Frame {
    pub fn tag(&self) -> FrameTag {
        match self {
            Frame::Timestamp { .. } => FrameTag::Timestamp,
            Frame::Keyframe { .. } => FrameTag::Keyframe,
            Frame::Asset { .. } => FrameTag::Asset,
            Frame::ViewportResized { .. } => FrameTag::ViewportResized,
            Frame::WindowScrolled { .. } => FrameTag::WindowScrolled,
            Frame::MouseMoved { .. } => FrameTag::MouseMoved,
            Frame::MouseClicked { .. } => FrameTag::MouseClicked,
            Frame::KeyPressed { .. } => FrameTag::KeyPressed,
            Frame::ElementFocused { .. } => FrameTag::ElementFocused,
            Frame::TextSelectionChanged { .. } => FrameTag::TextSelectionChanged,
            Frame::DomNodeAdded { .. } => FrameTag::DomNodeAdded,
            Frame::DomNodeRemoved { .. } => FrameTag::DomNodeRemoved,
            Frame::DomAttributeChanged { .. } => FrameTag::DomAttributeChanged,
            Frame::DomAttributeRemoved { .. } => FrameTag::DomAttributeRemoved,
            Frame::DomTextChanged { .. } => FrameTag::DomTextChanged,
            Frame::DomNodeResized { .. } => FrameTag::DomNodeResized,
            Frame::AdoptedStyleSheetsChanged { .. } => FrameTag::AdoptedStyleSheetsChanged,
            Frame::AdoptedStyleSheetAdded { .. } => FrameTag::AdoptedStyleSheetAdded,
            Frame::ElementScrolled { .. } => FrameTag::ElementScrolled,
            Frame::ElementBlurred { .. } => FrameTag::ElementBlurred,
            Frame::WindowFocused => FrameTag::WindowFocused,
            Frame::WindowBlurred => FrameTag::WindowBlurred,
            Frame::RecordingMetadata { .. } => FrameTag::RecordingMetadata,
            Frame::Heartbeat => FrameTag::Heartbeat,
            Frame::AssetReference { .. } => FrameTag::AssetReference,
            Frame::CacheManifest { .. } => FrameTag::CacheManifest,
            Frame::DomNodePropertyChanged { .. } => FrameTag::DomNodePropertyChanged,
        }
    }
}

fn encode_text_op(buf: &mut BytesMut, op: &TextOp) {
    match op {
        TextOp::Insert { index, content } => {
            wire::write_u8(buf, 0);
            wire::write_u32(buf, *index as u32);
            wire::write_string(buf, content);
        },
        TextOp::Remove { index, count } => {
            wire::write_u8(buf, 1);
            wire::write_u32(buf, *index as u32);
            wire::write_u32(buf, *count as u32);
        },
    }
}

fn decode_text_op(reader: &mut Reader) -> Result<TextOp, DecodeError> {
    match reader.read_u8()? {
        0 => {
            let index = reader.read_u32()? as usize;
            let content = reader.read_string()?;
            Ok(TextOp::Insert { index, content })
        },
        1 => {
            let index = reader.read_u32()? as usize;
            let count = reader.read_u32()? as usize;
            Ok(TextOp::Remove { index, count })
        },
        other => Err(DecodeError::UnknownTypeTag(other)),
    }
}

pub fn encode_payload(frame: &Frame, buf: &mut BytesMut) {
    wire::write_u8(buf, frame.tag() as u8);
    match frame {
        Frame::Timestamp { timestamp_ms } => wire::write_i64(buf, *timestamp_ms),
        Frame::Keyframe { document, viewport_width, viewport_height, asset_count } => {
            vdoc::encode_vdocument(buf, document);
            wire::write_u32(buf, *viewport_width);
            wire::write_u32(buf, *viewport_height);
            wire::write_u32(buf, *asset_count);
        },
        Frame::Asset { asset_id, url, mime, bytes } => {
            wire::write_u32(buf, *asset_id);
            wire::write_string(buf, url);
            wire::write_opt_string(buf, mime);
            wire::write_bytes(buf, bytes);
        },
        Frame::ViewportResized { width, height } => {
            wire::write_u32(buf, *width);
            wire::write_u32(buf, *height);
        },
        Frame::WindowScrolled { x, y } => {
            wire::write_f64(buf, *x);
            wire::write_f64(buf, *y);
        },
        Frame::MouseMoved { x, y } => {
            wire::write_f64(buf, *x);
            wire::write_f64(buf, *y);
        },
        Frame::MouseClicked { x, y, button } => {
            wire::write_f64(buf, *x);
            wire::write_f64(buf, *y);
            wire::write_u32(buf, *button);
        },
        Frame::KeyPressed { key } => wire::write_string(buf, key),
        Frame::ElementFocused { node_id } => wire::write_u32(buf, *node_id),
        Frame::TextSelectionChanged { start_node_id, start_offset, end_node_id, end_offset } => {
            wire::write_u32(buf, *start_node_id);
            wire::write_u32(buf, *start_offset);
            wire::write_u32(buf, *end_node_id);
            wire::write_u32(buf, *end_offset);
        },
        Frame::DomNodeAdded { parent_node_id, index, node, asset_count } => {
            wire::write_u32(buf, *parent_node_id);
            wire::write_u32(buf, *index);
            vdoc::encode_vnode(buf, node);
            wire::write_u32(buf, *asset_count);
        },
        Frame::DomNodeRemoved { node_id } => wire::write_u32(buf, *node_id),
        Frame::DomAttributeChanged { node_id, name, value } => {
            wire::write_u32(buf, *node_id);
            wire::write_string(buf, name);
            wire::write_string(buf, value);
        },
        Frame::DomAttributeRemoved { node_id, name } => {
            wire::write_u32(buf, *node_id);
            wire::write_string(buf, name);
        },
        Frame::DomTextChanged { node_id, ops } => {
            wire::write_u32(buf, *node_id);
            wire::write_array(buf, ops, |buf, op| encode_text_op(buf, op));
        },
        Frame::DomNodeResized { node_id, width, height } => {
            wire::write_u32(buf, *node_id);
            wire::write_f64(buf, *width);
            wire::write_f64(buf, *height);
        },
        Frame::AdoptedStyleSheetsChanged { target_node_id, sheet_ids } => {
            wire::write_u32(buf, *target_node_id);
            wire::write_array(buf, sheet_ids, |buf, id| encode_style_sheet_id(buf, *id));
        },
        Frame::AdoptedStyleSheetAdded { target_node_id, sheet, asset_count } => {
            wire::write_u32(buf, *target_node_id);
            encode_style_sheet(buf, sheet);
            wire::write_u32(buf, *asset_count);
        },
        Frame::ElementScrolled { node_id, x, y } => {
            wire::write_u32(buf, *node_id);
            wire::write_f64(buf, *x);
            wire::write_f64(buf, *y);
        },
        Frame::ElementBlurred { node_id } => wire::write_u32(buf, *node_id),
        Frame::WindowFocused | Frame::WindowBlurred | Frame::Heartbeat => {},
        Frame::RecordingMetadata { initial_url, heartbeat_interval_seconds } => {
            wire::write_string(buf, initial_url);
            wire::write_u32(buf, *heartbeat_interval_seconds);
        },
        Frame::AssetReference { asset_id, url, sha256, mime } => {
            wire::write_u32(buf, *asset_id);
            wire::write_string(buf, url);
            wire::write_string(buf, sha256);
            wire::write_opt_string(buf, mime);
        },
        Frame::CacheManifest { entries } => {
            wire::write_array(buf, entries, |buf, (url, sha256)| {
                wire::write_string(buf, url);
                wire::write_string(buf, sha256);
            });
        },
        Frame::DomNodePropertyChanged { node_id, name, value } => {
            wire::write_u32(buf, *node_id);
            wire::write_string(buf, name);
            wire::write_string(buf, value);
        },
    }
}

pub fn decode_payload(payload: &[u8]) -> Result<Frame, DecodeError> {
    let mut reader = Reader::new(payload);
    let tag_byte = reader.read_u8()?;
    let tag = FrameTag::from_u8(tag_byte).ok_or(DecodeError::UnknownTypeTag(tag_byte))?;
    decode_tagged(tag, &mut reader)
}

fn decode_tagged(tag: FrameTag, reader: &mut Reader) -> Result<Frame, DecodeError> {
    Ok(match tag {
        FrameTag::Timestamp => Frame::Timestamp { timestamp_ms: reader.read_i64()? },
        FrameTag::Keyframe => {
            let document = vdoc::decode_vdocument(reader)?;
            let viewport_width = reader.read_u32()?;
            let viewport_height = reader.read_u32()?;
            let asset_count = reader.read_u32()?;
            Frame::Keyframe { document, viewport_width, viewport_height, asset_count }
        },
        FrameTag::Asset => Frame::Asset {
            asset_id: reader.read_u32()?,
            url: reader.read_string()?,
            mime: reader.read_opt_string()?,
            bytes: reader.read_bytes()?,
        },
        FrameTag::ViewportResized => {
            Frame::ViewportResized { width: reader.read_u32()?, height: reader.read_u32()? }
        },
        FrameTag::WindowScrolled => Frame::WindowScrolled { x: reader.read_f64()?, y: reader.read_f64()? },
        FrameTag::MouseMoved => Frame::MouseMoved { x: reader.read_f64()?, y: reader.read_f64()? },
        FrameTag::MouseClicked => {
            Frame::MouseClicked { x: reader.read_f64()?, y: reader.read_f64()?, button: reader.read_u32()? }
        },
        FrameTag::KeyPressed => Frame::KeyPressed { key: reader.read_string()? },
        FrameTag::ElementFocused => Frame::ElementFocused { node_id: reader.read_u32()? },
        FrameTag::TextSelectionChanged => Frame::TextSelectionChanged {
            start_node_id: reader.read_u32()?,
            start_offset: reader.read_u32()?,
            end_node_id: reader.read_u32()?,
            end_offset: reader.read_u32()?,
        },
        FrameTag::DomNodeAdded => {
            let parent_node_id = reader.read_u32()?;
            let index = reader.read_u32()?;
            let node = vdoc::decode_vnode(reader)?;
            let asset_count = reader.read_u32()?;
            Frame::DomNodeAdded { parent_node_id, index, node, asset_count }
        },
        FrameTag::DomNodeRemoved => Frame::DomNodeRemoved { node_id: reader.read_u32()? },
        FrameTag::DomAttributeChanged => Frame::DomAttributeChanged {
            node_id: reader.read_u32()?,
            name: reader.read_string()?,
            value: reader.read_string()?,
        },
        FrameTag::DomAttributeRemoved => {
            Frame::DomAttributeRemoved { node_id: reader.read_u32()?, name: reader.read_string()? }
        },
        FrameTag::DomTextChanged => {
            let node_id = reader.read_u32()?;
            let ops = reader.read_array(decode_text_op)?;
            Frame::DomTextChanged { node_id, ops }
        },
        FrameTag::DomNodeResized => Frame::DomNodeResized {
            node_id: reader.read_u32()?,
            width: reader.read_f64()?,
            height: reader.read_f64()?,
        },
        FrameTag::AdoptedStyleSheetsChanged => {
            let target_node_id = reader.read_u32()?;
            let sheet_ids = reader.read_array(decode_style_sheet_id)?;
            Frame::AdoptedStyleSheetsChanged { target_node_id, sheet_ids }
        },
        FrameTag::AdoptedStyleSheetAdded => {
            let target_node_id = reader.read_u32()?;
            let sheet = decode_style_sheet(reader)?;
            let asset_count = reader.read_u32()?;
            Frame::AdoptedStyleSheetAdded { target_node_id, sheet, asset_count }
        },
        FrameTag::ElementScrolled => Frame::ElementScrolled {
            node_id: reader.read_u32()?,
            x: reader.read_f64()?,
            y: reader.read_f64()?,
        },
        FrameTag::ElementBlurred => Frame::ElementBlurred { node_id: reader.read_u32()? },
        FrameTag::WindowFocused => Frame::WindowFocused,
        FrameTag::WindowBlurred => Frame::WindowBlurred,
        FrameTag::RecordingMetadata => Frame::RecordingMetadata {
            initial_url: reader.read_string()?,
            heartbeat_interval_seconds: reader.read_u32()?,
        },
        FrameTag::Heartbeat => Frame::Heartbeat,
        FrameTag::AssetReference => Frame::AssetReference {
            asset_id: reader.read_u32()?,
            url: reader.read_string()?,
            sha256: reader.read_string()?,
            mime: reader.read_opt_string()?,
        },
        FrameTag::CacheManifest => {
            let entries = reader.read_array(|r| Ok((r.read_string()?, r.read_string()?)))?;
            Frame::CacheManifest { entries }
        },
        FrameTag::DomNodePropertyChanged => Frame::DomNodePropertyChanged {
            node_id: reader.read_u32()?,
            name: reader.read_string()?,
            value: reader.read_string()?,
        },
    })
}

/// Wire-width (`u32`) conversions for the ids this crate's frames carry.
/// `node_id::NodeId`'s own width is an internal arena detail (see
/// `components/node_id`); the protocol itself fixes ids at `u32` (§6).
pub fn node_id_to_wire(id: NodeId) -> u32 {
    vdoc::wire_node_id(id)
}

pub fn node_id_from_wire(value: u32) -> NodeId {
    vdoc::node_id_of_wire(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dom_model::VElement;

    fn round_trip(frame: Frame) {
        let mut buf = BytesMut::new();
        encode_payload(&frame, &mut buf);
        let decoded = decode_payload(&buf).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn every_frame_kind_round_trips() {
        round_trip(Frame::Timestamp { timestamp_ms: 1234 });
        round_trip(Frame::Keyframe {
            document: VDocument { id: NodeId::from_raw(0), children: vec![], adopted_style_sheets: vec![] },
            viewport_width: 800,
            viewport_height: 600,
            asset_count: 0,
        });
        round_trip(Frame::Asset {
            asset_id: 1,
            url: "https://example.com/a.png".to_string(),
            mime: Some("image/png".to_string()),
            bytes: vec![1, 2, 3],
        });
        round_trip(Frame::DomNodeAdded {
            parent_node_id: 2,
            index: 1,
            node: VNode::Element(VElement {
                id: NodeId::from_raw(4),
                tag: "img".to_string(),
                namespace: None,
                attrs: vec![("src".to_string(), "asset:7".to_string())],
                children: vec![],
                shadow: None,
            }),
            asset_count: 1,
        });
        round_trip(Frame::DomNodeRemoved { node_id: 3 });
        round_trip(Frame::DomAttributeChanged {
            node_id: 3,
            name: "class".to_string(),
            value: "x".to_string(),
        });
        round_trip(Frame::DomAttributeRemoved { node_id: 3, name: "class".to_string() });
        round_trip(Frame::DomTextChanged {
            node_id: 3,
            ops: vec![TextOp::Insert { index: 5, content: " world".to_string() }],
        });
        round_trip(Frame::CacheManifest { entries: vec![("u".to_string(), "h".to_string())] });
        round_trip(Frame::RecordingMetadata { initial_url: "https://x".to_string(), heartbeat_interval_seconds: 5 });
        round_trip(Frame::Heartbeat);
        round_trip(Frame::WindowFocused);
        round_trip(Frame::WindowBlurred);
        round_trip(Frame::AssetReference {
            asset_id: 2,
            url: "https://example.com/b.png".to_string(),
            sha256: "deadbeef".to_string(),
            mime: None,
        });
        round_trip(Frame::DomNodePropertyChanged {
            node_id: 5,
            name: "value".to_string(),
            value: "typed text".to_string(),
        });
    }

    #[test]
    fn unknown_type_tag_is_a_decode_error() {
        let mut buf = BytesMut::new();
        wire::write_u8(&mut buf, 200);
        assert_eq!(decode_payload(&buf), Err(DecodeError::UnknownTypeTag(200)));
    }

    #[test]
    fn truncated_length_prefix_is_a_decode_error() {
        assert_eq!(decode_payload(&[]), Err(DecodeError::Truncated));
    }
}
