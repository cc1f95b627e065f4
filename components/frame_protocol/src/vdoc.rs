//! Nested encoding for the virtual tree (spec.md §3/§6: "nested
//! length-prefixed encoding"), reused by the `Keyframe` and `DomNodeAdded`
//! frames.

use crate::wire::{self, DecodeError, Reader};
use bytes::BytesMut;
use dom_model::{StyleSheetId, VCharacterData, VDocument, VDocumentType, VElement, VNode, VProcessingInstruction, VStyleSheet};
use node_id::NodeId;

fn node_id_to_wire(id: NodeId) -> u32 {
    id.raw() as u32
}

fn node_id_from_wire(value: u32) -> NodeId {
    NodeId::from_raw(value as u64)
}

pub fn encode_style_sheet_id(buf: &mut BytesMut, id: StyleSheetId) {
    match id {
        StyleSheetId::Owned(node_id) => {
            wire::write_u8(buf, 0);
            wire::write_u32(buf, node_id_to_wire(node_id));
        },
        StyleSheetId::Adopted(tag) => {
            wire::write_u8(buf, 1);
            wire::write_u32(buf, tag as u32);
        },
    }
}

pub fn decode_style_sheet_id(reader: &mut Reader) -> Result<StyleSheetId, DecodeError> {
    match reader.read_u8()? {
        0 => Ok(StyleSheetId::Owned(node_id_from_wire(reader.read_u32()?))),
        1 => Ok(StyleSheetId::Adopted(reader.read_u32()? as u64)),
        _ => Err(DecodeError::Truncated),
    }
}

pub fn encode_style_sheet(buf: &mut BytesMut, sheet: &VStyleSheet) {
    encode_style_sheet_id(buf, sheet.id);
    wire::write_opt_string(buf, &sheet.media);
    wire::write_string(buf, &sheet.text);
}

pub fn decode_style_sheet(reader: &mut Reader) -> Result<VStyleSheet, DecodeError> {
    let id = decode_style_sheet_id(reader)?;
    let media = reader.read_opt_string()?;
    let text = reader.read_string()?;
    Ok(VStyleSheet { id, media, text })
}

const TAG_ELEMENT: u8 = 0;
const TAG_TEXT: u8 = 1;
const TAG_CDATA: u8 = 2;
const TAG_COMMENT: u8 = 3;
const TAG_PI: u8 = 4;
const TAG_DOCTYPE: u8 = 5;

pub fn encode_vnode(buf: &mut BytesMut, node: &VNode) {
    match node {
        VNode::Element(el) => {
            wire::write_u8(buf, TAG_ELEMENT);
            wire::write_u32(buf, node_id_to_wire(el.id));
            wire::write_string(buf, &el.tag);
            wire::write_opt_string(buf, &el.namespace);
            wire::write_array(buf, &el.attrs, |buf, (k, v)| {
                wire::write_string(buf, k);
                wire::write_string(buf, v);
            });
            wire::write_array(buf, &el.children, |buf, child| encode_vnode(buf, child));
            wire::write_bool(buf, el.shadow.is_some());
            if let Some(shadow) = &el.shadow {
                wire::write_array(buf, shadow, |buf, child| encode_vnode(buf, child));
            }
        },
        VNode::Text(cdata) => encode_character_data(buf, TAG_TEXT, cdata),
        VNode::Cdata(cdata) => encode_character_data(buf, TAG_CDATA, cdata),
        VNode::Comment(cdata) => encode_character_data(buf, TAG_COMMENT, cdata),
        VNode::ProcessingInstruction(pi) => {
            wire::write_u8(buf, TAG_PI);
            wire::write_u32(buf, node_id_to_wire(pi.id));
            wire::write_string(buf, &pi.target);
            wire::write_string(buf, &pi.data);
        },
        VNode::DocumentType(dt) => {
            wire::write_u8(buf, TAG_DOCTYPE);
            wire::write_u32(buf, node_id_to_wire(dt.id));
            wire::write_string(buf, &dt.name);
            wire::write_string(buf, &dt.public_id);
            wire::write_string(buf, &dt.system_id);
        },
    }
}

fn encode_character_data(buf: &mut BytesMut, tag: u8, cdata: &VCharacterData) {
    wire::write_u8(buf, tag);
    wire::write_u32(buf, node_id_to_wire(cdata.id));
    wire::write_string(buf, &cdata.data);
}

pub fn decode_vnode(reader: &mut Reader) -> Result<VNode, DecodeError> {
    match reader.read_u8()? {
        TAG_ELEMENT => {
            let id = node_id_from_wire(reader.read_u32()?);
            let tag = reader.read_string()?;
            let namespace = reader.read_opt_string()?;
            let attrs = reader.read_array(|r| Ok((r.read_string()?, r.read_string()?)))?;
            let children = reader.read_array(decode_vnode)?;
            let has_shadow = reader.read_bool()?;
            let shadow = if has_shadow { Some(reader.read_array(decode_vnode)?) } else { None };
            Ok(VNode::Element(VElement { id, tag, namespace, attrs, children, shadow }))
        },
        TAG_TEXT => Ok(VNode::Text(decode_character_data(reader)?)),
        TAG_CDATA => Ok(VNode::Cdata(decode_character_data(reader)?)),
        TAG_COMMENT => Ok(VNode::Comment(decode_character_data(reader)?)),
        TAG_PI => {
            let id = node_id_from_wire(reader.read_u32()?);
            let target = reader.read_string()?;
            let data = reader.read_string()?;
            Ok(VNode::ProcessingInstruction(VProcessingInstruction { id, target, data }))
        },
        TAG_DOCTYPE => {
            let id = node_id_from_wire(reader.read_u32()?);
            let name = reader.read_string()?;
            let public_id = reader.read_string()?;
            let system_id = reader.read_string()?;
            Ok(VNode::DocumentType(VDocumentType { id, name, public_id, system_id }))
        },
        other => Err(DecodeError::UnknownTypeTag(other)),
    }
}

fn decode_character_data(reader: &mut Reader) -> Result<VCharacterData, DecodeError> {
    let id = node_id_from_wire(reader.read_u32()?);
    let data = reader.read_string()?;
    Ok(VCharacterData { id, data })
}

pub fn encode_vdocument(buf: &mut BytesMut, doc: &VDocument) {
    wire::write_u32(buf, node_id_to_wire(doc.id));
    wire::write_array(buf, &doc.children, |buf, child| encode_vnode(buf, child));
    wire::write_array(buf, &doc.adopted_style_sheets, |buf, sheet| encode_style_sheet(buf, sheet));
}

pub fn decode_vdocument(reader: &mut Reader) -> Result<VDocument, DecodeError> {
    let id = node_id_from_wire(reader.read_u32()?);
    let children = reader.read_array(decode_vnode)?;
    let adopted_style_sheets = reader.read_array(decode_style_sheet)?;
    Ok(VDocument { id, children, adopted_style_sheets })
}

pub(crate) fn wire_node_id(id: NodeId) -> u32 {
    node_id_to_wire(id)
}

pub(crate) fn node_id_of_wire(value: u32) -> NodeId {
    node_id_from_wire(value)
}
