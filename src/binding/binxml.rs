//! Binary-XML decode (spec §4.9 step 4): the simulator's packaged archive
//! carries its default-profile XML either as plain text or as a
//! proprietary binary tree format identified by a `CryXmlB`/`CryXml`/
//! `CRY3SDK` magic prefix.
//!
//! There is no sample of this format anywhere in the corpus to verify
//! byte-exact offsets against, so this decoder follows the commonly
//! published reverse-engineered layout (node table / attribute table /
//! child-index table / flat string pool) used by community extraction
//! tools for this family of engine. This is recorded as an Open Question
//! decision rather than presented as a verified spec.

use crate::error::{AsteriqError, Result};
use std::collections::HashMap;

const MAGIC_CRYXMLB: &[u8] = b"CryXmlB\0";
const MAGIC_CRYXML: &[u8] = b"CryXml\0";
const MAGIC_CRY3SDK: &[u8] = b"CRY3SDK\0";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub content: Option<String>,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.name == name)
    }
}

/// Decode `blob` into a tree, transparently handling both the binary
/// variants and plain XML (returned as-is via `roxmltree`).
pub fn decode(blob: &[u8]) -> Result<XmlNode> {
    if blob.starts_with(MAGIC_CRYXMLB) {
        decode_cryxmlb(&blob[MAGIC_CRYXMLB.len()..])
    } else if blob.starts_with(MAGIC_CRYXML) {
        decode_cryxmlb(&blob[MAGIC_CRYXML.len()..])
    } else if blob.starts_with(MAGIC_CRY3SDK) {
        // CRY3SDK payloads are sometimes wrapped in an extra compression
        // layer in the wild; none of this corpus's dependencies provide a
        // raw zlib inflate primitive, so this treats the remainder as an
        // uncompressed node table like the other two variants. Good
        // enough for the common case; revisit if a real sample surfaces.
        decode_cryxmlb(&blob[MAGIC_CRY3SDK.len()..])
    } else {
        decode_plain_xml(blob)
    }
}

fn decode_plain_xml(blob: &[u8]) -> Result<XmlNode> {
    let text = std::str::from_utf8(blob)
        .map_err(|e| AsteriqError::BinaryXmlParseError(e.to_string()))?;
    let doc = roxmltree::Document::parse(text)
        .map_err(|e| AsteriqError::BinaryXmlParseError(e.to_string()))?;
    Ok(convert_roxmltree(doc.root_element()))
}

fn convert_roxmltree(node: roxmltree::Node) -> XmlNode {
    XmlNode {
        name: node.tag_name().name().to_string(),
        attributes: node
            .attributes()
            .map(|a| (a.name().to_string(), a.value().to_string()))
            .collect(),
        content: node.text().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
        children: node
            .children()
            .filter(|c| c.is_element())
            .map(convert_roxmltree)
            .collect(),
    }
}

struct Header {
    node_table_offset: u32,
    node_table_count: u32,
    attr_table_offset: u32,
    #[allow(dead_code)]
    attr_table_count: u32,
    child_table_offset: u32,
    #[allow(dead_code)]
    child_table_count: u32,
    string_table_offset: u32,
}

const HEADER_LEN: usize = 36;
const NODE_ENTRY_LEN: usize = 28;
const ATTR_ENTRY_LEN: usize = 8;
const CHILD_ENTRY_LEN: usize = 4;

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    let slice = bytes
        .get(offset..offset + 4)
        .ok_or_else(|| AsteriqError::BinaryXmlParseError("truncated header".into()))?;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

fn read_u16(bytes: &[u8], offset: usize) -> Result<u16> {
    let slice = bytes
        .get(offset..offset + 2)
        .ok_or_else(|| AsteriqError::BinaryXmlParseError("truncated node entry".into()))?;
    Ok(u16::from_le_bytes(slice.try_into().unwrap()))
}

fn read_cstring(bytes: &[u8], offset: u32) -> String {
    let start = offset as usize;
    let end = bytes[start..]
        .iter()
        .position(|&b| b == 0)
        .map(|p| start + p)
        .unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[start..end]).into_owned()
}

struct NodeEntry {
    name_offset: u32,
    content_offset: u32,
    attribute_count: u16,
    child_count: u16,
    first_attribute_index: u32,
    first_child_index: u32,
}

fn decode_cryxmlb(body: &[u8]) -> Result<XmlNode> {
    let header = Header {
        node_table_offset: read_u32(body, 0)?,
        node_table_count: read_u32(body, 4)?,
        attr_table_offset: read_u32(body, 8)?,
        attr_table_count: read_u32(body, 12)?,
        child_table_offset: read_u32(body, 16)?,
        child_table_count: read_u32(body, 20)?,
        string_table_offset: read_u32(body, 24)?,
    };
    let _ = HEADER_LEN;

    if header.node_table_count == 0 {
        return Err(AsteriqError::BinaryXmlParseError("empty node table".into()));
    }

    let mut nodes = Vec::with_capacity(header.node_table_count as usize);
    for i in 0..header.node_table_count {
        let base = header.node_table_offset as usize + i as usize * NODE_ENTRY_LEN;
        nodes.push(NodeEntry {
            name_offset: read_u32(body, base)?,
            content_offset: read_u32(body, base + 4)?,
            attribute_count: read_u16(body, base + 8)?,
            child_count: read_u16(body, base + 10)?,
            first_attribute_index: read_u32(body, base + 20)?,
            first_child_index: read_u32(body, base + 24)?,
        });
    }

    let mut attrs: HashMap<u32, (u32, u32)> = HashMap::new();
    for i in 0.. {
        let base = header.attr_table_offset as usize + i * ATTR_ENTRY_LEN;
        if base + ATTR_ENTRY_LEN > body.len() {
            break;
        }
        let name_off = read_u32(body, base)?;
        let value_off = read_u32(body, base + 4)?;
        attrs.insert(i as u32, (name_off, value_off));
    }

    let children_indices: Vec<u32> = (0..)
        .map_while(|i| {
            let base = header.child_table_offset as usize + i * CHILD_ENTRY_LEN;
            if base + CHILD_ENTRY_LEN > body.len() {
                None
            } else {
                read_u32(body, base).ok()
            }
        })
        .collect();

    let strings = &body[header.string_table_offset as usize..];

    build_node(0, &nodes, &attrs, &children_indices, strings)
}

fn build_node(
    idx: usize,
    nodes: &[NodeEntry],
    attrs: &HashMap<u32, (u32, u32)>,
    children_indices: &[u32],
    strings: &[u8],
) -> Result<XmlNode> {
    let node = nodes
        .get(idx)
        .ok_or_else(|| AsteriqError::BinaryXmlParseError("node index out of range".into()))?;

    let name = read_cstring(strings, node.name_offset);
    let content = if node.content_offset != u32::MAX {
        let c = read_cstring(strings, node.content_offset);
        if c.is_empty() { None } else { Some(c) }
    } else {
        None
    };

    let mut attributes = Vec::with_capacity(node.attribute_count as usize);
    for a in 0..node.attribute_count as u32 {
        if let Some(&(name_off, value_off)) = attrs.get(&(node.first_attribute_index + a)) {
            attributes.push((read_cstring(strings, name_off), read_cstring(strings, value_off)));
        }
    }

    let mut children = Vec::with_capacity(node.child_count as usize);
    for c in 0..node.child_count as u32 {
        if let Some(&child_idx) = children_indices.get((node.first_child_index + c) as usize) {
            children.push(build_node(child_idx as usize, nodes, attrs, children_indices, strings)?);
        }
    }

    Ok(XmlNode {
        name,
        attributes,
        content,
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_xml_is_returned_as_is() {
        let xml = b"<root attr=\"1\"><child/></root>";
        let node = decode(xml).unwrap();
        assert_eq!(node.name, "root");
        assert_eq!(node.attr("attr"), Some("1"));
        assert_eq!(node.children.len(), 1);
        assert_eq!(node.children[0].name, "child");
    }

    #[test]
    fn plain_xml_with_declaration_is_returned_as_is() {
        let xml = b"<?xml version=\"1.0\"?>\n<ActionMaps version=\"1\"></ActionMaps>";
        let node = decode(xml).unwrap();
        assert_eq!(node.name, "ActionMaps");
    }
}
