//! Node header shared by leaf and branch pages.
//!
//! Byte 0 of a node page carries the type tag; bytes 1..8 are reserved.
//! The payload interpreted by [`super::leaf`] or [`super::branch`] starts
//! at offset 8.

use mica_common::{MicaError, Result};

/// Size of the node header in bytes.
pub const NODE_HEADER_SIZE: usize = 8;

/// Node type tag stored in byte 0 of a node page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeType {
    Leaf = 1,
    Branch = 2,
}

impl NodeType {
    /// Parses a tag byte. Anything outside {1, 2} indicates corruption.
    pub fn from_tag(tag: u8) -> Result<NodeType> {
        match tag {
            1 => Ok(NodeType::Leaf),
            2 => Ok(NodeType::Branch),
            _ => Err(MicaError::InvalidNodeType { tag }),
        }
    }
}

/// Reads the node type of a node page.
pub fn node_type(page: &[u8]) -> Result<NodeType> {
    NodeType::from_tag(page[0])
}

/// Stamps a page as the given node type, clearing the reserved bytes.
pub fn init_node(page: &mut [u8], node_type: NodeType) {
    page[..NODE_HEADER_SIZE].fill(0);
    page[0] = node_type as u8;
}

/// Returns the node payload following the header.
pub fn body(page: &[u8]) -> &[u8] {
    &page[NODE_HEADER_SIZE..]
}

/// Returns the mutable node payload following the header.
pub fn body_mut(page: &mut [u8]) -> &mut [u8] {
    &mut page[NODE_HEADER_SIZE..]
}
