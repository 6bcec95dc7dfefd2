//! Shared node-header layout and accessors.
//!
//! Every page used as a tree node starts with the same 20-byte header:
//!
//! ```text
//! +------------------------+ 0
//! | node type: u8          | 1
//! | is-root: u8            | 2
//! | padding                | 4
//! | reserved: u32          | 8
//! | parent page id: u32    | 12
//! | key count: u32         | 16
//! | right child / next     |
//! |   leaf page id: u32    | 20 (HEADER_SIZE)
//! +------------------------+
//! | cell array             |
//! +------------------------+ PAGE_SIZE
//! ```
//!
//! The pointer at offset 16 is role-specific: an internal node stores its
//! right-child page id there, a leaf stores the next-leaf page id. A page's
//! node type is fixed for its lifetime; it is only written during controlled
//! initialization of a freshly allocated page.

use basalt_common::page::PageId;
use basalt_common::{BasaltError, Result};

/// Offset of the node type byte.
pub const NODE_TYPE_OFFSET: usize = 0;
/// Offset of the is-root flag byte.
pub const IS_ROOT_OFFSET: usize = 1;
/// Offset of the parent page id.
pub const PARENT_POINTER_OFFSET: usize = 8;
/// Offset of the key count.
pub const KEY_COUNT_OFFSET: usize = 12;
/// Offset of the role-specific pointer (right child or next leaf).
pub const ROLE_POINTER_OFFSET: usize = 16;
/// Total header length; the cell array starts here.
pub const HEADER_SIZE: usize = 20;

/// Node kinds, stored as the first byte of every node page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeType {
    /// Internal node: divider/child cells plus a right-child pointer.
    Internal = 0,
    /// Leaf node: key/value cells linked into the leaf chain.
    Leaf = 1,
}

impl NodeType {
    /// Parses a node type byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(NodeType::Internal),
            1 => Ok(NodeType::Leaf),
            other => Err(BasaltError::InvalidNodeType(other)),
        }
    }
}

/// The (promoted key, new sibling page id) pair a split produces.
///
/// This is a message reported to the node one level up, never stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitResult {
    /// The divider key promoted to the parent.
    pub split_key: u32,
    /// Page id of the newly allocated sibling.
    pub new_page_id: PageId,
}

#[inline]
pub(crate) fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

#[inline]
pub(crate) fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Reads the node type of a page.
pub fn node_type(data: &[u8]) -> Result<NodeType> {
    NodeType::from_byte(data[NODE_TYPE_OFFSET])
}

/// Writes the node type of a page.
pub fn set_node_type(data: &mut [u8], node_type: NodeType) {
    data[NODE_TYPE_OFFSET] = node_type as u8;
}

/// Returns true if the page is marked as the tree root.
pub fn is_root(data: &[u8]) -> bool {
    data[IS_ROOT_OFFSET] == 1
}

/// Sets or clears the is-root flag.
pub fn set_is_root(data: &mut [u8], is_root: bool) {
    data[IS_ROOT_OFFSET] = u8::from(is_root);
}

/// Reads the parent page id.
pub fn parent(data: &[u8]) -> PageId {
    read_u32(data, PARENT_POINTER_OFFSET)
}

/// Writes the parent page id.
pub fn set_parent(data: &mut [u8], parent: PageId) {
    write_u32(data, PARENT_POINTER_OFFSET, parent);
}

/// Reads the key count.
pub fn key_count(data: &[u8]) -> u32 {
    read_u32(data, KEY_COUNT_OFFSET)
}

/// Writes the key count.
///
/// Callers keep this consistent with the written cells: the count must never
/// overstate them.
pub fn set_key_count(data: &mut [u8], count: u32) {
    write_u32(data, KEY_COUNT_OFFSET, count);
}

/// Reads the role-specific pointer at offset 16.
pub fn role_pointer(data: &[u8]) -> PageId {
    read_u32(data, ROLE_POINTER_OFFSET)
}

/// Writes the role-specific pointer at offset 16.
pub fn set_role_pointer(data: &mut [u8], page_id: PageId) {
    write_u32(data, ROLE_POINTER_OFFSET, page_id);
}
