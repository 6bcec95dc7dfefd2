//! B+Tree leaf node: sorted fixed-width key/value cells.

use super::node::{self, NodeType, SplitResult, HEADER_SIZE};
use crate::pager::Pager;
use basalt_common::page::{Page, PageId, PAGE_SIZE};
use basalt_common::Result;
use bytes::Bytes;

/// Size of a cell key in bytes.
pub const LEAF_KEY_SIZE: usize = 4;
/// Size of a cell value in bytes. Values are fixed-width; shorter inputs are
/// zero-padded by the caller.
pub const LEAF_VALUE_SIZE: usize = 32;
/// Size of one leaf cell: key plus value.
pub const LEAF_CELL_SIZE: usize = LEAF_KEY_SIZE + LEAF_VALUE_SIZE;
/// Bytes available for cells after the node header.
pub const LEAF_SPACE_FOR_CELLS: usize = PAGE_SIZE - HEADER_SIZE;
/// Maximum number of cells a leaf can hold.
pub const LEAF_MAX_CELLS: usize = LEAF_SPACE_FOR_CELLS / LEAF_CELL_SIZE;

/// A page interpreted as a leaf node.
///
/// Cells occupy contiguous, key-sorted, zero-gap slots starting at
/// `HEADER_SIZE`; the header's key count bounds the valid range. The pointer
/// at offset 16 links to the next leaf (0 = none; page 0 is the table header
/// page and never a node), forming the chain used for ordered forward
/// traversal.
pub struct LeafNode {
    page: Page,
    page_id: PageId,
}

impl LeafNode {
    /// Formats a blank page as an empty, non-root leaf and wraps it.
    pub fn init(mut page: Page, page_id: PageId) -> Self {
        let data = page.as_bytes_mut();
        node::set_node_type(data, NodeType::Leaf);
        node::set_is_root(data, false);
        node::set_parent(data, 0);
        node::set_key_count(data, 0);
        node::set_role_pointer(data, 0);
        Self { page, page_id }
    }

    /// Wraps an existing leaf page.
    pub fn from_page(page: Page, page_id: PageId) -> Self {
        debug_assert_eq!(
            node::node_type(page.as_bytes()).ok(),
            Some(NodeType::Leaf)
        );
        Self { page, page_id }
    }

    /// Returns the underlying page.
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Returns this node's page id.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the number of cells in this leaf.
    pub fn key_count(&self) -> u32 {
        node::key_count(self.page.as_bytes())
    }

    /// Sets the cell count. Callers keep this consistent with the written
    /// cells.
    pub fn set_key_count(&mut self, count: u32) {
        node::set_key_count(self.page.as_bytes_mut(), count);
    }

    /// Returns true if this leaf is the tree root.
    pub fn is_root(&self) -> bool {
        node::is_root(self.page.as_bytes())
    }

    /// Sets or clears the is-root flag.
    pub fn set_is_root(&mut self, is_root: bool) {
        node::set_is_root(self.page.as_bytes_mut(), is_root);
    }

    /// Returns the parent page id.
    pub fn parent(&self) -> PageId {
        node::parent(self.page.as_bytes())
    }

    /// Sets the parent page id.
    pub fn set_parent(&mut self, parent: PageId) {
        node::set_parent(self.page.as_bytes_mut(), parent);
    }

    /// Returns the next leaf page id (0 = end of chain).
    pub fn next_leaf(&self) -> PageId {
        node::role_pointer(self.page.as_bytes())
    }

    /// Sets the next leaf page id.
    pub fn set_next_leaf(&mut self, page_id: PageId) {
        node::set_role_pointer(self.page.as_bytes_mut(), page_id);
    }

    #[inline]
    fn cell_offset(cell_num: usize) -> usize {
        HEADER_SIZE + cell_num * LEAF_CELL_SIZE
    }

    /// Returns the key of the cell at `cell_num`.
    pub fn key(&self, cell_num: usize) -> u32 {
        node::read_u32(self.page.as_bytes(), Self::cell_offset(cell_num))
    }

    fn set_key(&mut self, cell_num: usize, key: u32) {
        node::write_u32(self.page.as_bytes_mut(), Self::cell_offset(cell_num), key);
    }

    /// Returns the value of the cell at `cell_num`.
    pub fn value(&self, cell_num: usize) -> &[u8] {
        let offset = Self::cell_offset(cell_num) + LEAF_KEY_SIZE;
        &self.page.as_bytes()[offset..offset + LEAF_VALUE_SIZE]
    }

    fn set_value(&mut self, cell_num: usize, value: &[u8; LEAF_VALUE_SIZE]) {
        let offset = Self::cell_offset(cell_num) + LEAF_KEY_SIZE;
        self.page.as_bytes_mut()[offset..offset + LEAF_VALUE_SIZE].copy_from_slice(value);
    }

    /// Returns the value of the first cell whose key equals `key`.
    pub fn find(&self, key: u32) -> Option<Bytes> {
        for cell_num in 0..self.key_count() as usize {
            let existing = self.key(cell_num);
            if existing == key {
                return Some(Bytes::copy_from_slice(self.value(cell_num)));
            }
            if existing > key {
                break;
            }
        }
        None
    }

    /// Reads all cells as owned (key, value) pairs.
    pub fn entries(&self) -> Vec<(u32, Bytes)> {
        (0..self.key_count() as usize)
            .map(|cell_num| {
                (
                    self.key(cell_num),
                    Bytes::copy_from_slice(self.value(cell_num)),
                )
            })
            .collect()
    }

    /// Inserts a key/value pair, splitting if the leaf is full.
    ///
    /// The mutated page (and, on a split, its new sibling) is persisted
    /// through the pager before returning. Returns the promotion the caller
    /// must hand to the parent, or `None` if the leaf absorbed the insert.
    pub fn insert(
        &mut self,
        key: u32,
        value: &[u8; LEAF_VALUE_SIZE],
        pager: &Pager,
    ) -> Result<Option<SplitResult>> {
        if self.key_count() as usize >= LEAF_MAX_CELLS {
            return self.split_and_insert(key, value, pager).map(Some);
        }

        self.insert_cell(key, value);
        pager.write_page(self.page_id, &self.page)?;
        Ok(None)
    }

    /// Ordered in-place insertion. Caller guarantees the leaf is not full.
    ///
    /// The scan uses strict `<`, so a duplicate key lands immediately before
    /// the first equal-or-greater cell.
    fn insert_cell(&mut self, key: u32, value: &[u8; LEAF_VALUE_SIZE]) {
        let num_cells = self.key_count() as usize;
        debug_assert!(num_cells < LEAF_MAX_CELLS);

        let mut target_cell = 0;
        while target_cell < num_cells && self.key(target_cell) < key {
            target_cell += 1;
        }

        if target_cell < num_cells {
            let start = Self::cell_offset(target_cell);
            let end = Self::cell_offset(num_cells);
            self.page
                .as_bytes_mut()
                .copy_within(start..end, start + LEAF_CELL_SIZE);
        }

        self.set_key(target_cell, key);
        self.set_value(target_cell, value);
        node::set_key_count(self.page.as_bytes_mut(), (num_cells + 1) as u32);
    }

    /// Splits this full leaf into two and inserts the pending pair.
    ///
    /// The sibling is allocated through the pager, formatted as a leaf, and
    /// spliced into the leaf chain after this node. The upper half of the
    /// cells moves to the sibling; the pending key is then re-inserted into
    /// whichever half it belongs to. Both pages are persisted before
    /// returning the promotion: the sibling's first key and page id.
    pub fn split_and_insert(
        &mut self,
        key: u32,
        value: &[u8; LEAF_VALUE_SIZE],
        pager: &Pager,
    ) -> Result<SplitResult> {
        let total = self.key_count() as usize;

        let new_page_id = pager.unused_page_id();
        let mut right = LeafNode::init(pager.read_page(new_page_id)?, new_page_id);

        // Splice into the leaf chain before moving any cells.
        right.set_next_leaf(self.next_leaf());
        right.set_parent(self.parent());
        self.set_next_leaf(new_page_id);

        // Left keeps the smaller half; the sibling takes the remainder.
        let left_count = total / 2;
        let right_count = total - left_count;

        let src_start = Self::cell_offset(left_count);
        let src_end = Self::cell_offset(total);
        right.page.as_bytes_mut()[HEADER_SIZE..HEADER_SIZE + right_count * LEAF_CELL_SIZE]
            .copy_from_slice(&self.page.as_bytes()[src_start..src_end]);

        node::set_key_count(right.page.as_bytes_mut(), right_count as u32);
        node::set_key_count(self.page.as_bytes_mut(), left_count as u32);

        // The pending pair joins the half its key belongs to.
        if left_count > 0 && key <= self.key(left_count - 1) {
            self.insert_cell(key, value);
        } else {
            right.insert_cell(key, value);
        }

        pager.write_page(self.page_id, &self.page)?;
        pager.write_page(new_page_id, &right.page)?;

        Ok(SplitResult {
            split_key: right.key(0),
            new_page_id,
        })
    }
}
