//! B+Tree internal node: sorted divider/child cells plus a right-child
//! pointer.

use super::node::{self, NodeType, SplitResult, HEADER_SIZE};
use crate::pager::Pager;
use basalt_common::page::{Page, PageId, PAGE_SIZE};
use basalt_common::{BasaltError, Result};

/// Size of one internal cell: child page id plus divider key.
pub const INTERNAL_CELL_SIZE: usize = 8;
/// Offset of the divider key within a cell, after the child page id.
const CELL_KEY_OFFSET: usize = 4;
/// Maximum number of divider cells an internal node can hold.
pub const INTERNAL_MAX_CELLS: usize = (PAGE_SIZE - HEADER_SIZE) / INTERNAL_CELL_SIZE;

/// A page interpreted as an internal node.
///
/// Each 8-byte cell pairs a child page id with a divider key that is the
/// inclusive upper bound for every key reachable through that child. The
/// right-child pointer at offset 16 covers all keys greater than the last
/// divider.
pub struct InternalNode {
    page: Page,
    page_id: PageId,
}

impl InternalNode {
    /// Formats a blank page as an empty, non-root internal node and wraps it.
    pub fn init(mut page: Page, page_id: PageId) -> Self {
        let data = page.as_bytes_mut();
        node::set_node_type(data, NodeType::Internal);
        node::set_is_root(data, false);
        node::set_parent(data, 0);
        node::set_key_count(data, 0);
        node::set_role_pointer(data, 0);
        Self { page, page_id }
    }

    /// Wraps an existing internal page.
    pub fn from_page(page: Page, page_id: PageId) -> Self {
        debug_assert_eq!(
            node::node_type(page.as_bytes()).ok(),
            Some(NodeType::Internal)
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

    /// Returns the number of divider cells.
    pub fn key_count(&self) -> u32 {
        node::key_count(self.page.as_bytes())
    }

    /// Sets the divider cell count. Callers keep this consistent with the
    /// written cells.
    pub fn set_key_count(&mut self, count: u32) {
        node::set_key_count(self.page.as_bytes_mut(), count);
    }

    /// Returns true if this node is the tree root.
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

    /// Returns the right-child pointer, covering keys greater than every
    /// divider.
    pub fn right_child(&self) -> PageId {
        node::role_pointer(self.page.as_bytes())
    }

    /// Sets the right-child pointer.
    pub fn set_right_child(&mut self, page_id: PageId) {
        node::set_role_pointer(self.page.as_bytes_mut(), page_id);
    }

    #[inline]
    fn cell_offset(cell_num: usize) -> usize {
        HEADER_SIZE + cell_num * INTERNAL_CELL_SIZE
    }

    /// Returns the child page id of the cell at `cell_num`.
    pub fn child(&self, cell_num: usize) -> PageId {
        node::read_u32(self.page.as_bytes(), Self::cell_offset(cell_num))
    }

    /// Sets the child page id of the cell at `cell_num`.
    pub fn set_child(&mut self, cell_num: usize, child: PageId) {
        node::write_u32(self.page.as_bytes_mut(), Self::cell_offset(cell_num), child);
    }

    /// Returns the divider key of the cell at `cell_num`.
    pub fn divider_key(&self, cell_num: usize) -> u32 {
        node::read_u32(
            self.page.as_bytes(),
            Self::cell_offset(cell_num) + CELL_KEY_OFFSET,
        )
    }

    /// Sets the divider key of the cell at `cell_num`.
    pub fn set_divider_key(&mut self, cell_num: usize, key: u32) {
        node::write_u32(
            self.page.as_bytes_mut(),
            Self::cell_offset(cell_num) + CELL_KEY_OFFSET,
            key,
        );
    }

    /// Returns the child to follow when descending for `key`.
    ///
    /// Linear scan of the dividers in order: the first divider `>= key` wins
    /// (the divider is the inclusive upper bound of its child's keyspace);
    /// otherwise the right child.
    pub fn child_for_key(&self, key: u32) -> PageId {
        let num_keys = self.key_count() as usize;
        for cell_num in 0..num_keys {
            if key <= self.divider_key(cell_num) {
                return self.child(cell_num);
            }
        }
        self.right_child()
    }

    /// Absorbs a child split: one new (child, divider) cell, in place.
    ///
    /// Caller guarantees spare capacity. The split child's slot is located by
    /// page id; a cell pairing it with `split_key` (the upper bound of its
    /// remaining keyspace) is inserted there, and the displaced slot, which
    /// keeps the old divider, is repointed at the new sibling. A split of the
    /// right child appends the cell and the sibling takes over the
    /// right-child slot.
    pub fn insert_child(
        &mut self,
        split_key: u32,
        new_child_id: PageId,
        split_child_id: PageId,
    ) -> Result<()> {
        let num_keys = self.key_count() as usize;
        debug_assert!(num_keys < INTERNAL_MAX_CELLS);

        if self.right_child() == split_child_id {
            self.set_child(num_keys, split_child_id);
            self.set_divider_key(num_keys, split_key);
            self.set_right_child(new_child_id);
            node::set_key_count(self.page.as_bytes_mut(), (num_keys + 1) as u32);
            return Ok(());
        }

        let target_cell = self
            .position_of_child(split_child_id)
            .ok_or_else(|| split_child_missing(self.page_id, split_child_id))?;

        let start = Self::cell_offset(target_cell);
        let end = Self::cell_offset(num_keys);
        self.page
            .as_bytes_mut()
            .copy_within(start..end, start + INTERNAL_CELL_SIZE);

        self.set_child(target_cell, split_child_id);
        self.set_divider_key(target_cell, split_key);
        self.set_child(target_cell + 1, new_child_id);
        node::set_key_count(self.page.as_bytes_mut(), (num_keys + 1) as u32);
        Ok(())
    }

    /// Returns the cell index pairing `child_id`, if any.
    fn position_of_child(&self, child_id: PageId) -> Option<usize> {
        (0..self.key_count() as usize).find(|&cell_num| self.child(cell_num) == child_id)
    }

    /// Splits this full node while absorbing an incoming promotion.
    ///
    /// All existing cells plus the cell for the split child are staged into a
    /// page-sized buffer, positioned exactly as [`InternalNode::insert_child`]
    /// would place them. The midpoint cell is then consumed: its key is
    /// promoted to the caller and its child becomes the left node's new right
    /// child. The freshly allocated sibling takes the cells above the
    /// midpoint and inherits the staged right-child pointer. Both pages are
    /// persisted before returning.
    pub fn split_and_insert(
        &mut self,
        incoming: SplitResult,
        split_child_id: PageId,
        pager: &Pager,
    ) -> Result<SplitResult> {
        let key_count = self.key_count() as usize;
        let cells_end = Self::cell_offset(key_count);

        let mut staged = [0u8; PAGE_SIZE];
        staged[..key_count * INTERNAL_CELL_SIZE]
            .copy_from_slice(&self.page.as_bytes()[HEADER_SIZE..cells_end]);

        // Stage the same insertion insert_child performs: the split child's
        // slot gains a cell bounding its remaining keyspace, the displaced
        // slot adopts the new sibling.
        let mut right_child = self.right_child();
        if right_child == split_child_id {
            write_staged_cell(&mut staged, key_count, split_child_id, incoming.split_key);
            right_child = incoming.new_page_id;
        } else {
            let insertion_index = (0..key_count)
                .find(|&cell_num| staged_child(&staged, cell_num) == split_child_id)
                .ok_or_else(|| split_child_missing(self.page_id, split_child_id))?;
            staged.copy_within(
                insertion_index * INTERNAL_CELL_SIZE..key_count * INTERNAL_CELL_SIZE,
                (insertion_index + 1) * INTERNAL_CELL_SIZE,
            );
            write_staged_cell(&mut staged, insertion_index, split_child_id, incoming.split_key);
            node::write_u32(
                &mut staged,
                (insertion_index + 1) * INTERNAL_CELL_SIZE,
                incoming.new_page_id,
            );
        }

        let total = key_count + 1;
        let midpoint = total / 2;

        let sibling_id = pager.unused_page_id();
        let mut sibling = InternalNode::init(pager.read_page(sibling_id)?, sibling_id);
        sibling.set_parent(self.parent());

        // The midpoint cell is consumed as the separator: its key moves up,
        // its child's keyspace is absorbed as the left node's right child.
        let promoted_key = staged_key(&staged, midpoint);
        let left_right_child = staged_child(&staged, midpoint);

        node::set_key_count(self.page.as_bytes_mut(), midpoint as u32);
        self.set_right_child(left_right_child);
        self.page.as_bytes_mut()[HEADER_SIZE..HEADER_SIZE + midpoint * INTERNAL_CELL_SIZE]
            .copy_from_slice(&staged[..midpoint * INTERNAL_CELL_SIZE]);

        let right_count = total - midpoint - 1;
        node::set_key_count(sibling.page.as_bytes_mut(), right_count as u32);
        sibling.set_right_child(right_child);
        sibling.page.as_bytes_mut()[HEADER_SIZE..HEADER_SIZE + right_count * INTERNAL_CELL_SIZE]
            .copy_from_slice(
                &staged[(midpoint + 1) * INTERNAL_CELL_SIZE..total * INTERNAL_CELL_SIZE],
            );

        pager.write_page(sibling_id, &sibling.page)?;
        pager.write_page(self.page_id, &self.page)?;

        Ok(SplitResult {
            split_key: promoted_key,
            new_page_id: sibling_id,
        })
    }
}

#[inline]
fn staged_key(staged: &[u8], cell_num: usize) -> u32 {
    node::read_u32(staged, cell_num * INTERNAL_CELL_SIZE + CELL_KEY_OFFSET)
}

#[inline]
fn staged_child(staged: &[u8], cell_num: usize) -> PageId {
    node::read_u32(staged, cell_num * INTERNAL_CELL_SIZE)
}

#[inline]
fn write_staged_cell(staged: &mut [u8], cell_num: usize, child: PageId, key: u32) {
    node::write_u32(staged, cell_num * INTERNAL_CELL_SIZE, child);
    node::write_u32(staged, cell_num * INTERNAL_CELL_SIZE + CELL_KEY_OFFSET, key);
}

fn split_child_missing(page_id: PageId, split_child_id: PageId) -> BasaltError {
    BasaltError::Corrupted(format!(
        "page {page_id} does not reference split child {split_child_id}"
    ))
}
