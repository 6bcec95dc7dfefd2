//! Table: root tracking, descent, insert orchestration, and split
//! propagation.

use crate::btree::internal::{InternalNode, INTERNAL_MAX_CELLS};
use crate::btree::leaf::{LeafNode, LEAF_VALUE_SIZE};
use crate::btree::node::{self, NodeType, SplitResult};
use crate::pager::Pager;
use basalt_common::page::{Page, PageId};
use basalt_common::{BasaltError, Result};
use bytes::Bytes;

/// Magic bytes identifying a basalt table file.
pub const TABLE_MAGIC: u32 = u32::from_le_bytes(*b"BSLT");

/// Page 0 is the table header page. It is never used as a tree node, so a
/// zero page id doubles as a null pointer in node headers.
const HEADER_PAGE: PageId = 0;
/// The root node of a fresh table.
const INITIAL_ROOT_PAGE: PageId = 1;

/// Table-level metadata stored on the header page.
///
/// Layout:
/// - magic: u32 at offset 0
/// - row count: u32 at offset 4
/// - root page id: u32 at offset 8
/// - format version: u16 at offset 12
///
/// The header page is the single stable home for this metadata: a root split
/// relocates the root to a fresh page and records the new id here, so the
/// row count never moves with the root.
#[derive(Debug, Clone, Copy)]
struct TableHeader {
    row_count: u32,
    root_page_id: PageId,
    version: u16,
}

impl TableHeader {
    const VERSION: u16 = 1;

    const MAGIC_OFFSET: usize = 0;
    const ROW_COUNT_OFFSET: usize = 4;
    const ROOT_PAGE_OFFSET: usize = 8;
    const VERSION_OFFSET: usize = 12;

    fn new(root_page_id: PageId) -> Self {
        Self {
            row_count: 0,
            root_page_id,
            version: Self::VERSION,
        }
    }

    fn to_page(self) -> Page {
        let mut page = Page::zeroed();
        let data = page.as_bytes_mut();
        node::write_u32(data, Self::MAGIC_OFFSET, TABLE_MAGIC);
        node::write_u32(data, Self::ROW_COUNT_OFFSET, self.row_count);
        node::write_u32(data, Self::ROOT_PAGE_OFFSET, self.root_page_id);
        data[Self::VERSION_OFFSET..Self::VERSION_OFFSET + 2]
            .copy_from_slice(&self.version.to_le_bytes());
        page
    }

    fn from_page(page: &Page) -> Result<Self> {
        let data = page.as_bytes();
        let magic = node::read_u32(data, Self::MAGIC_OFFSET);
        if magic != TABLE_MAGIC {
            return Err(BasaltError::BadMagic { actual: magic });
        }
        let version =
            u16::from_le_bytes([data[Self::VERSION_OFFSET], data[Self::VERSION_OFFSET + 1]]);
        if version > Self::VERSION {
            return Err(BasaltError::UnsupportedVersion(version));
        }
        Ok(Self {
            row_count: node::read_u32(data, Self::ROW_COUNT_OFFSET),
            root_page_id: node::read_u32(data, Self::ROOT_PAGE_OFFSET),
            version,
        })
    }
}

/// An open table: one pager over one backing file, plus the in-memory root.
///
/// All access is single-threaded and synchronous; every mutated page is
/// written back through the pager before the operation returns.
pub struct Table {
    name: String,
    pager: Pager,
    root_page_id: PageId,
}

impl Table {
    /// Opens or creates the table backed by `path`.
    ///
    /// A fresh file gets a header page and an empty leaf root; an existing
    /// file has its header page validated and its root id loaded.
    pub fn open(path: impl AsRef<std::path::Path>, fsync_enabled: bool) -> Result<Self> {
        let pager = Pager::open(path, fsync_enabled)?;
        let name = pager
            .path()
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let root_page_id = if pager.num_pages() == 0 {
            let mut root = LeafNode::init(pager.read_page(INITIAL_ROOT_PAGE)?, INITIAL_ROOT_PAGE);
            root.set_is_root(true);
            pager.write_page(INITIAL_ROOT_PAGE, root.page())?;
            pager.write_page(HEADER_PAGE, &TableHeader::new(INITIAL_ROOT_PAGE).to_page())?;
            tracing::info!("created table '{}' at {}", name, pager.path().display());
            INITIAL_ROOT_PAGE
        } else {
            let header = TableHeader::from_page(&pager.read_page(HEADER_PAGE)?)?;
            header.root_page_id
        };

        Ok(Self {
            name,
            pager,
            root_page_id,
        })
    }

    /// Returns the table name (the file stem of the backing file).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the page id of the current root node.
    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    /// Returns the pager backing this table.
    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    /// Returns the number of rows inserted since table creation.
    pub fn get_total_count(&self) -> Result<u32> {
        Ok(self.read_header()?.row_count)
    }

    fn read_header(&self) -> Result<TableHeader> {
        TableHeader::from_page(&self.pager.read_page(HEADER_PAGE)?)
    }

    fn write_header(&self, header: TableHeader) -> Result<()> {
        self.pager.write_page(HEADER_PAGE, &header.to_page())
    }

    /// Inserts a key/value pair.
    ///
    /// Values shorter than the fixed cell width are zero-padded; longer
    /// values are rejected. Duplicate keys are accepted. Any split produced
    /// at any level is propagated until an ancestor absorbs it or a new root
    /// is created.
    pub fn insert(&mut self, key: u32, value: &[u8]) -> Result<()> {
        if value.len() > LEAF_VALUE_SIZE {
            return Err(BasaltError::ValueTooLarge {
                size: value.len(),
                max: LEAF_VALUE_SIZE,
            });
        }
        let mut row = [0u8; LEAF_VALUE_SIZE];
        row[..value.len()].copy_from_slice(value);

        let (leaf_id, ancestors) = self.find_leaf_with_path(key)?;
        let mut leaf = LeafNode::from_page(self.pager.read_page(leaf_id)?, leaf_id);
        if let Some(promotion) = leaf.insert(key, &row, &self.pager)? {
            self.propagate_split(leaf_id, promotion, ancestors)?;
        }

        let mut header = self.read_header()?;
        header.row_count += 1;
        self.write_header(header)
    }

    /// Returns the value of the first cell matching `key`.
    pub fn find(&self, key: u32) -> Result<Option<Bytes>> {
        let mut current = self.find_leaf(self.root_page_id, key)?;
        loop {
            let leaf = LeafNode::from_page(self.pager.read_page(current)?, current);
            if let Some(value) = leaf.find(key) {
                return Ok(Some(value));
            }
            // A divider equal to its right sibling's first key routes equal
            // keys into the left leaf; keep walking the chain while the key
            // can only be further right.
            let num_cells = leaf.key_count() as usize;
            let exhausted = num_cells > 0 && leaf.key(num_cells - 1) > key;
            let next = leaf.next_leaf();
            if exhausted || next == 0 {
                return Ok(None);
            }
            current = next;
        }
    }

    /// Scans the whole table in key order via the leaf chain.
    pub fn scan(&self) -> Result<Vec<(u32, Bytes)>> {
        self.range_scan(None, None)
    }

    /// Scans keys in `[start, end]` (both bounds inclusive and optional) in
    /// key order via the leaf chain.
    pub fn range_scan(&self, start: Option<u32>, end: Option<u32>) -> Result<Vec<(u32, Bytes)>> {
        let mut current = match start {
            Some(key) => self.find_leaf(self.root_page_id, key)?,
            None => self.leftmost_leaf()?,
        };

        let mut results = Vec::new();
        loop {
            let leaf = LeafNode::from_page(self.pager.read_page(current)?, current);
            for cell_num in 0..leaf.key_count() as usize {
                let key = leaf.key(cell_num);
                if let Some(start) = start {
                    if key < start {
                        continue;
                    }
                }
                if let Some(end) = end {
                    if key > end {
                        return Ok(results);
                    }
                }
                results.push((key, Bytes::copy_from_slice(leaf.value(cell_num))));
            }

            current = leaf.next_leaf();
            if current == 0 {
                return Ok(results);
            }
        }
    }

    /// Read-only root-to-leaf descent for `key`.
    fn find_leaf(&self, page_id: PageId, key: u32) -> Result<PageId> {
        let page = self.pager.read_page(page_id)?;
        match node::node_type(page.as_bytes())? {
            NodeType::Leaf => Ok(page_id),
            NodeType::Internal => {
                let internal = InternalNode::from_page(page, page_id);
                self.find_leaf(internal.child_for_key(key), key)
            }
        }
    }

    /// Descends to the leaf for `key`, collecting the internal ancestors on
    /// the way down. Split propagation walks this stack back up instead of
    /// relying on stored parent pointers.
    fn find_leaf_with_path(&self, key: u32) -> Result<(PageId, Vec<PageId>)> {
        let mut ancestors = Vec::new();
        let mut current = self.root_page_id;
        loop {
            let page = self.pager.read_page(current)?;
            match node::node_type(page.as_bytes())? {
                NodeType::Leaf => return Ok((current, ancestors)),
                NodeType::Internal => {
                    ancestors.push(current);
                    let internal = InternalNode::from_page(page, current);
                    current = internal.child_for_key(key);
                }
            }
        }
    }

    /// Propagates a split upward until an ancestor absorbs the promotion or
    /// the root itself splits.
    fn propagate_split(
        &mut self,
        mut split_child: PageId,
        mut promotion: SplitResult,
        mut ancestors: Vec<PageId>,
    ) -> Result<()> {
        loop {
            let Some(parent_id) = ancestors.pop() else {
                // The split node was the root: grow the tree by one level.
                return self.create_new_root(split_child, promotion);
            };

            let mut parent = InternalNode::from_page(self.pager.read_page(parent_id)?, parent_id);

            // Room for one more divider cell without touching the reserved
            // right-child slot.
            if (parent.key_count() as usize) < INTERNAL_MAX_CELLS - 1 {
                parent.insert_child(promotion.split_key, promotion.new_page_id, split_child)?;
                self.pager.write_page(parent_id, parent.page())?;
                return Ok(());
            }

            promotion = parent.split_and_insert(promotion, split_child, &self.pager)?;
            split_child = parent_id;
        }
    }

    /// Creates a brand-new root over the old root and its new sibling.
    ///
    /// The only operation that changes tree height. The old root's is-root
    /// flag is cleared, both children's parent pointers are set to the new
    /// root, and the header page records the relocated root id.
    fn create_new_root(&mut self, left_child_id: PageId, promotion: SplitResult) -> Result<()> {
        let new_root_id = self.pager.unused_page_id();
        let mut root = InternalNode::init(self.pager.read_page(new_root_id)?, new_root_id);
        root.set_is_root(true);
        root.set_child(0, left_child_id);
        root.set_divider_key(0, promotion.split_key);
        root.set_key_count(1);
        root.set_right_child(promotion.new_page_id);
        self.pager.write_page(new_root_id, root.page())?;

        for child_id in [left_child_id, promotion.new_page_id] {
            let mut page = self.pager.read_page(child_id)?;
            node::set_is_root(page.as_bytes_mut(), false);
            node::set_parent(page.as_bytes_mut(), new_root_id);
            self.pager.write_page(child_id, &page)?;
        }

        self.root_page_id = new_root_id;
        let mut header = self.read_header()?;
        header.root_page_id = new_root_id;
        self.write_header(header)
    }

    /// Follows leftmost pointers down to the first leaf in the chain.
    fn leftmost_leaf(&self) -> Result<PageId> {
        let mut current = self.root_page_id;
        loop {
            let page = self.pager.read_page(current)?;
            match node::node_type(page.as_bytes())? {
                NodeType::Leaf => return Ok(current),
                NodeType::Internal => {
                    let internal = InternalNode::from_page(page, current);
                    current = if internal.key_count() > 0 {
                        internal.child(0)
                    } else {
                        internal.right_child()
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_table() -> (Table, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let table = Table::open(dir.path().join("users.db"), false).unwrap();
        (table, dir)
    }

    #[test]
    fn test_fresh_table_layout() {
        let (table, _dir) = create_test_table();

        assert_eq!(table.name(), "users");
        assert_eq!(table.root_page_id(), 1);
        assert_eq!(table.get_total_count().unwrap(), 0);
        assert_eq!(table.pager().num_pages(), 2);

        // Page 0 carries the magic, page 1 is an empty leaf root.
        let header_page = table.pager().read_page(0).unwrap();
        assert_eq!(node::read_u32(header_page.as_bytes(), 0), TABLE_MAGIC);

        let root = LeafNode::from_page(table.pager().read_page(1).unwrap(), 1);
        assert!(root.is_root());
        assert_eq!(root.key_count(), 0);
    }

    #[test]
    fn test_insert_and_find() {
        let (mut table, _dir) = create_test_table();

        table.insert(20, b"Bob").unwrap();
        table.insert(10, b"Alice").unwrap();
        table.insert(30, b"Charlie").unwrap();

        assert_eq!(table.get_total_count().unwrap(), 3);
        assert_eq!(&table.find(10).unwrap().unwrap()[..5], b"Alice");
        assert_eq!(&table.find(20).unwrap().unwrap()[..3], b"Bob");
        assert_eq!(&table.find(30).unwrap().unwrap()[..7], b"Charlie");
        assert!(table.find(15).unwrap().is_none());
    }

    #[test]
    fn test_value_too_large_rejected() {
        let (mut table, _dir) = create_test_table();

        let oversized = [0u8; LEAF_VALUE_SIZE + 1];
        let result = table.insert(1, &oversized);
        assert!(matches!(
            result,
            Err(BasaltError::ValueTooLarge { size: 33, max: 32 })
        ));
        assert_eq!(table.get_total_count().unwrap(), 0);
    }

    #[test]
    fn test_open_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.db");
        std::fs::write(&path, vec![0xAAu8; 4096]).unwrap();

        assert!(matches!(
            Table::open(&path, false),
            Err(BasaltError::BadMagic { .. })
        ));
    }

    #[test]
    fn test_reopen_preserves_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("persist.db");

        {
            let mut table = Table::open(&path, false).unwrap();
            table.insert(1, b"one").unwrap();
            table.insert(2, b"two").unwrap();
        }

        let table = Table::open(&path, false).unwrap();
        assert_eq!(table.get_total_count().unwrap(), 2);
        assert_eq!(&table.find(1).unwrap().unwrap()[..3], b"one");
        assert_eq!(&table.find(2).unwrap().unwrap()[..3], b"two");
    }

    #[test]
    fn test_range_scan_bounds_inclusive() {
        let (mut table, _dir) = create_test_table();
        for key in [5u32, 10, 15, 20, 25] {
            table.insert(key, b"v").unwrap();
        }

        let keys: Vec<u32> = table
            .range_scan(Some(10), Some(20))
            .unwrap()
            .iter()
            .map(|(k, _)| *k)
            .collect();
        assert_eq!(keys, vec![10, 15, 20]);
    }
}
