//! Cross-component B+Tree validation tests.
//!
//! Exercises the engine through the public `Table` API and verifies the
//! structural invariants directly against the on-disk pages:
//! - sort invariant over the leaf chain
//! - row count bookkeeping
//! - node capacity bounds
//! - split correctness and root growth
//! - persistence across reopen

use rand::seq::SliceRandom;
use tempfile::tempdir;

use basalt_storage::btree::node;
use basalt_storage::{
    InternalNode, LeafNode, NodeType, Table, INTERNAL_MAX_CELLS, LEAF_MAX_CELLS,
};

fn create_test_table() -> (Table, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let table = Table::open(dir.path().join("test.db"), false).unwrap();
    (table, dir)
}

/// Number of node levels from the root down to the leaves.
fn tree_height(table: &Table) -> u32 {
    let mut height = 1;
    let mut current = table.root_page_id();
    loop {
        let page = table.pager().read_page(current).unwrap();
        match node::node_type(page.as_bytes()).unwrap() {
            NodeType::Leaf => return height,
            NodeType::Internal => {
                let internal = InternalNode::from_page(page, current);
                current = internal.child(0);
                height += 1;
            }
        }
    }
}

/// Leaf page ids in chain order, starting from the leftmost leaf.
fn leaf_chain(table: &Table) -> Vec<u32> {
    let mut current = table.root_page_id();
    loop {
        let page = table.pager().read_page(current).unwrap();
        match node::node_type(page.as_bytes()).unwrap() {
            NodeType::Leaf => break,
            NodeType::Internal => {
                current = InternalNode::from_page(page, current).child(0);
            }
        }
    }

    let mut chain = Vec::new();
    while current != 0 {
        chain.push(current);
        let page = table.pager().read_page(current).unwrap();
        current = LeafNode::from_page(page, current).next_leaf();
    }
    chain
}

/// All keys in leaf-chain order.
fn chained_keys(table: &Table) -> Vec<u32> {
    let mut keys = Vec::new();
    for leaf_id in leaf_chain(table) {
        let leaf = LeafNode::from_page(table.pager().read_page(leaf_id).unwrap(), leaf_id);
        for cell_num in 0..leaf.key_count() as usize {
            keys.push(leaf.key(cell_num));
        }
    }
    keys
}

#[test]
fn test_out_of_order_inserts_land_sorted() {
    let (mut table, _dir) = create_test_table();

    table.insert(20, b"Bob").unwrap();
    table.insert(10, b"Alice").unwrap();
    table.insert(30, b"Charlie").unwrap();

    assert_eq!(table.get_total_count().unwrap(), 3);

    let rows = table.scan().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].0, 10);
    assert_eq!(&rows[0].1[..5], b"Alice");
    assert_eq!(rows[1].0, 20);
    assert_eq!(&rows[1].1[..3], b"Bob");
    assert_eq!(rows[2].0, 30);
    assert_eq!(&rows[2].1[..7], b"Charlie");

    // All three landed in the single leaf root.
    let root = LeafNode::from_page(
        table.pager().read_page(table.root_page_id()).unwrap(),
        table.root_page_id(),
    );
    assert_eq!(root.key_count(), 3);
}

#[test]
fn test_first_leaf_split_grows_root() {
    let (mut table, _dir) = create_test_table();
    let old_root_id = table.root_page_id();

    for key in 0..=LEAF_MAX_CELLS as u32 {
        table.insert(key, b"row").unwrap();
    }

    assert_eq!(table.get_total_count().unwrap(), LEAF_MAX_CELLS as u32 + 1);

    // Exactly one split: two leaves linked via the next-page pointer.
    let chain = leaf_chain(&table);
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[0], old_root_id);

    let left = LeafNode::from_page(table.pager().read_page(chain[0]).unwrap(), chain[0]);
    let right = LeafNode::from_page(table.pager().read_page(chain[1]).unwrap(), chain[1]);
    assert_eq!(left.next_leaf(), chain[1]);
    assert_eq!(
        left.key_count() + right.key_count(),
        LEAF_MAX_CELLS as u32 + 1
    );
    assert!(left.key(left.key_count() as usize - 1) < right.key(0));

    // The new root is an internal node holding one divider cell whose key is
    // the second leaf's first key.
    let new_root_id = table.root_page_id();
    assert_ne!(new_root_id, old_root_id);
    assert_eq!(tree_height(&table), 2);

    let root = InternalNode::from_page(table.pager().read_page(new_root_id).unwrap(), new_root_id);
    assert!(root.is_root());
    assert_eq!(root.key_count(), 1);
    assert_eq!(root.divider_key(0), right.key(0));
    assert_eq!(root.child(0), chain[0]);
    assert_eq!(root.right_child(), chain[1]);

    // Root-growth property: the old root lost its root flag and both
    // children adopted the new root as parent.
    assert!(!left.is_root());
    assert!(!right.is_root());
    assert_eq!(left.parent(), new_root_id);
    assert_eq!(right.parent(), new_root_id);
}

#[test]
fn test_sort_invariant_random_inserts() {
    let (mut table, _dir) = create_test_table();

    let mut keys: Vec<u32> = (0..5_000).collect();
    keys.shuffle(&mut rand::thread_rng());

    for &key in &keys {
        table.insert(key, &key.to_le_bytes()).unwrap();
    }

    assert_eq!(table.get_total_count().unwrap(), 5_000);

    let scanned = chained_keys(&table);
    assert_eq!(scanned.len(), 5_000);
    assert!(scanned.windows(2).all(|pair| pair[0] <= pair[1]));

    // Every key is reachable through a point lookup.
    for key in (0..5_000).step_by(97) {
        let value = table.find(key).unwrap().expect("inserted key must exist");
        assert_eq!(&value[..4], &key.to_le_bytes());
    }
}

#[test]
fn test_capacity_invariant_all_nodes() {
    let (mut table, _dir) = create_test_table();

    for key in 0..10_000u32 {
        table.insert(key, b"x").unwrap();
    }

    // Page 0 is the table header; every later page is a tree node.
    for page_id in 1..table.pager().num_pages() {
        let page = table.pager().read_page(page_id).unwrap();
        match node::node_type(page.as_bytes()).unwrap() {
            NodeType::Leaf => {
                assert!(node::key_count(page.as_bytes()) as usize <= LEAF_MAX_CELLS);
            }
            NodeType::Internal => {
                assert!(node::key_count(page.as_bytes()) as usize <= INTERNAL_MAX_CELLS);
            }
        }
    }
}

#[test]
fn test_scan_equals_inserted_multiset() {
    let (mut table, _dir) = create_test_table();

    let mut keys: Vec<u32> = (0..2_000).map(|i| i * 3 % 1_000).collect();
    keys.shuffle(&mut rand::thread_rng());
    for &key in &keys {
        table.insert(key, b"v").unwrap();
    }

    let mut expected = keys.clone();
    expected.sort_unstable();
    assert_eq!(chained_keys(&table), expected);
}

#[test]
fn test_duplicate_keys_survive_splits() {
    let (mut table, _dir) = create_test_table();

    // Enough duplicates of one key to split a leaf several times over.
    for i in 0..400u32 {
        table.insert(7, &i.to_le_bytes()).unwrap();
    }

    assert_eq!(table.get_total_count().unwrap(), 400);
    let keys = chained_keys(&table);
    assert_eq!(keys.len(), 400);
    assert!(keys.iter().all(|&k| k == 7));
    assert!(table.find(7).unwrap().is_some());
}

#[test]
fn test_three_level_tree_sequential_inserts() {
    let (mut table, _dir) = create_test_table();

    // Enough sequential inserts to fill the internal root and split it.
    let total = 30_000u32;
    for key in 0..total {
        table.insert(key, &key.to_le_bytes()).unwrap();
    }

    assert_eq!(table.get_total_count().unwrap(), total);
    assert_eq!(tree_height(&table), 3);

    // Right after the internal-level split the root holds a single divider.
    let root_id = table.root_page_id();
    let root = InternalNode::from_page(table.pager().read_page(root_id).unwrap(), root_id);
    assert!(root.is_root());
    assert_eq!(root.key_count(), 1);

    // The full key sequence is still reachable in order.
    let keys = chained_keys(&table);
    assert_eq!(keys.len(), total as usize);
    assert!(keys.windows(2).all(|pair| pair[0] <= pair[1]));

    for key in (0..total).step_by(1_013) {
        assert!(table.find(key).unwrap().is_some());
    }
}

#[test]
fn test_reopen_after_splits_preserves_tree() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("reopen.db");
    let root_before;

    {
        let mut table = Table::open(&path, false).unwrap();
        for key in 0..1_000u32 {
            table.insert(key, &key.to_le_bytes()).unwrap();
        }
        root_before = table.root_page_id();
    }

    let table = Table::open(&path, false).unwrap();
    assert_eq!(table.root_page_id(), root_before);
    assert_eq!(table.get_total_count().unwrap(), 1_000);

    let keys = chained_keys(&table);
    assert_eq!(keys.len(), 1_000);
    assert!(keys.windows(2).all(|pair| pair[0] <= pair[1]));

    for key in [0u32, 1, 499, 998, 999] {
        let value = table.find(key).unwrap().expect("key must survive reopen");
        assert_eq!(&value[..4], &key.to_le_bytes());
    }
}

#[test]
fn test_range_scan_across_leaves() {
    let (mut table, _dir) = create_test_table();

    for key in 0..500u32 {
        table.insert(key, &key.to_le_bytes()).unwrap();
    }
    assert!(leaf_chain(&table).len() > 1);

    let rows = table.range_scan(Some(100), Some(300)).unwrap();
    assert_eq!(rows.len(), 201);
    assert_eq!(rows[0].0, 100);
    assert_eq!(rows[200].0, 300);
    assert!(rows.windows(2).all(|pair| pair[0].0 <= pair[1].0));
}
