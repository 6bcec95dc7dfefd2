//! B+Tree node implementations over fixed-size pages.
//!
//! Every node page shares a 20-byte header (see [`node`]) followed by a
//! contiguous cell array:
//!
//! Leaf page layout:
//! ```text
//! +------------------------+ 0
//! | node header (20 bytes) |
//! +------------------------+ 20
//! | key: u32 | value: 32B  |  <- 36-byte cells, key-sorted, zero-gap
//! | ...                    |
//! +------------------------+ 20 + 36 * key_count
//! ```
//!
//! Internal page layout:
//! ```text
//! +------------------------+ 0
//! | node header (20 bytes) |
//! +------------------------+ 20
//! | child: u32 | key: u32  |  <- 8-byte cells, divider-sorted
//! | ...                    |
//! +------------------------+ 20 + 8 * key_count
//! ```
//!
//! A divider key is the inclusive upper bound for its paired child; the
//! header's right-child pointer covers everything greater. Leaves link into a
//! forward chain through the same header slot, which is what ordered scans
//! walk.

pub mod internal;
pub mod leaf;
pub mod node;

pub use internal::{InternalNode, INTERNAL_CELL_SIZE, INTERNAL_MAX_CELLS};
pub use leaf::{LeafNode, LEAF_CELL_SIZE, LEAF_MAX_CELLS, LEAF_VALUE_SIZE};
pub use node::{NodeType, SplitResult, HEADER_SIZE};
