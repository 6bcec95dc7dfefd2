//! Storage engine for Basalt.
//!
//! An embedded, single-file, page-based B+Tree keyed by `u32`:
//!
//! - Pager for page-level file I/O and monotonic page allocation
//! - B+Tree leaf and internal nodes over a shared header layout
//! - Table orchestration: descent, insertion, cascading split propagation
//! - Registry mapping table names to open table handles
//!
//! ```no_run
//! use basalt_storage::Table;
//!
//! # fn main() -> basalt_common::Result<()> {
//! let mut table = Table::open("data/users.db", true)?;
//! table.insert(42, b"Alice")?;
//! assert!(table.find(42)?.is_some());
//! # Ok(())
//! # }
//! ```

pub mod btree;
mod database;
mod pager;
mod table;

pub use btree::{
    InternalNode, LeafNode, NodeType, SplitResult, HEADER_SIZE, INTERNAL_CELL_SIZE,
    INTERNAL_MAX_CELLS, LEAF_CELL_SIZE, LEAF_MAX_CELLS, LEAF_VALUE_SIZE,
};
pub use database::Database;
pub use pager::Pager;
pub use table::{Table, TABLE_MAGIC};
