//! Disk-backed B-tree index.
//!
//! # Structure
//!
//! - Internal pages hold keys and child page addresses. The child at index
//!   `i` covers keys up to and including `keys[i]`; the trailing child covers
//!   everything larger.
//! - Leaf pages hold keys and blob file offsets.
//!
//! The root always lives in slot 0 of the index file.

mod node;
mod tree;

pub use node::{HIGH_MARK, LOW_MARK, NO_LINK, Node, NodeError};
pub use tree::{BTree, BTreeError, TreeStats, blob_path, index_path};
