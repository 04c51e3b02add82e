//! Storage layer for the key-value store.
//!
//! # File Format
//!
//! A store at `<base>` is two files:
//!
//! - `<base>.idx`: 1024-byte page slots holding B-tree nodes. Slot 0 is the
//!   root. Only the first 908 bytes of a slot carry data.
//! - `<base>.dat`: append-only value records, each a little-endian u32 length
//!   followed by the bytes.
//!
//! # Usage
//!
//! ```no_run
//! use std::path::Path;
//! use blobtree::storage::BTree;
//!
//! let mut tree = BTree::open(Path::new("/tmp/store"))?;
//! tree.insert(33, b"hello")?;
//! assert_eq!(tree.lookup(33)?, Some(b"hello".to_vec()));
//! tree.close()?;
//! # Ok::<(), blobtree::storage::BTreeError>(())
//! ```

mod blob;
pub mod btree;
mod cache;
mod codec;
mod file;
mod page;

pub use blob::BlobFile;
pub use btree::{BTree, BTreeError, Node, NodeError, TreeStats};
pub use cache::{CacheStats, NodeCache, ReleaseHook};
pub use codec::{MAX_LINK, read_link, write_link};
pub use file::{FileError, PageFile};
pub use page::{PAGE_PAYLOAD, PAGE_SIZE, Page, PageAddr, ROOT_ADDR};
