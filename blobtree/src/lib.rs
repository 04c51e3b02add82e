// A single-process key-value store: a disk-backed B-tree over i32 keys whose
// leaves point into an append-only value file.
//
// Components:
//  - Page slots and codecs for the on-disk formats
//  - Index and blob file I/O
//  - LRU cache of decoded pages
//  - The tree engine
//  - Line-oriented commands for the binary

pub mod command;
pub mod config;
pub mod storage;

pub use config::{ConfigError, StoreConfig};
pub use storage::{BTree, BTreeError};
