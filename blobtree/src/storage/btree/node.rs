//! Decoded tree pages.
//!
//! A node keeps its keys as a vector and its links in the exact fixed-width
//! region they occupy on disk, so positional link access does not depend on
//! the logical key count.
//!
//! Internal pages route a key to child `search(key)`: the leftmost child whose
//! separating key is `>=` the target, or the trailing child when the target is
//! larger than every key. A split keeps the pivot as the last key of the left
//! sibling, so a left sibling of an internal page has no trailing child. That
//! slot holds `NO_LINK`.

use std::fmt;

use crate::storage::codec::{
    KEY_WIDTH, LINK_WIDTH, MAX_LINK, read_i32_array_be, read_link, read_u16_le,
    write_i32_array_be, write_link, write_u16_le,
};
use crate::storage::page::{
    KEY_COUNT_OFFSET, KEYS_OFFSET, LEAF_FLAG_OFFSET, LINK_REGION_SIZE, LINKS_OFFSET, MAX_KEYS,
    Page, PageAddr, ROOT_ADDR,
};

/// Minimum number of keys in a non-root page.
pub const LOW_MARK: usize = 50;

/// Maximum number of keys in any page.
pub const HIGH_MARK: usize = MAX_KEYS;

/// Link value marking an absent trailing child.
pub const NO_LINK: u64 = MAX_LINK;

const LEAF_FLAG: u8 = 1;
const INTERNAL_FLAG: u8 = 0;

/// One decoded page of the tree.
#[derive(Clone, PartialEq, Eq)]
pub struct Node {
    addr: PageAddr,
    is_leaf: bool,
    keys: Vec<i32>,
    links: [u8; LINK_REGION_SIZE],
}

impl Node {
    /// Create an empty node that will live at `addr`.
    #[must_use]
    pub fn new(addr: PageAddr, is_leaf: bool) -> Self {
        Self {
            addr,
            is_leaf,
            keys: Vec::with_capacity(HIGH_MARK),
            links: [0u8; LINK_REGION_SIZE],
        }
    }

    /// Decode the node stored in `page`.
    pub fn from_page(addr: PageAddr, page: &Page) -> Result<Self, NodeError> {
        let is_leaf = match page.read_u8(LEAF_FLAG_OFFSET) {
            LEAF_FLAG => true,
            INTERNAL_FLAG => false,
            other => return Err(NodeError::InvalidLeafFlag(other)),
        };

        let count = read_u16_le([
            page.read_u8(KEY_COUNT_OFFSET),
            page.read_u8(KEY_COUNT_OFFSET + 1),
        ]) as usize;
        if count > HIGH_MARK {
            return Err(NodeError::KeyCountOutOfRange(count));
        }

        let keys = read_i32_array_be(page.as_bytes(), KEYS_OFFSET, count);
        let mut links = [0u8; LINK_REGION_SIZE];
        links.copy_from_slice(page.read_bytes(LINKS_OFFSET, LINK_REGION_SIZE));

        Ok(Self {
            addr,
            is_leaf,
            keys,
            links,
        })
    }

    /// Encode the node into a fresh page buffer.
    ///
    /// Key slots past the key count are zero; the link region is always
    /// written in full.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // key count is bounded by HIGH_MARK
    pub fn to_page(&self) -> Page {
        let mut page = Page::new();
        page.write_u8(
            LEAF_FLAG_OFFSET,
            if self.is_leaf { LEAF_FLAG } else { INTERNAL_FLAG },
        );
        page.write_bytes(KEY_COUNT_OFFSET, &write_u16_le(self.keys.len() as u16));
        write_i32_array_be(&self.keys, page.as_bytes_mut(), KEYS_OFFSET);
        page.write_bytes(LINKS_OFFSET, &self.links);
        page
    }

    /// Address this node is stored at.
    #[must_use]
    pub const fn addr(&self) -> PageAddr {
        self.addr
    }

    /// Move the node to another address. Takes effect on the next store.
    pub const fn set_addr(&mut self, addr: PageAddr) {
        self.addr = addr;
    }

    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether another key would exceed `HIGH_MARK`.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.keys.len() >= HIGH_MARK
    }

    #[must_use]
    pub fn keys(&self) -> &[i32] {
        &self.keys
    }

    #[must_use]
    pub fn key(&self, index: usize) -> i32 {
        self.keys[index]
    }

    /// Index of the leftmost key `>= key`, or `len()` if every key is smaller.
    pub fn search(&self, key: i32) -> Result<usize, NodeError> {
        if self.keys.is_empty() {
            return Err(NodeError::EmptyNode(self.addr));
        }
        Ok(self.keys.partition_point(|&k| k < key))
    }

    /// Link stored in slot `index`, regardless of the key count.
    #[must_use]
    pub fn get_link(&self, index: usize) -> u64 {
        read_link(&self.links, index)
    }

    /// Overwrite link slot `index`.
    pub fn set_link(&mut self, index: usize, link: u64) {
        write_link(&mut self.links, index, link);
    }

    /// Insert `(key, link)` in key order, ahead of any equal keys.
    ///
    /// Links at and after the insertion point, the trailing one included,
    /// shift one slot to the right.
    ///
    /// # Panics
    /// Panics if the node is already full.
    pub fn insert_local(&mut self, key: i32, link: u64) {
        assert!(
            self.keys.len() < HIGH_MARK,
            "insert into full node {}",
            self.addr
        );

        let idx = self.keys.partition_point(|&k| k < key);
        let end = (self.keys.len() + 1) * LINK_WIDTH;
        self.links
            .copy_within(idx * LINK_WIDTH..end, (idx + 1) * LINK_WIDTH);
        self.set_link(idx, link);
        self.keys.insert(idx, key);
    }

    /// Move the first `left_count` keys and their links into a new sibling.
    ///
    /// This node keeps the remaining keys and shifts its links, the trailing
    /// one included, down to slot 0. The sibling has the same kind; an
    /// internal sibling gets `NO_LINK` as its trailing link.
    ///
    /// The sibling's address is left at 0 for the caller to assign.
    #[must_use]
    pub fn split(&mut self, left_count: usize) -> Self {
        debug_assert!(left_count <= self.keys.len());

        let mut sibling = Self::new(ROOT_ADDR, self.is_leaf);
        sibling.keys = self.keys.drain(..left_count).collect();
        sibling.links[..left_count * LINK_WIDTH]
            .copy_from_slice(&self.links[..left_count * LINK_WIDTH]);
        if !sibling.is_leaf {
            sibling.set_link(left_count, NO_LINK);
        }

        let end = (left_count + self.keys.len() + 1) * LINK_WIDTH;
        self.links.copy_within(left_count * LINK_WIDTH..end, 0);

        sibling
    }

    /// Child addresses of an internal node, in key order.
    #[must_use]
    pub fn children(&self) -> Vec<PageAddr> {
        if self.is_leaf {
            return Vec::new();
        }
        let mut children: Vec<PageAddr> = (0..self.keys.len()).map(|i| self.get_link(i)).collect();
        let trailing = self.get_link(self.keys.len());
        if trailing != NO_LINK {
            children.push(trailing);
        }
        children
    }

    /// Check the key count bounds and key order of this page.
    ///
    /// The root is exempt from the lower bound.
    #[must_use]
    pub fn invariants_hold(&self) -> bool {
        let count = self.keys.len();
        if count < LOW_MARK && self.addr != ROOT_ADDR {
            tracing::warn!(addr = self.addr, count, "too few keys");
            return false;
        }
        if count > HIGH_MARK {
            tracing::warn!(addr = self.addr, count, "too many keys");
            return false;
        }
        if let Some(i) = self.keys.windows(2).position(|w| w[0] > w[1]) {
            tracing::warn!(
                addr = self.addr,
                index = i,
                left = self.keys[i],
                right = self.keys[i + 1],
                "keys not sorted"
            );
            return false;
        }
        true
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node {}: [ ", self.addr)?;
        for (i, key) in self.keys.iter().enumerate() {
            write!(f, "{key}->{} ", self.get_link(i))?;
        }
        if !self.is_leaf {
            match self.get_link(self.keys.len()) {
                NO_LINK => write!(f, "@->none ")?,
                link => write!(f, "@->{link} ")?,
            }
        }
        write!(f, "]")
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("addr", &self.addr)
            .field("is_leaf", &self.is_leaf)
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

/// Errors decoding or searching a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The leaf flag byte is neither 0 nor 1.
    InvalidLeafFlag(u8),
    /// The stored key count exceeds the page capacity.
    KeyCountOutOfRange(usize),
    /// A search reached a page with no keys.
    EmptyNode(PageAddr),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLeafFlag(v) => write!(f, "invalid leaf flag: 0x{v:02x}"),
            Self::KeyCountOutOfRange(n) => {
                write!(f, "key count {n} exceeds page capacity {HIGH_MARK}")
            }
            Self::EmptyNode(addr) => write!(f, "search on empty page {addr}"),
        }
    }
}

impl std::error::Error for NodeError {}

// Keys must fit in the region before the links start.
const _: () = assert!(KEYS_OFFSET + HIGH_MARK * KEY_WIDTH == LINKS_OFFSET);

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_with(keys: &[i32]) -> Node {
        let mut node = Node::new(7, true);
        for &k in keys {
            node.insert_local(k, u64::try_from(k).expect("non-negative key") * 10);
        }
        node
    }

    #[test]
    fn test_encode_layout() {
        let mut node = Node::new(3, true);
        node.insert_local(0x0102_0304, 0x01_0203_0405);
        node.insert_local(-1, 9);

        let page = node.to_page();
        let bytes = page.as_bytes();

        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[1..3], &[2, 0]);
        assert_eq!(&bytes[3..7], &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(&bytes[7..11], &[1, 2, 3, 4]);
        assert_eq!(&bytes[403..408], &[9, 0, 0, 0, 0]);
        assert_eq!(&bytes[408..413], &[5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_decode_restores_node() {
        let mut node = Node::new(4, false);
        node.insert_local(10, 1);
        node.insert_local(20, 2);
        node.set_link(2, 3);

        let decoded = Node::from_page(4, &node.to_page()).expect("decode");
        assert_eq!(decoded, node);
        assert!(!decoded.is_leaf());
        assert_eq!(decoded.children(), vec![1, 2, 3]);
    }

    #[test]
    fn test_decode_rejects_bad_header() {
        let mut page = Page::new();
        page.write_u8(0, 7);
        assert_eq!(
            Node::from_page(1, &page),
            Err(NodeError::InvalidLeafFlag(7))
        );

        let mut page = Page::new();
        page.write_u8(0, 1);
        page.write_bytes(1, &[101, 0]);
        assert_eq!(
            Node::from_page(1, &page),
            Err(NodeError::KeyCountOutOfRange(101))
        );
    }

    #[test]
    fn test_search_finds_leftmost_not_less() {
        let node = leaf_with(&[10, 20, 20, 30]);

        assert_eq!(node.search(5), Ok(0));
        assert_eq!(node.search(10), Ok(0));
        assert_eq!(node.search(11), Ok(1));
        assert_eq!(node.search(20), Ok(1));
        assert_eq!(node.search(30), Ok(3));
        assert_eq!(node.search(31), Ok(4));
    }

    #[test]
    fn test_search_on_empty_node_is_an_error() {
        let node = Node::new(12, true);
        assert_eq!(node.search(1), Err(NodeError::EmptyNode(12)));
    }

    #[test]
    fn test_insert_local_keeps_links_aligned() {
        let node = leaf_with(&[30, 10, 20]);
        assert_eq!(node.keys(), &[10, 20, 30]);
        assert_eq!(node.get_link(0), 100);
        assert_eq!(node.get_link(1), 200);
        assert_eq!(node.get_link(2), 300);
    }

    #[test]
    fn test_insert_local_duplicate_goes_first() {
        let mut node = leaf_with(&[10, 20]);
        node.insert_local(20, 999);

        assert_eq!(node.keys(), &[10, 20, 20]);
        let idx = node.search(20).expect("search");
        assert_eq!(node.get_link(idx), 999);
        assert_eq!(node.get_link(idx + 1), 200);
    }

    #[test]
    fn test_insert_local_shifts_trailing_link() {
        let mut node = Node::new(0, false);
        node.insert_local(50, 1);
        node.set_link(1, 2);

        node.insert_local(25, 3);
        assert_eq!(node.children(), vec![3, 1, 2]);
    }

    #[test]
    #[should_panic(expected = "insert into full node")]
    fn test_insert_local_into_full_node_panics() {
        let keys: Vec<i32> = (0..100).collect();
        let mut node = leaf_with(&keys);
        node.insert_local(100, 0);
    }

    #[test]
    fn test_split_leaf() {
        let keys: Vec<i32> = (0..100).collect();
        let mut node = leaf_with(&keys);

        let sibling = node.split(LOW_MARK);

        assert!(sibling.is_leaf());
        assert_eq!(sibling.keys(), &keys[..50]);
        assert_eq!(node.keys(), &keys[50..]);
        assert_eq!(sibling.get_link(49), 490);
        assert_eq!(node.get_link(0), 500);
        assert_eq!(node.get_link(49), 990);
    }

    #[test]
    fn test_split_internal_marks_missing_trailing_child() {
        let mut node = Node::new(0, false);
        for k in 0..100 {
            node.insert_local(k, 1000 + u64::try_from(k).expect("non-negative"));
        }
        node.set_link(100, 5000);

        let sibling = node.split(LOW_MARK);

        assert_eq!(sibling.get_link(LOW_MARK), NO_LINK);
        assert_eq!(sibling.children().len(), 50);
        assert_eq!(sibling.children()[49], 1049);

        assert_eq!(node.children().len(), 51);
        assert_eq!(node.children()[0], 1050);
        assert_eq!(node.get_link(50), 5000);
    }

    #[test]
    fn test_no_link_survives_later_inserts() {
        let mut node = Node::new(9, false);
        for k in 0..100 {
            node.insert_local(k * 2, u64::try_from(k).expect("non-negative"));
        }
        let mut sibling = node.split(LOW_MARK);
        sibling.insert_local(7, 777);

        assert_eq!(sibling.get_link(sibling.len()), NO_LINK);
        assert_eq!(sibling.children().len(), sibling.len());
    }

    #[test]
    fn test_invariants() {
        let mut root = leaf_with(&[1, 2, 3]);
        root.set_addr(ROOT_ADDR);
        assert!(root.invariants_hold());

        // Non-root pages need LOW_MARK keys.
        let small = leaf_with(&[1, 2, 3]);
        assert!(!small.invariants_hold());

        let keys: Vec<i32> = (0..60).collect();
        assert!(leaf_with(&keys).invariants_hold());
    }

    #[test]
    fn test_invariants_detect_unsorted_keys() {
        let keys: Vec<i32> = (0..60).collect();
        let mut page = leaf_with(&keys).to_page();
        // Overwrite key 10 with a value larger than key 11.
        page.write_bytes(KEYS_OFFSET + 10 * KEY_WIDTH, &1000i32.to_be_bytes());

        let node = Node::from_page(7, &page).expect("decode");
        assert!(!node.invariants_hold());
    }

    #[test]
    fn test_display() {
        let mut node = Node::new(2, false);
        node.insert_local(5, 8);
        assert_eq!(node.to_string(), "Node 2: [ 5->8 @->0 ]");

        let sibling = node.split(1);
        assert_eq!(sibling.to_string(), "Node 0: [ 5->8 @->none ]");
    }
}
