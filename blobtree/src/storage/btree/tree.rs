//! The tree engine.
//!
//! Maps i32 keys to byte values. The index lives in `<base>.idx` as 1024-byte
//! page slots; values are appended to `<base>.dat` and referenced from leaf
//! links by offset.
//!
//! The root always occupies slot 0. When the root splits, its shrunk left part
//! is already persisted elsewhere, the old root is relocated to a fresh slot,
//! and a new single-key internal root is written to slot 0.
//!
//! Every mutation is written to the index file before the call returns, so
//! evicting a page from the cache never loses data.

use std::ffi::OsString;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::config::StoreConfig;
use crate::storage::blob::BlobFile;
use crate::storage::btree::node::{LOW_MARK, NO_LINK, Node, NodeError};
use crate::storage::cache::{CacheStats, NodeCache};
use crate::storage::file::{FileError, PageFile};
use crate::storage::page::{PageAddr, ROOT_ADDR};

/// Deepest tree any descent will walk before reporting a cycle.
const MAX_DEPTH: usize = 32;

/// Path of the index file for `base`.
#[must_use]
pub fn index_path(base: &Path) -> PathBuf {
    with_suffix(base, ".idx")
}

/// Path of the blob file for `base`.
#[must_use]
pub fn blob_path(base: &Path) -> PathBuf {
    with_suffix(base, ".dat")
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Summary of the tree shape and cache behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    /// Page slots in the index file.
    pub page_count: u64,
    /// Number of levels, 1 for a lone root leaf.
    pub depth: usize,
    /// Pages currently held by the cache (the root is held separately).
    pub cached_pages: usize,
    pub cache: CacheStats,
}

/// A disk-backed B-tree from i32 keys to byte values.
pub struct BTree {
    pages: PageFile,
    blobs: BlobFile,
    cache: NodeCache<PageAddr, Node>,
    root: Node,
}

impl BTree {
    /// Open the store at `base` with the default cache size.
    ///
    /// Creates `<base>.idx` and `<base>.dat` if they are missing.
    pub fn open(base: &Path) -> Result<Self, BTreeError> {
        Self::open_with_config(&StoreConfig::new(base))
    }

    /// Open the store described by `config`.
    pub fn open_with_config(config: &StoreConfig) -> Result<Self, BTreeError> {
        Self::open_with_capacity(&config.base_path, config.cache_pages)
    }

    /// Open the store at `base` with a cache of `cache_pages` pages.
    ///
    /// Fails only if a file cannot be opened or created. A slot 0 that cannot
    /// be read or decoded is replaced by a fresh empty root.
    pub fn open_with_capacity(base: &Path, cache_pages: NonZeroUsize) -> Result<Self, BTreeError> {
        let mut pages = PageFile::open(&index_path(base))?;
        let blobs = BlobFile::open(&blob_path(base))?;

        let existing = if pages.is_empty()? {
            None
        } else {
            match Self::read_root(&mut pages) {
                Ok(root) => Some(root),
                Err(e) => {
                    tracing::warn!(
                        path = %pages.path().display(),
                        "unreadable root page, starting a fresh tree: {e}"
                    );
                    None
                }
            }
        };

        let root = match existing {
            Some(root) => root,
            None => {
                let root = Node::new(ROOT_ADDR, true);
                pages.write_page(ROOT_ADDR, &root.to_page())?;
                tracing::debug!(path = %pages.path().display(), "created empty root");
                root
            }
        };

        tracing::info!(
            base = %base.display(),
            pages = pages.next_addr()?,
            cache_pages = cache_pages.get(),
            "opened store"
        );

        Ok(Self {
            pages,
            blobs,
            cache: NodeCache::new(cache_pages),
            root,
        })
    }

    fn read_root(pages: &mut PageFile) -> Result<Node, BTreeError> {
        let page = pages.read_page(ROOT_ADDR)?;
        Ok(Node::from_page(ROOT_ADDR, &page)?)
    }

    /// Sync and close both files.
    ///
    /// Both files are closed even if the first one fails; the first error is
    /// returned.
    pub fn close(self) -> Result<(), BTreeError> {
        let Self { pages, blobs, .. } = self;
        let pages = pages.close();
        let blobs = blobs.close();
        pages?;
        blobs?;
        Ok(())
    }

    /// Sync both files to disk.
    pub fn flush(&self) -> Result<(), BTreeError> {
        self.pages.sync()?;
        self.blobs.sync()?;
        Ok(())
    }

    /// Look up the value stored under `key`.
    ///
    /// When a key was inserted more than once, the most recent value wins.
    pub fn lookup(&mut self, key: i32) -> Result<Option<Vec<u8>>, BTreeError> {
        if self.root.is_leaf() && self.root.is_empty() {
            return Ok(None);
        }

        let (leaf, _) = self.find_leaf(key)?;
        let offset = self.with_node(leaf, |node| -> Result<Option<u64>, NodeError> {
            let idx = node.search(key)?;
            Ok((idx < node.len() && node.key(idx) == key).then(|| node.get_link(idx)))
        })??;

        match offset {
            Some(offset) => Ok(Some(self.blobs.read(offset)?)),
            None => Ok(None),
        }
    }

    /// Insert `value` under `key`.
    ///
    /// Duplicate keys are not rejected: the new entry shadows the old one and
    /// the old value stays in the blob file, unreachable.
    pub fn insert(&mut self, key: i32, value: &[u8]) -> Result<(), BTreeError> {
        let offset = self.blobs.append(value)?;
        let (leaf, mut path) = self.find_leaf(key)?;

        let mut current = self.load_node(leaf)?;
        if !current.is_full() {
            current.insert_local(key, offset);
            return self.store(current);
        }

        // Split full pages bottom-up until a parent has room or the root splits.
        let (mut pending_key, mut pending_link) = (key, offset);
        loop {
            let pivot = current.key(LOW_MARK - 1);
            let mut sibling = current.split(LOW_MARK);
            if pending_key <= pivot {
                sibling.insert_local(pending_key, pending_link);
            } else {
                current.insert_local(pending_key, pending_link);
            }

            let sibling_addr = self.next_addr()?;
            sibling.set_addr(sibling_addr);
            tracing::debug!(
                page = current.addr(),
                sibling = sibling_addr,
                pivot,
                leaf = current.is_leaf(),
                "split page"
            );
            self.store(sibling)?;
            self.store(current)?;

            pending_key = pivot;
            pending_link = sibling_addr;

            let Some(parent) = path.pop() else {
                return self.grow_root(pending_key, pending_link);
            };
            current = self.load_node(parent)?;
            if !current.is_full() {
                current.insert_local(pending_key, pending_link);
                return self.store(current);
            }
        }
    }

    /// Address the next new page will be written to.
    ///
    /// This is the index file length rounded up to a slot boundary; slots are
    /// never reused.
    pub fn next_addr(&self) -> Result<PageAddr, BTreeError> {
        let addr = self.pages.next_addr()?;
        if addr >= NO_LINK {
            return Err(FileError::LinkOverflow(addr).into());
        }
        Ok(addr)
    }

    /// Walk the whole tree and check its structure.
    ///
    /// Checks that slot 0 matches the in-memory root, that every page holds its
    /// invariants, that child links point at allocated non-root slots, and that
    /// all pages at one depth are of the same kind. The first violation is
    /// logged and `false` returned.
    pub fn invariants_hold(&mut self) -> Result<bool, BTreeError> {
        let on_disk = Node::from_page(ROOT_ADDR, &self.pages.read_page(ROOT_ADDR)?)?;
        if on_disk != self.root {
            tracing::warn!("root in memory differs from slot 0");
            return Ok(false);
        }

        let limit = self.next_addr()?;
        let mut level = vec![ROOT_ADDR];
        let mut depth = 0;

        while !level.is_empty() {
            depth += 1;
            if depth > MAX_DEPTH {
                tracing::warn!(depth, "tree deeper than any valid tree");
                return Ok(false);
            }

            let mut next_level = Vec::new();
            let mut level_is_leaf = None;

            for addr in level {
                let node = self.load_node(addr)?;
                if !node.invariants_hold() {
                    tracing::warn!(addr, "page failed invariant check");
                    return Ok(false);
                }

                match level_is_leaf {
                    None => level_is_leaf = Some(node.is_leaf()),
                    Some(is_leaf) if is_leaf != node.is_leaf() => {
                        tracing::warn!(addr, depth, "inconsistent leafness");
                        return Ok(false);
                    }
                    Some(_) => {}
                }

                for child in node.children() {
                    if child == ROOT_ADDR || child >= limit {
                        tracing::warn!(addr, child, limit, "child link out of range");
                        return Ok(false);
                    }
                    next_level.push(child);
                }
            }

            level = next_level;
        }

        Ok(true)
    }

    /// Log every page, level by level, at debug level.
    pub fn dump(&mut self) -> Result<(), BTreeError> {
        tracing::debug!("dumping tree");
        let mut level = vec![ROOT_ADDR];
        while !level.is_empty() {
            let mut next_level = Vec::new();
            for addr in level {
                let node = self.load_node(addr)?;
                tracing::debug!("{node}");
                next_level.extend(node.children());
            }
            level = next_level;
        }
        Ok(())
    }

    /// Number of levels, following the leftmost path.
    pub fn depth(&mut self) -> Result<usize, BTreeError> {
        let mut depth = 1;
        let mut node = self.root.clone();
        while !node.is_leaf() {
            let child = node.get_link(0);
            if child == NO_LINK || child == ROOT_ADDR {
                return Err(BTreeError::InvalidChild {
                    parent: node.addr(),
                    index: 0,
                    link: child,
                });
            }
            node = self.load_node(child)?;
            depth += 1;
            if depth > MAX_DEPTH {
                return Err(BTreeError::TooDeep { addr: child });
            }
        }
        Ok(depth)
    }

    /// Shape and cache statistics.
    pub fn stats(&mut self) -> Result<TreeStats, BTreeError> {
        Ok(TreeStats {
            page_count: self.pages.next_addr()?,
            depth: self.depth()?,
            cached_pages: self.cache.len(),
            cache: self.cache.stats(),
        })
    }

    /// Descend from the root to the leaf responsible for `key`.
    ///
    /// Returns the leaf address and the internal pages passed on the way,
    /// root first.
    fn find_leaf(&mut self, key: i32) -> Result<(PageAddr, Vec<PageAddr>), BTreeError> {
        let mut addr = ROOT_ADDR;
        let mut path = Vec::new();

        loop {
            let step = self.with_node(addr, |node| -> Result<Option<(usize, u64)>, NodeError> {
                if node.is_leaf() {
                    return Ok(None);
                }
                let index = node.search(key)?;
                Ok(Some((index, node.get_link(index))))
            })??;

            let Some((index, child)) = step else {
                return Ok((addr, path));
            };
            if child == NO_LINK || child == ROOT_ADDR {
                return Err(BTreeError::InvalidChild {
                    parent: addr,
                    index,
                    link: child,
                });
            }
            path.push(addr);
            if path.len() >= MAX_DEPTH {
                return Err(BTreeError::TooDeep { addr: child });
            }
            addr = child;
        }
    }

    /// Replace the root after it split.
    ///
    /// The left half already lives at `sibling`; the shrunk old root moves to
    /// a fresh slot and a new internal root takes slot 0.
    fn grow_root(&mut self, pivot: i32, sibling: PageAddr) -> Result<(), BTreeError> {
        let relocated = self.next_addr()?;
        let mut old_root = self.root.clone();
        old_root.set_addr(relocated);
        self.store(old_root)?;

        let mut new_root = Node::new(ROOT_ADDR, false);
        new_root.insert_local(pivot, sibling);
        new_root.set_link(new_root.len(), relocated);
        self.store(new_root)?;

        tracing::debug!(pivot, sibling, relocated, "root split");
        Ok(())
    }

    /// Run `f` on the page at `addr`, reading it into the cache on a miss.
    fn with_node<R>(
        &mut self,
        addr: PageAddr,
        f: impl FnOnce(&Node) -> R,
    ) -> Result<R, BTreeError> {
        if addr == ROOT_ADDR {
            return Ok(f(&self.root));
        }
        if let Some(node) = self.cache.get(&addr) {
            return Ok(f(node));
        }

        let page = self.pages.read_page(addr)?;
        let node = Node::from_page(addr, &page)?;
        let result = f(&node);
        self.cache.put(addr, node);
        Ok(result)
    }

    /// Owned copy of the page at `addr`.
    fn load_node(&mut self, addr: PageAddr) -> Result<Node, BTreeError> {
        self.with_node(addr, Node::clone)
    }

    /// Persist `node` at its address, then make it the cached copy.
    fn store(&mut self, node: Node) -> Result<(), BTreeError> {
        self.pages.write_page(node.addr(), &node.to_page())?;
        if node.addr() == ROOT_ADDR {
            self.root = node;
        } else {
            self.cache.put(node.addr(), node);
        }
        Ok(())
    }
}

impl std::fmt::Debug for BTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BTree")
            .field("index", &self.pages.path())
            .field("blobs", &self.blobs.path())
            .field("root", &self.root)
            .field("cache", &self.cache)
            .finish()
    }
}

/// Errors that can occur during tree operations.
#[derive(Debug)]
pub enum BTreeError {
    /// Index or blob file error.
    File(FileError),
    /// Page decoding or search error.
    Node(NodeError),
    /// An internal page links to a slot that cannot be a child.
    InvalidChild {
        parent: PageAddr,
        index: usize,
        link: u64,
    },
    /// A descent passed more levels than any valid tree has, so the links
    /// form a cycle.
    TooDeep { addr: PageAddr },
}

impl std::fmt::Display for BTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(e) => write!(f, "file error: {e}"),
            Self::Node(e) => write!(f, "node error: {e}"),
            Self::InvalidChild {
                parent,
                index,
                link,
            } => write!(f, "page {parent} has invalid child link {link} at {index}"),
            Self::TooDeep { addr } => {
                write!(f, "descent reached page {addr} deeper than {MAX_DEPTH} levels")
            }
        }
    }
}

impl std::error::Error for BTreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::File(e) => Some(e),
            Self::Node(e) => Some(e),
            Self::InvalidChild { .. } | Self::TooDeep { .. } => None,
        }
    }
}

impl From<FileError> for BTreeError {
    fn from(e: FileError) -> Self {
        Self::File(e)
    }
}

impl From<NodeError> for BTreeError {
    fn from(e: NodeError) -> Self {
        Self::Node(e)
    }
}
