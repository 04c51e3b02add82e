//! Page slot constants and the raw page buffer.
//!
//! The index file is a dense array of 1024-byte slots. Only the first
//! `PAGE_PAYLOAD` bytes of a slot are ever written; the rest is padding.

/// Slot size in bytes. Must stay a power of two so allocation can round with a mask.
pub const PAGE_SIZE: usize = 1024;

/// Slot size as u64 for offset calculations.
pub const PAGE_SIZE_U64: u64 = PAGE_SIZE as u64;

/// A page address (slot offset divided by `PAGE_SIZE`).
pub type PageAddr = u64;

/// Address of the slot that always holds the root page.
pub const ROOT_ADDR: PageAddr = 0;

/// Offset of the leaf flag byte.
pub const LEAF_FLAG_OFFSET: usize = 0;

/// Offset of the little-endian key count.
pub const KEY_COUNT_OFFSET: usize = 1;

/// Offset of the first big-endian key.
pub const KEYS_OFFSET: usize = 3;

/// Maximum number of keys a page can hold.
pub const MAX_KEYS: usize = 100;

/// Offset of the first 40-bit link.
pub const LINKS_OFFSET: usize = KEYS_OFFSET + MAX_KEYS * 4;

/// Number of link slots (one more than the key capacity).
pub const MAX_LINKS: usize = MAX_KEYS + 1;

/// Size of the fixed link region in bytes.
pub const LINK_REGION_SIZE: usize = MAX_LINKS * 5;

/// Number of bytes of a slot that carry data.
pub const PAGE_PAYLOAD: usize = LINKS_OFFSET + LINK_REGION_SIZE;

const _: () = assert!(PAGE_SIZE.is_power_of_two());
const _: () = assert!(PAGE_PAYLOAD <= PAGE_SIZE);

/// Byte offset of a slot within the index file.
#[must_use]
pub const fn slot_offset(addr: PageAddr) -> u64 {
    addr * PAGE_SIZE_U64
}

/// A raw page buffer holding the data-carrying prefix of one slot.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    data: Box<[u8; PAGE_PAYLOAD]>,
}

impl Page {
    /// Create a new zeroed page.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Box::new([0u8; PAGE_PAYLOAD]),
        }
    }

    /// Get the raw page data.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; PAGE_PAYLOAD] {
        &self.data
    }

    /// Get mutable access to the raw page data.
    pub fn as_bytes_mut(&mut self) -> &mut [u8; PAGE_PAYLOAD] {
        &mut self.data
    }

    /// Read bytes at a specific offset.
    #[must_use]
    pub fn read_bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    /// Write bytes at a specific offset.
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Read a u8 at the given offset.
    #[must_use]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    /// Write a u8 at the given offset.
    pub fn write_u8(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("header", &&self.data[..KEYS_OFFSET])
            .finish_non_exhaustive()
    }
}
