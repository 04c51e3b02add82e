//! Fixed-width integer codecs for the page and blob formats.
//!
//! Keys are stored big-endian, links and lengths little-endian. Callers size
//! the buffers; a short buffer is a bug and panics on the slice index.

/// Width of an encoded key.
pub const KEY_WIDTH: usize = 4;

/// Width of an encoded link.
pub const LINK_WIDTH: usize = 5;

/// Width of a blob length prefix.
pub const LEN_PREFIX_WIDTH: usize = 4;

/// Largest value a 40-bit link can hold.
pub const MAX_LINK: u64 = (1 << 40) - 1;

/// Decode `count` big-endian i32 values packed from `offset`.
#[must_use]
pub fn read_i32_array_be(buf: &[u8], offset: usize, count: usize) -> Vec<i32> {
    buf[offset..offset + count * KEY_WIDTH]
        .chunks_exact(KEY_WIDTH)
        .map(|chunk| i32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Encode `values` big-endian, packed from `offset`.
pub fn write_i32_array_be(values: &[i32], buf: &mut [u8], offset: usize) {
    let dst = &mut buf[offset..offset + values.len() * KEY_WIDTH];
    for (chunk, value) in dst.chunks_exact_mut(KEY_WIDTH).zip(values) {
        chunk.copy_from_slice(&value.to_be_bytes());
    }
}

/// Decode the 40-bit little-endian link stored in slot `index` of `region`.
#[must_use]
pub fn read_link(region: &[u8], index: usize) -> u64 {
    let start = index * LINK_WIDTH;
    let mut bytes = [0u8; 8];
    bytes[..LINK_WIDTH].copy_from_slice(&region[start..start + LINK_WIDTH]);
    u64::from_le_bytes(bytes)
}

/// Encode the low 40 bits of `link` into slot `index` of `region`.
pub fn write_link(region: &mut [u8], index: usize, link: u64) {
    debug_assert!(link <= MAX_LINK, "link {link} does not fit in 40 bits");
    let start = index * LINK_WIDTH;
    region[start..start + LINK_WIDTH].copy_from_slice(&link.to_le_bytes()[..LINK_WIDTH]);
}

/// Decode a little-endian u16.
#[must_use]
pub const fn read_u16_le(bytes: [u8; 2]) -> u16 {
    u16::from_le_bytes(bytes)
}

/// Encode a little-endian u16.
#[must_use]
pub const fn write_u16_le(value: u16) -> [u8; 2] {
    value.to_le_bytes()
}

/// Encode a blob length prefix.
#[must_use]
pub const fn encode_len_prefix(len: u32) -> [u8; LEN_PREFIX_WIDTH] {
    len.to_le_bytes()
}

/// Decode a blob length prefix.
#[must_use]
pub const fn decode_len_prefix(bytes: [u8; LEN_PREFIX_WIDTH]) -> u32 {
    u32::from_le_bytes(bytes)
}
