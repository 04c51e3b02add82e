//! Append-only blob file.
//!
//! Each record is a little-endian u32 length followed by that many bytes. A
//! record is identified by the byte offset of its length prefix, which must
//! fit in a 40-bit link.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::codec::{
    LEN_PREFIX_WIDTH, MAX_LINK, decode_len_prefix, encode_len_prefix,
};
use crate::storage::file::{FileError, open_rw, read_error};

/// The value store behind the tree's leaf links.
pub struct BlobFile {
    file: File,
    path: PathBuf,
}

impl BlobFile {
    /// Open the blob file at `path`, creating an empty one if it is missing.
    pub fn open(path: &Path) -> Result<Self, FileError> {
        let file = open_rw(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file length in bytes.
    pub fn len(&self) -> Result<u64, FileError> {
        Ok(self.file.metadata().map_err(FileError::Io)?.len())
    }

    /// Append a record and return its offset.
    pub fn append(&mut self, content: &[u8]) -> Result<u64, FileError> {
        let len = u32::try_from(content.len()).map_err(|_| FileError::BlobTooLarge(content.len()))?;

        let offset = self.file.seek(SeekFrom::End(0)).map_err(FileError::Io)?;
        if offset > MAX_LINK {
            return Err(FileError::LinkOverflow(offset));
        }

        // Prefix and payload go out in one write.
        let mut record = Vec::with_capacity(LEN_PREFIX_WIDTH + content.len());
        record.extend_from_slice(&encode_len_prefix(len));
        record.extend_from_slice(content);
        self.file.write_all(&record).map_err(FileError::Io)?;

        Ok(offset)
    }

    /// Read the record stored at `offset`.
    pub fn read(&mut self, offset: u64) -> Result<Vec<u8>, FileError> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(FileError::Io)?;

        let mut prefix = [0u8; LEN_PREFIX_WIDTH];
        self.file
            .read_exact(&mut prefix)
            .map_err(|e| read_error(e, offset, LEN_PREFIX_WIDTH))?;
        let len = decode_len_prefix(prefix);
        let wanted = len as usize;
        let start = offset + LEN_PREFIX_WIDTH as u64;

        // A corrupt prefix must not size the buffer past the end of the file.
        if start + u64::from(len) > self.len()? {
            return Err(FileError::Truncated {
                offset: start,
                wanted,
            });
        }

        let mut content = vec![0u8; wanted];
        self.file
            .read_exact(&mut content)
            .map_err(|e| read_error(e, start, wanted))?;

        Ok(content)
    }

    /// Sync all pending writes to disk.
    pub fn sync(&self) -> Result<(), FileError> {
        self.file.sync_all().map_err(FileError::Io)
    }

    /// Sync and close the file.
    pub fn close(self) -> Result<(), FileError> {
        self.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_returns_record_offsets() {
        let dir = tempdir().expect("create temp dir");
        let mut blobs = BlobFile::open(&dir.path().join("t.dat")).expect("open");

        assert_eq!(blobs.append(b"first").expect("append"), 0);
        assert_eq!(blobs.append(b"").expect("append"), 4 + 5);
        assert_eq!(blobs.append(b"third").expect("append"), 4 + 5 + 4);

        assert_eq!(blobs.read(0).expect("read"), b"first");
        assert_eq!(blobs.read(9).expect("read"), b"");
        assert_eq!(blobs.read(13).expect("read"), b"third");
    }

    #[test]
    fn test_record_layout_on_disk() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("t.dat");
        let mut blobs = BlobFile::open(&path).expect("open");
        blobs.append(&[57, 43, 7]).expect("append");
        blobs.close().expect("close");

        let raw = std::fs::read(&path).expect("read raw");
        assert_eq!(raw, vec![3, 0, 0, 0, 57, 43, 7]);
    }

    #[test]
    fn test_truncated_record() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("t.dat");
        // Claims 10 bytes but carries 2.
        std::fs::write(&path, [10, 0, 0, 0, 1, 2]).expect("write raw");

        let mut blobs = BlobFile::open(&path).expect("open");
        let err = blobs.read(0).expect_err("short record");
        assert!(matches!(
            err,
            FileError::Truncated {
                offset: 4,
                wanted: 10
            }
        ));

        let err = blobs.read(100).expect_err("past end");
        assert!(matches!(err, FileError::Truncated { offset: 100, .. }));
    }

    #[test]
    fn test_oversized_length_prefix() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("t.dat");
        std::fs::write(&path, [0xff, 0xff, 0xff, 0xff, 1, 2, 3]).expect("write raw");

        let mut blobs = BlobFile::open(&path).expect("open");
        let err = blobs.read(0).expect_err("length past end of file");
        assert!(matches!(
            err,
            FileError::Truncated {
                offset: 4,
                wanted: 0xffff_ffff
            }
        ));
    }
}
