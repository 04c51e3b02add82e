//! Index file I/O operations.
//!
//! This module reads and writes page slots in `<base>.idx` and hands out the
//! address of the next free slot.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::page::{PAGE_PAYLOAD, PAGE_SIZE_U64, Page, PageAddr, slot_offset};

/// Open `path` for reading and writing, creating it if missing.
pub(crate) fn open_rw(path: &Path) -> Result<File, FileError> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|source| FileError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// Map a short read to `Truncated`, anything else to `Io`.
pub(crate) fn read_error(err: std::io::Error, offset: u64, wanted: usize) -> FileError {
    if err.kind() == ErrorKind::UnexpectedEof {
        FileError::Truncated { offset, wanted }
    } else {
        FileError::Io(err)
    }
}

/// Address of the first free slot in a file of `len` bytes.
///
/// The length is rounded up to a slot boundary first, because the last slot
/// only has its payload written.
#[must_use]
pub const fn addr_for_len(len: u64) -> PageAddr {
    let aligned = (len + PAGE_SIZE_U64 - 1) & !(PAGE_SIZE_U64 - 1);
    aligned / PAGE_SIZE_U64
}

/// The page-slot file backing the tree index.
pub struct PageFile {
    file: File,
    path: PathBuf,
}

impl PageFile {
    /// Open the index file at `path`, creating an empty one if it is missing.
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

    /// Whether no slot has ever been written.
    pub fn is_empty(&self) -> Result<bool, FileError> {
        Ok(self.len()? == 0)
    }

    /// Address the next appended page will take.
    pub fn next_addr(&self) -> Result<PageAddr, FileError> {
        Ok(addr_for_len(self.len()?))
    }

    /// Read the payload of slot `addr`.
    ///
    /// Fails with `Truncated` if the slot lies (partly) past the end of file.
    pub fn read_page(&mut self, addr: PageAddr) -> Result<Page, FileError> {
        let offset = slot_offset(addr);
        let mut page = Page::new();

        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(FileError::Io)?;
        self.file
            .read_exact(page.as_bytes_mut())
            .map_err(|e| read_error(e, offset, PAGE_PAYLOAD))?;

        Ok(page)
    }

    /// Write the payload of slot `addr`. Padding bytes are left untouched.
    pub fn write_page(&mut self, addr: PageAddr, page: &Page) -> Result<(), FileError> {
        let offset = slot_offset(addr);
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(FileError::Io)?;
        self.file
            .write_all(page.as_bytes())
            .map_err(FileError::Io)?;
        Ok(())
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

/// Errors raised by the index and blob files.
#[derive(Debug)]
pub enum FileError {
    /// I/O error.
    Io(std::io::Error),
    /// The file could not be opened or created.
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A read ran past the end of the file.
    Truncated { offset: u64, wanted: usize },
    /// A blob offset or page address does not fit in a 40-bit link.
    LinkOverflow(u64),
    /// A blob is longer than its u32 length prefix can describe.
    BlobTooLarge(usize),
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Open { path, source } => {
                write!(f, "cannot open {}: {source}", path.display())
            }
            Self::Truncated { offset, wanted } => {
                write!(f, "file truncated: wanted {wanted} bytes at offset {offset}")
            }
            Self::LinkOverflow(value) => write!(f, "{value} does not fit in a 40-bit link"),
            Self::BlobTooLarge(len) => write!(f, "blob of {len} bytes is too large"),
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) | Self::Open { source: e, .. } => Some(e),
            _ => None,
        }
    }
}
