//! Fixed-size page I/O
//!
//! Every relbase file is an array of `PAGE_SIZE`-byte pages addressed by a
//! non-negative `PageId`. Page 0 is reserved by the layer above for file
//! metadata. Writes at or past the current end of file extend it; pages are
//! never reclaimed.

use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Error, Result};

/// Size of a page in bytes
pub const PAGE_SIZE: usize = 1024;

/// Page index within a file; the first page is 0
pub type PageId = i32;

/// Sentinel meaning "no page"
pub const NO_PAGE: PageId = -1;

/// File open mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only; the file must exist
    Read,
    /// Read-write; the file is created if missing
    Write,
}

/// Page-granular access to a single backing file
#[derive(Debug)]
pub struct PageFile {
    file: std::fs::File,
    end_pid: PageId,
}

impl PageFile {
    /// Open the file at `path`. `OpenMode::Write` creates it if missing.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref();
        let file = match mode {
            OpenMode::Read => OpenOptions::new().read(true).open(path),
            OpenMode::Write => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(path),
        }
        .map_err(|source| Error::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;

        let len = file.metadata().map_err(Error::FileRead)?.len();
        let end_pid = (len / PAGE_SIZE as u64) as PageId;

        Ok(PageFile { file, end_pid })
    }

    /// One past the last existing page id; 0 for an empty file.
    pub fn end_pid(&self) -> PageId {
        self.end_pid
    }

    /// Read page `pid` into `buf`.
    pub fn read(&mut self, pid: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        if pid < 0 || pid >= self.end_pid {
            return Err(Error::FileRead(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("page {pid} out of range (end {})", self.end_pid),
            )));
        }
        self.file
            .seek(SeekFrom::Start(pid as u64 * PAGE_SIZE as u64))
            .map_err(Error::FileRead)?;
        self.file.read_exact(buf).map_err(Error::FileRead)
    }

    /// Write `buf` to page `pid`, extending the file when `pid` is at or
    /// past `end_pid()`.
    pub fn write(&mut self, pid: PageId, buf: &[u8; PAGE_SIZE]) -> Result<()> {
        if pid < 0 {
            return Err(Error::FileWrite(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("page {pid} is negative"),
            )));
        }
        self.file
            .seek(SeekFrom::Start(pid as u64 * PAGE_SIZE as u64))
            .map_err(Error::FileWrite)?;
        self.file.write_all(buf).map_err(Error::FileWrite)?;
        if pid >= self.end_pid {
            self.end_pid = pid + 1;
        }
        Ok(())
    }

    /// Flush and close the file.
    pub fn close(self) -> Result<()> {
        self.file.sync_all().map_err(Error::FileWrite)
    }
}
