//! Heap record file
//!
//! Tuples of `(i32 key, String value)` stored append-only in fixed slots.
//! A record is addressed by its `RecordId`: the page that holds it and the
//! slot within that page. The locator is opaque to the index layer.
//!
//! Heap page layout (little-endian i32):
//! - bytes 0-3: occupied slot count
//! - 128-byte slots follow: `key (4) | value length (4) | value bytes (120)`
//!
//! Pages fill completely before a new one is appended, so the heap has no
//! holes and scans advance by simple slot arithmetic.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::storage::page::{OpenMode, PageFile, PAGE_SIZE};

/// Maximum value length in bytes
pub const MAX_VALUE_LEN: usize = 120;

/// On-disk size of one record slot
const SLOT_SIZE: usize = 4 + 4 + MAX_VALUE_LEN;

/// Slots per heap page, behind the 4-byte occupancy count
pub const RECORDS_PER_PAGE: usize = (PAGE_SIZE - 4) / SLOT_SIZE;

/// Locator of a stored tuple: heap page id plus slot index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordId {
    /// Page number; the first page is 0
    pub pid: i32,
    /// Slot number within the page; the first slot is 0
    pub sid: i32,
}

impl RecordId {
    /// Create a new record locator
    pub fn new(pid: i32, sid: i32) -> Self {
        RecordId { pid, sid }
    }

    /// Locator of the slot that follows this one in heap order
    fn next(self) -> RecordId {
        if (self.sid + 1) as usize >= RECORDS_PER_PAGE {
            RecordId::new(self.pid + 1, 0)
        } else {
            RecordId::new(self.pid, self.sid + 1)
        }
    }
}

/// Append-only heap of `(i32, String)` tuples
#[derive(Debug)]
pub struct RecordFile {
    pf: PageFile,
    end: RecordId,
}

impl RecordFile {
    /// Open the heap file at `path`. `OpenMode::Write` creates it if
    /// missing. The end locator is recomputed from the last page's count.
    pub fn open<P: AsRef<std::path::Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let mut pf = PageFile::open(path, mode)?;

        let end = if pf.end_pid() == 0 {
            RecordId::new(0, 0)
        } else {
            let last = pf.end_pid() - 1;
            let mut buf = [0u8; PAGE_SIZE];
            pf.read(last, &mut buf)?;
            let count = LittleEndian::read_i32(&buf[0..4]);
            if count as usize >= RECORDS_PER_PAGE {
                RecordId::new(last + 1, 0)
            } else {
                RecordId::new(last, count)
            }
        };

        Ok(RecordFile { pf, end })
    }

    /// One past the last stored tuple.
    pub fn end_rid(&self) -> RecordId {
        self.end
    }

    /// Append a tuple and return its locator.
    pub fn append(&mut self, key: i32, value: &str) -> Result<RecordId> {
        if value.len() > MAX_VALUE_LEN {
            return Err(Error::InvalidFormat(format!(
                "value longer than {MAX_VALUE_LEN} bytes"
            )));
        }

        let rid = self.end;
        let mut buf = [0u8; PAGE_SIZE];
        if rid.sid > 0 {
            self.pf.read(rid.pid, &mut buf)?;
        }

        let off = Self::slot_offset(rid.sid);
        LittleEndian::write_i32(&mut buf[off..off + 4], key);
        LittleEndian::write_i32(&mut buf[off + 4..off + 8], value.len() as i32);
        buf[off + 8..off + 8 + value.len()].copy_from_slice(value.as_bytes());
        LittleEndian::write_i32(&mut buf[0..4], rid.sid + 1);

        self.pf.write(rid.pid, &buf)?;
        self.end = rid.next();
        Ok(rid)
    }

    /// Read the tuple stored at `rid`.
    pub fn read(&mut self, rid: RecordId) -> Result<(i32, String)> {
        if rid.pid < 0 || rid.sid < 0 || rid.sid as usize >= RECORDS_PER_PAGE {
            return Err(Error::NoSuchRecord);
        }
        if rid.pid >= self.pf.end_pid() {
            return Err(Error::NoSuchRecord);
        }

        let mut buf = [0u8; PAGE_SIZE];
        self.pf.read(rid.pid, &mut buf)?;

        let count = LittleEndian::read_i32(&buf[0..4]);
        if rid.sid >= count {
            return Err(Error::NoSuchRecord);
        }

        let off = Self::slot_offset(rid.sid);
        let key = LittleEndian::read_i32(&buf[off..off + 4]);
        let len = LittleEndian::read_i32(&buf[off + 4..off + 8]);
        if len < 0 || len as usize > MAX_VALUE_LEN {
            return Err(Error::InvalidFormat(format!(
                "corrupt value length {len} at ({}, {})",
                rid.pid, rid.sid
            )));
        }
        let bytes = &buf[off + 8..off + 8 + len as usize];
        let value = String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::InvalidFormat(format!("non-UTF-8 value at ({}, {})", rid.pid, rid.sid)))?;

        Ok((key, value))
    }

    /// Forward iterator over all tuples in heap order.
    pub fn scan(&mut self) -> Scan<'_> {
        Scan {
            file: self,
            next: RecordId::new(0, 0),
        }
    }

    /// Flush and close the backing file.
    pub fn close(self) -> Result<()> {
        self.pf.close()
    }

    fn slot_offset(sid: i32) -> usize {
        4 + sid as usize * SLOT_SIZE
    }
}

/// Forward scan over a heap file, yielding `(locator, key, value)`
pub struct Scan<'a> {
    file: &'a mut RecordFile,
    next: RecordId,
}

impl Iterator for Scan<'_> {
    type Item = Result<(RecordId, i32, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == self.file.end_rid() {
            return None;
        }
        let rid = self.next;
        self.next = rid.next();
        Some(self.file.read(rid).map(|(key, value)| (rid, key, value)))
    }
}
