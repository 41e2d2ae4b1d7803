//! relbase storage engine
//!
//! This crate provides the on-disk storage layer for relbase, a minimal
//! relational engine over integer primary keys:
//!
//! - fixed-size page I/O ([`storage::page`])
//! - a heap file of `(i32, String)` tuples ([`storage::record`])
//! - a paged B+Tree index mapping keys to record locators ([`index`])
//!
//! All state lives in two files per table: `<table>.tbl` (the heap) and
//! `<table>.idx` (the index). The engine is single-threaded; every public
//! operation completes its page I/O before returning.

pub mod error;
pub mod index;
pub mod storage;

pub use error::{Error, Result};
pub use index::{BTreeIndex, IndexCursor};
pub use storage::page::{OpenMode, PageFile, PageId, NO_PAGE, PAGE_SIZE};
pub use storage::record::{RecordFile, RecordId};
