//! Storage layer
//!
//! Low-level on-disk formats shared by the heap file and the index:
//! - fixed-size page I/O
//! - heap pages of fixed record slots

pub mod page;
pub mod record;

pub use page::{OpenMode, PageFile, PageId, NO_PAGE, PAGE_SIZE};
pub use record::{RecordFile, RecordId};
