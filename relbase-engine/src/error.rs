//! Engine error kinds
//!
//! The error set is closed: structural conditions (`NodeFull`,
//! `NoSuchRecord`, `EndOfTree`) drive control flow inside the engine, while
//! the file I/O kinds propagate unchanged to callers.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the relbase engine
#[derive(Debug, Error)]
pub enum Error {
    /// Opening a backing file failed
    #[error("could not open {}: {}", .path.display(), .source)]
    FileOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A page read failed
    #[error("page read failed: {0}")]
    FileRead(#[source] io::Error),

    /// A page write failed
    #[error("page write failed: {0}")]
    FileWrite(#[source] io::Error),

    /// The target node has no room for another entry. Never surfaced by the
    /// public API; the tree layer answers it with a split.
    #[error("node is full")]
    NodeFull,

    /// No entry with a key at or above the search key exists at the probed
    /// location.
    #[error("no such record")]
    NoSuchRecord,

    /// A forward scan moved past the last leaf.
    #[error("end of tree")]
    EndOfTree,

    /// Malformed input data (load file line, oversized or corrupt tuple).
    #[error("invalid format: {0}")]
    InvalidFormat(String),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;
