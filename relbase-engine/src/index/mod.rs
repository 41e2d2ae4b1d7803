//! B+Tree index
//!
//! The index maps a signed 32-bit key to a heap record locator. It is built
//! from two node flavors sharing the page store but carrying distinct byte
//! layouts:
//!
//! - leaf pages: ordered `(locator, key)` entries plus a forward sibling
//!   pointer ([`leaf`])
//! - internal pages: a leading child pointer followed by ordered
//!   `(key, child)` pairs ([`internal`])
//!
//! The tree layer ([`tree`]) keeps `(root_pid, height)` on page 0, splits
//! nodes bottom-up on overflow, and hands out scan cursors.

pub mod internal;
pub mod leaf;
pub mod tree;

pub use internal::{InternalNode, INTERNAL_MAX_KEYS};
pub use leaf::{LeafNode, LEAF_MAX_ENTRIES};
pub use tree::{BTreeIndex, IndexCursor};
