//! B+Tree index over a page file
//!
//! Page 0 of the index file holds the tree metadata, `root_pid` and
//! `height`, as the first two little-endian i32 slots. `height == 0` means
//! the tree is empty and `root_pid` is `NO_PAGE`; at `height == 1` the root
//! is a leaf; above that it is an internal node. Node pages are appended at
//! `end_pid()` as splits demand and never reclaimed.
//!
//! Writes are ordered so that a crash mid-insert can leak an unreferenced
//! page but never produce a dangling pointer: a new sibling page reaches
//! disk before the parent that will name it, and page 0 is rewritten only
//! after the page it names exists.

use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use crate::error::{Error, Result};
use crate::index::internal::InternalNode;
use crate::index::leaf::LeafNode;
use crate::storage::page::{OpenMode, PageFile, PageId, NO_PAGE, PAGE_SIZE};
use crate::storage::record::RecordId;

/// Position of an entry in the leaf chain: the leaf's page id and the entry
/// index within it. Produced by [`BTreeIndex::locate`], consumed and
/// advanced by [`BTreeIndex::read_forward`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexCursor {
    /// Leaf page id; `NO_PAGE` once a scan has consumed the last entry
    pub pid: PageId,
    /// Entry index within the leaf
    pub eid: i32,
}

/// B+Tree index mapping `i32` keys to heap record locators
#[derive(Debug)]
pub struct BTreeIndex {
    pf: PageFile,
    root_pid: PageId,
    height: i32,
}

impl BTreeIndex {
    /// Open the index file at `path`. `OpenMode::Write` creates it if
    /// missing; a brand-new file gets an empty-tree metadata page.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let mut pf = PageFile::open(path, mode)?;

        if pf.end_pid() == 0 {
            let mut tree = BTreeIndex {
                pf,
                root_pid: NO_PAGE,
                height: 0,
            };
            tree.write_meta()?;
            return Ok(tree);
        }

        let mut buf = [0u8; PAGE_SIZE];
        pf.read(0, &mut buf)?;
        let root_pid = LittleEndian::read_i32(&buf[0..4]);
        let height = LittleEndian::read_i32(&buf[4..8]);
        debug!(root_pid, height, "opened index");

        Ok(BTreeIndex {
            pf,
            root_pid,
            height,
        })
    }

    /// Close the index. All metadata has already been persisted by prior
    /// mutations.
    pub fn close(self) -> Result<()> {
        self.pf.close()
    }

    /// Tree height; 0 for an empty tree
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Page id of the root node; `NO_PAGE` for an empty tree
    pub fn root_pid(&self) -> PageId {
        self.root_pid
    }

    /// Insert `(key, rid)` into the index.
    pub fn insert(&mut self, key: i32, rid: RecordId) -> Result<()> {
        if self.height == 0 {
            // first entry: the tree becomes a single root leaf
            let mut leaf = LeafNode::new();
            leaf.insert(key, rid)?;
            leaf.set_next_leaf_pid(NO_PAGE);

            let pid = self.pf.end_pid();
            leaf.write(&mut self.pf, pid)?;
            self.root_pid = pid;
            self.height = 1;
            self.write_meta()?;
            debug!(root = pid, "created root leaf");
            return Ok(());
        }

        let mut path = Vec::with_capacity(self.height as usize);
        let cursor = self.locate_for_insert(key, &mut path)?;

        let mut leaf = LeafNode::read(&mut self.pf, cursor.pid)?;
        match leaf.insert(key, rid) {
            Ok(()) => leaf.write(&mut self.pf, cursor.pid),
            Err(Error::NodeFull) => {
                let mut sibling = LeafNode::new();
                let sibling_pid = self.pf.end_pid();
                let saved_next = leaf.next_leaf_pid();

                let first_right = leaf.insert_and_split(key, rid, &mut sibling)?;
                sibling.set_next_leaf_pid(saved_next);
                leaf.set_next_leaf_pid(sibling_pid);

                sibling.write(&mut self.pf, sibling_pid)?;
                leaf.write(&mut self.pf, cursor.pid)?;
                debug!(
                    leaf = cursor.pid,
                    sibling = sibling_pid,
                    key = first_right,
                    "leaf split"
                );

                self.update_parent(&mut path, cursor.pid, first_right, sibling_pid)
            }
            Err(e) => Err(e),
        }
    }

    /// Propagate a split upward: `key` separates the children `left_pid`
    /// and `right_pid` and must be inserted into the parent popped off
    /// `path`, splitting again on overflow. An empty path means the split
    /// node was the root, so the tree grows a level.
    fn update_parent(
        &mut self,
        path: &mut Vec<PageId>,
        left_pid: PageId,
        key: i32,
        right_pid: PageId,
    ) -> Result<()> {
        let parent_pid = match path.pop() {
            None => {
                let mut root = InternalNode::new();
                root.init_root(left_pid, key, right_pid);

                let pid = self.pf.end_pid();
                root.write(&mut self.pf, pid)?;
                self.root_pid = pid;
                self.height += 1;
                self.write_meta()?;
                debug!(root = pid, height = self.height, "root grew");
                return Ok(());
            }
            Some(pid) => pid,
        };

        let mut parent = InternalNode::read(&mut self.pf, parent_pid)?;
        match parent.insert(key, right_pid) {
            Ok(()) => {
                parent.write(&mut self.pf, parent_pid)?;
                path.clear();
                Ok(())
            }
            Err(Error::NodeFull) => {
                let mut sibling = InternalNode::new();
                let sibling_pid = self.pf.end_pid();

                let mid_key = parent.insert_and_split(key, right_pid, &mut sibling)?;
                sibling.write(&mut self.pf, sibling_pid)?;
                parent.write(&mut self.pf, parent_pid)?;
                debug!(
                    node = parent_pid,
                    sibling = sibling_pid,
                    key = mid_key,
                    "internal split"
                );

                self.update_parent(path, parent_pid, mid_key, sibling_pid)
            }
            Err(e) => Err(e),
        }
    }

    /// Descend to the leaf that owns `key`, recording each visited internal
    /// page id in `path`. The returned cursor's `pid` is the target leaf;
    /// its `eid` is the entry index with a key `>= key`, or `-1` when the
    /// key would become the largest in the leaf; ordered insertion places
    /// it either way.
    fn locate_for_insert(&mut self, key: i32, path: &mut Vec<PageId>) -> Result<IndexCursor> {
        path.clear();
        if self.height == 0 {
            return Err(Error::NoSuchRecord);
        }

        let mut pid = self.root_pid;
        for _ in 1..self.height {
            path.push(pid);
            let node = InternalNode::read(&mut self.pf, pid)?;
            pid = node.locate_child(key);
        }

        let leaf = LeafNode::read(&mut self.pf, pid)?;
        match leaf.locate(key) {
            Ok(eid) => Ok(IndexCursor {
                pid,
                eid: eid as i32,
            }),
            Err(Error::NoSuchRecord) => Ok(IndexCursor { pid, eid: -1 }),
            Err(e) => Err(e),
        }
    }

    /// Find the first leaf entry whose key is `>= search_key` and return a
    /// cursor naming it. For range scans the cursor is then fed to
    /// [`read_forward`](Self::read_forward). Fails with `EndOfTree` when
    /// `search_key` is greater than every key in the index, and with
    /// `NoSuchRecord` on an empty tree.
    pub fn locate(&mut self, search_key: i32) -> Result<IndexCursor> {
        if self.height == 0 {
            return Err(Error::NoSuchRecord);
        }

        let mut pid = self.root_pid;
        for _ in 1..self.height {
            let node = InternalNode::read(&mut self.pf, pid)?;
            pid = node.locate_child(search_key);
        }

        let mut leaf = LeafNode::read(&mut self.pf, pid)?;
        match leaf.locate(search_key) {
            Ok(eid) => Ok(IndexCursor {
                pid,
                eid: eid as i32,
            }),
            Err(Error::NoSuchRecord) => {
                // every key in this leaf is smaller; the first fit, if any,
                // opens the next leaf
                pid = leaf.next_leaf_pid();
                if pid == NO_PAGE {
                    return Err(Error::EndOfTree);
                }
                leaf = LeafNode::read(&mut self.pf, pid)?;
                let eid = leaf.locate(search_key)?;
                Ok(IndexCursor {
                    pid,
                    eid: eid as i32,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Read the `(key, locator)` pair under `cursor` and advance it to the
    /// next entry, hopping to the next leaf past the last entry. Consuming
    /// the final entry of the last leaf still succeeds; the cursor parks at
    /// `NO_PAGE` and the next call reports `EndOfTree`.
    pub fn read_forward(&mut self, cursor: &mut IndexCursor) -> Result<(i32, RecordId)> {
        if cursor.pid == NO_PAGE {
            return Err(Error::EndOfTree);
        }

        let leaf = LeafNode::read(&mut self.pf, cursor.pid)?;
        let (key, rid) = leaf.read_entry(cursor.eid)?;

        if cursor.eid == leaf.key_count() - 1 {
            cursor.eid = 0;
            cursor.pid = leaf.next_leaf_pid();
        } else {
            cursor.eid += 1;
        }

        Ok((key, rid))
    }

    /// Persist `(root_pid, height)` to page 0.
    fn write_meta(&mut self) -> Result<()> {
        let mut buf = [0u8; PAGE_SIZE];
        LittleEndian::write_i32(&mut buf[0..4], self.root_pid);
        LittleEndian::write_i32(&mut buf[4..8], self.height);
        self.pf.write(0, &buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::leaf::LEAF_MAX_ENTRIES;
    use tempfile::NamedTempFile;

    fn rid(sid: i32) -> RecordId {
        RecordId::new(0, sid)
    }

    /// Walk the whole leaf chain from the smallest key, collecting keys.
    fn scan_all(tree: &mut BTreeIndex) -> Vec<i32> {
        let mut keys = Vec::new();
        let mut cursor = match tree.locate(i32::MIN) {
            Ok(c) => c,
            Err(_) => return keys,
        };
        loop {
            match tree.read_forward(&mut cursor) {
                Ok((key, _)) => keys.push(key),
                Err(Error::EndOfTree) => break,
                Err(e) => panic!("scan failed: {e}"),
            }
        }
        keys
    }

    #[test]
    fn test_fresh_file_is_empty_tree() {
        let file = NamedTempFile::new().unwrap();
        let tree = BTreeIndex::open(file.path(), OpenMode::Write).unwrap();

        assert_eq!(tree.pf.end_pid(), 1); // only the metadata page
        assert_eq!(tree.root_pid(), NO_PAGE);
        assert_eq!(tree.height(), 0);
    }

    #[test]
    fn test_locate_on_empty_tree_fails() {
        let file = NamedTempFile::new().unwrap();
        let mut tree = BTreeIndex::open(file.path(), OpenMode::Write).unwrap();
        assert!(matches!(tree.locate(1), Err(Error::NoSuchRecord)));
    }

    #[test]
    fn test_single_insert() {
        let file = NamedTempFile::new().unwrap();
        let mut tree = BTreeIndex::open(file.path(), OpenMode::Write).unwrap();

        tree.insert(42, rid(0)).unwrap();
        assert_eq!(tree.pf.end_pid(), 2);
        assert_eq!(tree.root_pid(), 1);
        assert_eq!(tree.height(), 1);

        let mut cursor = tree.locate(42).unwrap();
        assert_eq!(cursor, IndexCursor { pid: 1, eid: 0 });

        let (key, r) = tree.read_forward(&mut cursor).unwrap();
        assert_eq!((key, r), (42, rid(0)));
        assert!(matches!(
            tree.read_forward(&mut cursor),
            Err(Error::EndOfTree)
        ));
    }

    #[test]
    fn test_in_order_fill_splits_once() {
        let file = NamedTempFile::new().unwrap();
        let mut tree = BTreeIndex::open(file.path(), OpenMode::Write).unwrap();

        for i in 0..=LEAF_MAX_ENTRIES as i32 {
            tree.insert(i, RecordId::new(0, i)).unwrap();
        }

        assert_eq!(tree.height(), 2);
        let root_pid = tree.root_pid();
        let root = InternalNode::read(&mut tree.pf, root_pid).unwrap();
        assert_eq!(root.key_count(), 1);
        // in-order fill: the left leaf keeps 0..=42, so 43 separates
        assert_eq!(root.key_at(0), 43);

        // the leaf chain covers both leaves in order
        let keys = scan_all(&mut tree);
        assert_eq!(keys, (0..=LEAF_MAX_ENTRIES as i32).collect::<Vec<_>>());

        // split accounting: the two leaves hold max + 1 entries total
        let left = LeafNode::read(&mut tree.pf, root.child(0)).unwrap();
        let right = LeafNode::read(&mut tree.pf, root.child(1)).unwrap();
        assert_eq!(
            left.key_count() + right.key_count(),
            LEAF_MAX_ENTRIES as i32 + 1
        );
        assert_eq!(left.next_leaf_pid(), root.child(1));
        assert_eq!(right.next_leaf_pid(), NO_PAGE);
    }

    #[test]
    fn test_reverse_fill_scans_ascending() {
        let file = NamedTempFile::new().unwrap();
        let mut tree = BTreeIndex::open(file.path(), OpenMode::Write).unwrap();

        for k in (1..=100).rev() {
            tree.insert(k, RecordId::new(0, 100 - k)).unwrap();
        }

        let keys = scan_all(&mut tree);
        assert_eq!(keys, (1..=100).collect::<Vec<_>>());
    }

    #[test]
    fn test_range_scan() {
        let file = NamedTempFile::new().unwrap();
        let mut tree = BTreeIndex::open(file.path(), OpenMode::Write).unwrap();

        for i in 0..100 {
            tree.insert(i, RecordId::new(0, i)).unwrap();
        }

        let mut cursor = tree.locate(25).unwrap();
        let mut keys = Vec::new();
        for _ in 0..10 {
            let (key, _) = tree.read_forward(&mut cursor).unwrap();
            keys.push(key);
        }
        assert_eq!(keys, (25..35).collect::<Vec<_>>());
    }

    #[test]
    fn test_locate_chases_next_leaf() {
        let file = NamedTempFile::new().unwrap();
        let mut tree = BTreeIndex::open(file.path(), OpenMode::Write).unwrap();

        for i in 0..=LEAF_MAX_ENTRIES as i32 {
            tree.insert(i * 2, RecordId::new(0, i)).unwrap();
        }
        assert_eq!(tree.height(), 2);

        // 85 lies between the left leaf's last key (84) and the right
        // leaf's first (86), so the left-leaf probe misses and the scan
        // resumes in the sibling
        let mut cursor = tree.locate(85).unwrap();
        let (key, _) = tree.read_forward(&mut cursor).unwrap();
        assert_eq!(key, 86);
    }

    #[test]
    fn test_locate_beyond_all_keys_is_end_of_tree() {
        let file = NamedTempFile::new().unwrap();
        let mut tree = BTreeIndex::open(file.path(), OpenMode::Write).unwrap();

        for i in 0..10 {
            tree.insert(i, rid(i)).unwrap();
        }
        assert!(matches!(tree.locate(1000), Err(Error::EndOfTree)));
    }

    #[test]
    fn test_metadata_consistent_after_reopen() {
        let file = NamedTempFile::new().unwrap();
        let (root, height);
        {
            let mut tree = BTreeIndex::open(file.path(), OpenMode::Write).unwrap();
            for i in 0..500 {
                tree.insert(i, RecordId::new(0, i)).unwrap();
            }
            root = tree.root_pid();
            height = tree.height();
            tree.close().unwrap();
        }

        let mut tree = BTreeIndex::open(file.path(), OpenMode::Read).unwrap();
        assert_eq!(tree.root_pid(), root);
        assert_eq!(tree.height(), height);

        let keys = scan_all(&mut tree);
        assert_eq!(keys, (0..500).collect::<Vec<_>>());
    }

    #[test]
    fn test_round_trip_every_inserted_key() {
        let file = NamedTempFile::new().unwrap();
        let mut tree = BTreeIndex::open(file.path(), OpenMode::Write).unwrap();

        // interleave to exercise splits away from the rightmost leaf
        let keys: Vec<i32> = (0..400).map(|i| (i * 7) % 400).collect();
        for (i, &k) in keys.iter().enumerate() {
            tree.insert(k, RecordId::new(1, i as i32)).unwrap();
        }

        for &k in &keys {
            let mut cursor = tree.locate(k).unwrap();
            let (found, _) = tree.read_forward(&mut cursor).unwrap();
            assert_eq!(found, k);
        }
    }

    #[test]
    fn test_duplicate_keys_coexist() {
        let file = NamedTempFile::new().unwrap();
        let mut tree = BTreeIndex::open(file.path(), OpenMode::Write).unwrap();

        tree.insert(3, rid(0)).unwrap();
        tree.insert(7, RecordId::new(0, 10)).unwrap();
        tree.insert(7, RecordId::new(0, 11)).unwrap();
        tree.insert(7, RecordId::new(0, 12)).unwrap();
        tree.insert(9, rid(1)).unwrap();

        let mut cursor = tree.locate(7).unwrap();
        let mut rids = Vec::new();
        loop {
            let (key, r) = tree.read_forward(&mut cursor).unwrap();
            if key != 7 {
                break;
            }
            rids.push(r.sid);
        }
        rids.sort_unstable();
        assert_eq!(rids, vec![10, 11, 12]);
    }

    #[test]
    fn test_node_fill_bounds_hold() {
        let file = NamedTempFile::new().unwrap();
        let mut tree = BTreeIndex::open(file.path(), OpenMode::Write).unwrap();

        for i in 0..2000 {
            tree.insert((i * 13) % 2000, RecordId::new(0, i)).unwrap();
        }

        // walk the leaf chain checking fill and order
        let mut pid = {
            let mut p = tree.root_pid();
            for _ in 1..tree.height() {
                let node = InternalNode::read(&mut tree.pf, p).unwrap();
                p = node.child(0);
            }
            p
        };
        let mut total = 0;
        let mut prev = i32::MIN;
        while pid != NO_PAGE {
            let leaf = LeafNode::read(&mut tree.pf, pid).unwrap();
            let n = leaf.key_count();
            assert!(n >= 1 && n as usize <= LEAF_MAX_ENTRIES);
            for e in 0..n {
                let (key, _) = leaf.read_entry(e).unwrap();
                assert!(key >= prev);
                prev = key;
            }
            total += n;
            pid = leaf.next_leaf_pid();
        }
        assert_eq!(total, 2000);
    }

    #[test]
    fn test_root_growth_to_height_three() {
        let file = NamedTempFile::new().unwrap();
        let mut tree = BTreeIndex::open(file.path(), OpenMode::Write).unwrap();

        // sequential fill splits a leaf every 42 inserts past the first
        // split, so 6000 keys force well over 127 separators into the root
        for i in 0..6000 {
            tree.insert(i, RecordId::new(0, i)).unwrap();
        }
        assert_eq!(tree.height(), 3);

        let keys = scan_all(&mut tree);
        assert_eq!(keys.len(), 6000);
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));

        let mut cursor = tree.locate(4321).unwrap();
        assert_eq!(tree.read_forward(&mut cursor).unwrap().0, 4321);
    }
}
