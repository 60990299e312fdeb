//! Ordered, lock-protected inode index for one partition.
//!
//! Two lock levels:
//! - the tree lock guards the key set and is held only while a key is looked up,
//!   inserted or removed;
//! - each record carries its own reader/writer lock, so a write to one record never
//!   blocks readers of another.
//!
//! Lock order is always tree then record. Readers release the tree lock before taking
//! a record lock.

use crate::types::{Inode, InodeId};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared, individually locked record.
#[derive(Debug, Clone)]
pub struct InodeHandle(Arc<RwLock<Inode>>);

impl InodeHandle {
    fn new(inode: Inode) -> Self {
        Self(Arc::new(RwLock::new(inode)))
    }

    /// Read access. Hold the guard for the whole copy to avoid torn reads.
    pub fn read(&self) -> RwLockReadGuard<'_, Inode> {
        self.0.read()
    }

    /// Write access is reserved for the apply path.
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Inode> {
        self.0.write()
    }
}

/// Thread-safe ordered map from inode id to record.
#[derive(Debug, Default)]
pub struct InodeStore {
    tree: RwLock<BTreeMap<InodeId, InodeHandle>>,
}

impl InodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point lookup. A miss is a normal outcome.
    pub fn get(&self, id: InodeId) -> Option<InodeHandle> {
        self.tree.read().get(&id).cloned()
    }

    /// Copy of the record, taken under its read lock.
    pub fn snapshot(&self, id: InodeId) -> Option<Inode> {
        self.get(id).map(|h| h.read().clone())
    }

    pub fn contains(&self, id: InodeId) -> bool {
        self.tree.read().contains_key(&id)
    }

    /// Insert only if `inode.id` is absent. Returns false when the key already exists.
    pub(crate) fn insert_new(&self, inode: Inode) -> bool {
        match self.tree.write().entry(inode.id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(InodeHandle::new(inode));
                true
            }
        }
    }

    /// Insert or replace. A replacement swaps the contents under the record's write lock,
    /// so readers of that id see either the old or the new record. Returns true on insert.
    pub(crate) fn put(&self, inode: Inode) -> bool {
        if let Some(handle) = self.get(inode.id) {
            *handle.write() = inode;
            return false;
        }
        match self.tree.write().entry(inode.id) {
            Entry::Occupied(slot) => {
                *slot.get().write() = inode;
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(InodeHandle::new(inode));
                true
            }
        }
    }

    /// Remove the record; no-op if absent.
    pub(crate) fn delete(&self, id: InodeId) -> Option<Inode> {
        let handle = self.tree.write().remove(&id)?;
        let inode = handle.read().clone();
        Some(inode)
    }

    /// Replace the whole content, e.g. when restoring a snapshot.
    pub(crate) fn replace_all(&self, inodes: Vec<Inode>) {
        let tree: BTreeMap<InodeId, InodeHandle> = inodes
            .into_iter()
            .map(|inode| (inode.id, InodeHandle::new(inode)))
            .collect();
        *self.tree.write() = tree;
    }

    pub fn len(&self) -> usize {
        self.tree.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.read().is_empty()
    }

    /// All ids in ascending order.
    pub fn ids(&self) -> Vec<InodeId> {
        self.tree.read().keys().copied().collect()
    }

    /// Ordered traversal. The key set is captured first, then each record is visited
    /// under its own read lock, so the visitor never holds the tree lock.
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&Inode),
    {
        let handles: Vec<InodeHandle> = self.tree.read().values().cloned().collect();
        for handle in handles {
            visit(&*handle.read());
        }
    }

    /// Ordered copy of every record.
    pub fn to_vec(&self) -> Vec<Inode> {
        let mut inodes = Vec::with_capacity(self.len());
        self.for_each(|inode| inodes.push(inode.clone()));
        inodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn inode(id: InodeId) -> Inode {
        Inode::new(id, 0o644, 0, 0, None, 1_700_000_000)
    }

    #[test]
    fn test_get_miss_is_none() {
        let store = InodeStore::new();
        assert!(store.get(9).is_none());
        assert!(store.snapshot(9).is_none());
    }

    #[test]
    fn test_insert_new_refuses_existing_key() {
        let store = InodeStore::new();
        assert!(store.insert_new(inode(1)));
        let mut other = inode(1);
        other.uid = 77;
        assert!(!store.insert_new(other));
        assert_eq!(store.snapshot(1).unwrap().uid, 0);
    }

    #[test]
    fn test_put_replaces_in_place() {
        let store = InodeStore::new();
        assert!(store.put(inode(3)));
        let held = store.get(3).unwrap();

        let mut updated = inode(3);
        updated.size = 4096;
        assert!(!store.put(updated));

        // Handles taken before the replace observe the new contents.
        assert_eq!(held.read().size, 4096);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = InodeStore::new();
        store.put(inode(5));
        assert_eq!(store.delete(5).map(|i| i.id), Some(5));
        assert!(store.delete(5).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_traversal_is_ordered() {
        let store = InodeStore::new();
        for id in [42, 7, 19, 3] {
            store.put(inode(id));
        }
        assert_eq!(store.ids(), vec![3, 7, 19, 42]);

        let mut seen = Vec::new();
        store.for_each(|i| seen.push(i.id));
        assert_eq!(seen, vec![3, 7, 19, 42]);
    }

    #[test]
    fn test_reader_blocked_only_by_its_own_record() {
        let store = Arc::new(InodeStore::new());
        store.put(inode(1));
        store.put(inode(2));

        let writer = store.get(1).unwrap();
        let _guard = writer.write();

        // Record 2 stays readable while record 1 is write-locked.
        let reader_store = Arc::clone(&store);
        let size = thread::spawn(move || reader_store.snapshot(2).map(|i| i.size))
            .join()
            .unwrap();
        assert_eq!(size, Some(0));
    }

    #[test]
    fn test_concurrent_inserts() {
        let store = Arc::new(InodeStore::new());
        let workers: Vec<_> = (0..8u64)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..100u64 {
                        store.insert_new(inode(t * 1000 + i + 1));
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(store.len(), 800);
    }
}
