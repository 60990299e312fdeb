// Custom test assertions for integration tests

use metanode::metadata::{InodeStore, MetaPartition};
use metanode::types::InodeId;
use metanode::MetanodeError;

/// Assert that every record in `a` equals the record with the same id in `b`.
pub fn assert_stores_identical(a: &InodeStore, b: &InodeStore) {
    assert_eq!(a.ids(), b.ids(), "stores hold different id sets");
    for id in a.ids() {
        let left = bincode::serialize(&a.snapshot(id).unwrap()).unwrap();
        let right = bincode::serialize(&b.snapshot(id).unwrap()).unwrap();
        assert_eq!(left, right, "record {} differs between stores", id);
    }
}

/// Assert that `id` is invisible to get-style reads.
pub fn assert_not_visible(partition: &MetaPartition, id: InodeId) {
    match partition.inode_get(id) {
        Err(MetanodeError::InodeNotFound(missing)) => assert_eq!(missing, id),
        other => panic!("inode {} should be invisible, got {:?}", id, other),
    }
    assert!(partition.inode_get_batch(&[id]).is_empty());
}
