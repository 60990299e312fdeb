//! Core type definitions for the metanode partition.
//!
//! # Key Types
//!
//! - [`Inode`]: the record stored per inode identifier
//! - [`Lease`]: an open-handle lease attached to an inode
//! - [`FileType`]: file kind encoded in the mode's format bits
//!
//! # Type Aliases
//!
//! - [`InodeId`] = `u64`: Inode number
//! - [`PartitionId`] = `u64`: Partition identifier
//! - [`NodeId`] = `u64`: Replica node identifier
//! - [`Term`] = `u64`: Raft term number
//! - [`LogIndex`] = `u64`: Raft log position
//!
//! # Example
//!
//! ```rust
//! use metanode::types::{FileType, Inode};
//!
//! let now = 1_700_000_000;
//! let file = Inode::new(10, libc::S_IFREG as u32 | 0o644, 1000, 1000, None, now);
//! assert_eq!(file.file_type, FileType::RegularFile);
//! assert_eq!(file.nlink, 1);
//!
//! let dir = Inode::new(11, libc::S_IFDIR as u32 | 0o755, 0, 0, None, now);
//! assert_eq!(dir.nlink, 2);
//! ```

use serde::{Deserialize, Serialize};

/// Unique identifier for an inode.
pub type InodeId = u64;

/// Unique identifier for a metadata partition.
pub type PartitionId = u64;

/// Unique identifier for a node in the replica group.
pub type NodeId = u64;

/// Raft term number.
pub type Term = u64;

/// Raft log index.
pub type LogIndex = u64;

/// Seconds since the Unix epoch.
pub type EpochSecs = i64;

const S_IFMT: u32 = libc::S_IFMT as u32;
const PERMISSION_BITS: u32 = 0o7777;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    RegularFile,
    Directory,
    Symlink,
}

impl FileType {
    pub fn to_mode(&self) -> u32 {
        match self {
            FileType::RegularFile => libc::S_IFREG as u32,
            FileType::Directory => libc::S_IFDIR as u32,
            FileType::Symlink => libc::S_IFLNK as u32,
        }
    }

    /// Derive the file type from a mode's format bits. Modes without format bits are
    /// regular files.
    pub fn from_mode(mode: u32) -> Option<Self> {
        match mode & S_IFMT {
            0 => Some(FileType::RegularFile),
            m if m == libc::S_IFREG as u32 => Some(FileType::RegularFile),
            m if m == libc::S_IFDIR as u32 => Some(FileType::Directory),
            m if m == libc::S_IFLNK as u32 => Some(FileType::Symlink),
            _ => None,
        }
    }
}

/// Opaque open-handle credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseToken(pub u64);

impl std::fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// An open-handle lease held on an inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub token: LeaseToken,
    /// The lease is live while `now < expires`.
    pub expires: EpochSecs,
}

impl Lease {
    pub fn is_live(&self, now: EpochSecs) -> bool {
        now < self.expires
    }
}

/// Inode record for one filesystem object in the partition's range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    pub id: InodeId,
    pub file_type: FileType,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub nlink: u32,
    pub generation: u64,
    #[serde(with = "serde_bytes")]
    pub link_target: Option<Vec<u8>>,
    pub create_time: EpochSecs,
    pub access_time: EpochSecs,
    pub modify_time: EpochSecs,
    /// Logically deleted: hidden from reads, waiting for eviction.
    pub delete_mark: bool,
    pub lease: Option<Lease>,
}

impl Inode {
    /// Build a new record. The file type comes from `mode`'s format bits; a mode without
    /// them is a regular file.
    pub fn new(
        id: InodeId,
        mode: u32,
        uid: u32,
        gid: u32,
        link_target: Option<Vec<u8>>,
        now: EpochSecs,
    ) -> Self {
        let file_type = FileType::from_mode(mode).unwrap_or(FileType::RegularFile);
        let nlink = if file_type == FileType::Directory { 2 } else { 1 };
        let size = link_target.as_ref().map(|t| t.len() as u64).unwrap_or(0);
        Self {
            id,
            file_type,
            mode: file_type.to_mode() | (mode & PERMISSION_BITS),
            uid,
            gid,
            size,
            nlink,
            generation: 1,
            link_target,
            create_time: now,
            access_time: now,
            modify_time: now,
            delete_mark: false,
            lease: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type == FileType::Symlink
    }

    /// Returns the lease if it is still live at `now`.
    pub fn live_lease(&self, now: EpochSecs) -> Option<&Lease> {
        self.lease.as_ref().filter(|l| l.is_live(now))
    }

    /// Replace only the permission bits, keeping the format bits.
    pub fn set_permissions(&mut self, mode: u32) {
        self.mode = (self.mode & S_IFMT) | (mode & PERMISSION_BITS);
    }

    pub fn inc_nlink(&mut self) {
        self.nlink = self.nlink.saturating_add(1);
        self.generation += 1;
    }

    /// Drop one link. A directory at two links loses its self reference with the last
    /// parent entry.
    pub fn dec_nlink(&mut self) {
        if self.is_dir() && self.nlink <= 2 {
            self.nlink = 0;
        } else {
            self.nlink = self.nlink.saturating_sub(1);
        }
        self.generation += 1;
    }

    /// Set the delete mark. Never cleared afterwards.
    pub fn mark_deleted(&mut self) {
        if !self.delete_mark {
            self.delete_mark = true;
            self.generation += 1;
        }
    }

    /// Whether eviction may remove this record at `now`.
    pub fn is_evictable(&self, now: EpochSecs) -> bool {
        self.nlink == 0 && self.live_lease(now).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: EpochSecs = 1_700_000_000;

    #[test]
    fn test_file_type_from_mode() {
        assert_eq!(FileType::from_mode(0o644), Some(FileType::RegularFile));
        assert_eq!(
            FileType::from_mode(libc::S_IFDIR as u32 | 0o755),
            Some(FileType::Directory)
        );
        assert_eq!(FileType::from_mode(libc::S_IFSOCK as u32), None);
    }

    #[test]
    fn test_symlink_size_is_target_length() {
        let ino = Inode::new(3, libc::S_IFLNK as u32 | 0o777, 0, 0, Some(b"/etc/hosts".to_vec()), NOW);
        assert!(ino.is_symlink());
        assert_eq!(ino.size, 10);
    }

    #[test]
    fn test_directory_unlink_drops_self_reference() {
        let mut dir = Inode::new(4, libc::S_IFDIR as u32 | 0o755, 0, 0, None, NOW);
        dir.inc_nlink();
        assert_eq!(dir.nlink, 3);
        dir.dec_nlink();
        assert_eq!(dir.nlink, 2);
        dir.dec_nlink();
        assert_eq!(dir.nlink, 0);
    }

    #[test]
    fn test_generation_only_increases() {
        let mut ino = Inode::new(5, 0o600, 0, 0, None, NOW);
        let g0 = ino.generation;
        ino.inc_nlink();
        ino.dec_nlink();
        ino.dec_nlink();
        ino.mark_deleted();
        ino.mark_deleted();
        assert_eq!(ino.generation, g0 + 4);
        assert!(ino.delete_mark);
    }

    #[test]
    fn test_lease_liveness() {
        let mut ino = Inode::new(6, 0o600, 0, 0, None, NOW);
        ino.lease = Some(Lease { token: LeaseToken(9), expires: NOW + 30 });
        assert!(ino.live_lease(NOW).is_some());
        assert!(ino.live_lease(NOW + 30).is_none());
        ino.nlink = 0;
        assert!(!ino.is_evictable(NOW));
        assert!(ino.is_evictable(NOW + 31));
    }

    #[test]
    fn test_set_permissions_keeps_format_bits() {
        let mut dir = Inode::new(7, libc::S_IFDIR as u32 | 0o755, 0, 0, None, NOW);
        dir.set_permissions(libc::S_IFREG as u32 | 0o700);
        assert_eq!(dir.mode, libc::S_IFDIR as u32 | 0o700);
    }
}
