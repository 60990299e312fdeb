// Test fixtures and command generators for integration tests

use metanode::metadata::{InodeOp, SetAttrRequest};
use metanode::types::{EpochSecs, Inode, InodeId, LeaseToken};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Deterministic generator of committed command sequences.
///
/// Commands target ids created earlier in the same sequence plus some that never
/// existed, so every apply branch gets exercised.
pub struct CommandGenerator {
    rng: StdRng,
    next_id: InodeId,
    created: Vec<InodeId>,
    tokens: Vec<(InodeId, LeaseToken)>,
    now: EpochSecs,
}

impl CommandGenerator {
    /// Creates a new generator with a fixed seed for reproducibility
    pub fn new(seed: u64, first_id: InodeId, now: EpochSecs) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            next_id: first_id,
            created: Vec::new(),
            tokens: Vec::new(),
            now,
        }
    }

    fn target(&mut self) -> InodeId {
        if self.created.is_empty() || self.rng.gen_bool(0.1) {
            // never created
            return 900_000 + self.rng.gen_range(0..100);
        }
        let i = self.rng.gen_range(0..self.created.len());
        self.created[i]
    }

    /// Next command; the clock moves forward by up to ten seconds per command.
    pub fn next_op(&mut self) -> InodeOp {
        self.now += self.rng.gen_range(0..10);
        let now = self.now;

        match self.rng.gen_range(0..10) {
            0 | 1 => {
                let id = self.next_id;
                self.next_id += 1;
                self.created.push(id);
                let mode = if self.rng.gen_bool(0.3) {
                    libc::S_IFDIR as u32 | 0o755
                } else {
                    0o644
                };
                InodeOp::CreateInode {
                    inode: Inode::new(id, mode, self.rng.gen_range(0..4), 0, None, now),
                }
            }
            2 => InodeOp::CreateLinkInode {
                inode: self.target(),
                now,
            },
            3 | 4 => InodeOp::UnlinkInode {
                inode: self.target(),
                now,
            },
            5 => {
                let inode = self.target();
                let token = LeaseToken(self.rng.gen_range(1..=u64::MAX));
                self.tokens.push((inode, token));
                InodeOp::Open {
                    inode,
                    token,
                    atime: now,
                    expires: now + self.rng.gen_range(1..60),
                }
            }
            6 if !self.tokens.is_empty() => {
                let i = self.rng.gen_range(0..self.tokens.len());
                let (inode, token) = self.tokens.swap_remove(i);
                InodeOp::ReleaseOpen { inode, token, now }
            }
            7 => InodeOp::EvictInode {
                inode: self.target(),
                now,
            },
            _ => {
                let req = SetAttrRequest {
                    inode: self.target(),
                    size: Some(self.rng.gen_range(0..1 << 20)),
                    mtime: Some(now),
                    ..Default::default()
                };
                InodeOp::SetAttr {
                    payload: serde_json::to_vec(&req).unwrap(),
                }
            }
        }
    }

    /// A sequence of `len` commands.
    pub fn sequence(&mut self, len: usize) -> Vec<InodeOp> {
        (0..len).map(|_| self.next_op()).collect()
    }
}
