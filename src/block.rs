//! Block identity
//!
//! A block is a fixed-size chunk of file data. Datanodes hold replicas of
//! blocks; the coordinator only ever refers to them by id, length and
//! generation stamp.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Generation stamp used by blocks created before stamps existed
pub const GRANDFATHER_GENERATION_STAMP: u64 = 0;

/// First generation stamp handed out to newly allocated blocks
pub const FIRST_VALID_STAMP: u64 = 1000;

/// Block identifier
pub type BlockId = u64;

/// A block replica reference.
///
/// Equality, ordering and hashing only consider `block_id`: two references to
/// the same id with different stamps or lengths name the same block.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Block {
    pub block_id: BlockId,
    pub num_bytes: u64,
    pub generation_stamp: u64,
}

impl Block {
    pub fn new(block_id: BlockId, num_bytes: u64, generation_stamp: u64) -> Self {
        Self {
            block_id,
            num_bytes,
            generation_stamp,
        }
    }

    pub fn id(&self) -> BlockId {
        self.block_id
    }

    /// Block name as it appears in datanode storage directories
    pub fn block_name(&self) -> String {
        format!("blk_{}", self.block_id)
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.block_id == other.block_id
    }
}

impl Eq for Block {}

impl PartialOrd for Block {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Block {
    fn cmp(&self, other: &Self) -> Ordering {
        self.block_id.cmp(&other.block_id)
    }
}

impl Hash for Block {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.block_id.hash(state);
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.block_name(), self.generation_stamp)
    }
}
