use crate::constants::{GENESIS_PREV_HASH, STATUS_NEW};
use crate::error::Result;
use crate::hasher::{digest, meets_difficulty, HashHex};
use crate::mine::{self, MiningStats};
use crate::record::CategoryHashes;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub prev_hash: HashHex,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub merkle_root: HashHex,
    pub difficulty: u32,
    pub nonce: u64,
    pub status: String,
    /// Empty until the block is sealed or reloaded.
    pub hash: HashHex,
    pub category_hashes: Option<CategoryHashes>,
}

impl Block {
    pub fn new(index: u64, prev_hash: impl Into<HashHex>, timestamp: u64, difficulty: u32) -> Self {
        Self {
            index,
            prev_hash: prev_hash.into(),
            timestamp,
            merkle_root: HashHex::new(),
            difficulty,
            nonce: 0,
            status: STATUS_NEW.to_string(),
            hash: HashHex::new(),
            category_hashes: None,
        }
    }

    pub fn genesis(timestamp: u64, difficulty: u32) -> Self {
        Self::new(0, GENESIS_PREV_HASH, timestamp, difficulty)
    }

    /// Attach the record's category digests and commit to their Merkle root.
    pub fn set_hashes(&mut self, hashes: CategoryHashes) -> Result<()> {
        self.merkle_root = hashes.merkle_root()?;
        self.category_hashes = Some(hashes);
        Ok(())
    }

    /// Canonical preimage: index, prev_hash, timestamp, merkle_root,
    /// difficulty, nonce, status, concatenated with no separator.
    pub fn preimage(&self, nonce: u64) -> String {
        format!(
            "{}{}{}{}{}{}{}",
            self.index,
            self.prev_hash,
            self.timestamp,
            self.merkle_root,
            self.difficulty,
            nonce,
            self.status
        )
    }

    pub fn hash_with_nonce(&self, nonce: u64) -> HashHex {
        digest(self.preimage(nonce))
    }

    /// Digest of the current fields, ignoring whatever `hash` holds.
    pub fn compute_hash(&self) -> HashHex {
        self.hash_with_nonce(self.nonce)
    }

    /// Stored hash matches the fields and meets the difficulty target.
    pub fn is_sealed(&self) -> bool {
        !self.hash.is_empty()
            && meets_difficulty(&self.hash, self.difficulty)
            && self.hash == self.compute_hash()
    }

    pub fn mine(&mut self, budget: Duration) -> Result<MiningStats> {
        mine::mine(self, budget)
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
