use crate::constants::{DEFAULT_CHAIN_NAME, DEFAULT_DIFFICULTY, DEFAULT_MAX_MINING_MS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Policy for a chain instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Display name
    pub name: String,

    /// Difficulty given to newly created blocks
    pub difficulty: u32,

    /// Wall-clock budget for sealing one block
    pub max_mining_ms: u64,

    /// Search nonces on the rayon pool instead of the calling thread
    pub parallel: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_CHAIN_NAME.to_string(),
            difficulty: DEFAULT_DIFFICULTY,
            max_mining_ms: DEFAULT_MAX_MINING_MS,
            parallel: false,
        }
    }
}

impl ChainConfig {
    pub fn mining_budget(&self) -> Duration {
        Duration::from_millis(self.max_mining_ms)
    }
}
