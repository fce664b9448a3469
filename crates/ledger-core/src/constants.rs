pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const GENESIS_PREV_HASH: &str = "0";
pub const STATUS_NEW: &str = "new";
pub const DEFAULT_DIFFICULTY: u32 = 4;
pub const DEFAULT_MAX_MINING_MS: u64 = 5_000;
pub const DEFAULT_CHAIN_NAME: &str = "My Blockchain";
