use crate::constants::HASH_HEX_SIZE;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 digest, the only digest form used by the ledger.
pub type HashHex = String;

pub fn digest(input: impl AsRef<[u8]>) -> HashHex {
    hex::encode(Sha256::digest(input.as_ref()))
}

/// True when `hash` starts with `difficulty` consecutive `'0'` characters.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let needed = difficulty as usize;
    hash.len() >= needed && hash.bytes().take(needed).all(|b| b == b'0')
}

pub fn is_digest(s: &str) -> bool {
    s.len() == HASH_HEX_SIZE && s.bytes().all(|b| b.is_ascii_hexdigit())
}
