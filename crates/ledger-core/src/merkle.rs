use crate::error::{LedgerError, Result};
use crate::hasher::{digest, is_digest, HashHex};

/// Root over an ordered list of hex digests.
///
/// Adjacent leaves are paired left to right and combined as
/// `digest(left_hex + right_hex)`. An odd leaf at the end of a level is paired
/// with itself. A single leaf is its own root.
pub fn merkle_root<S: AsRef<str>>(leaves: &[S]) -> Result<HashHex> {
    if leaves.is_empty() {
        return Err(LedgerError::InvalidInput(
            "merkle root needs at least one leaf".into(),
        ));
    }
    if let Some(pos) = leaves.iter().position(|l| !is_digest(l.as_ref())) {
        return Err(LedgerError::InvalidInput(format!(
            "leaf {pos} is not a hex digest"
        )));
    }

    let mut level: Vec<HashHex> = leaves.iter().map(|l| l.as_ref().to_owned()).collect();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                let mut joined = String::with_capacity(left.len() + right.len());
                joined.push_str(left);
                joined.push_str(right);
                digest(joined)
            })
            .collect();
    }
    Ok(level.swap_remove(0))
}
