use crate::error::{LedgerError, Result};
use crate::hasher::meets_difficulty;
use crate::Block;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MiningStats {
    pub attempts: u64,
    pub elapsed: Duration,
}

/// Seals `block` by incrementing its nonce until the hash carries
/// `difficulty` leading zeros.
///
/// The search is bounded by wall-clock time. On timeout the block keeps the
/// last nonce and hash it tried and must not be appended.
pub fn mine(block: &mut Block, budget: Duration) -> Result<MiningStats> {
    let start = Instant::now();
    let mut attempts = 0u64;

    if block.difficulty == 0 {
        block.hash = block.compute_hash();
        return Ok(MiningStats {
            attempts: 1,
            elapsed: start.elapsed(),
        });
    }

    let mut sealed = block.is_sealed();
    while !sealed {
        if start.elapsed() > budget {
            warn!(index = block.index, nonce = block.nonce, attempts, "mining timed out");
            return Err(timeout(block, budget));
        }
        block.nonce = block.nonce.wrapping_add(1);
        block.hash = block.compute_hash();
        attempts += 1;
        sealed = meets_difficulty(&block.hash, block.difficulty);
    }

    let elapsed = start.elapsed();
    info!(
        "Mined block {} with nonce {} and hash {} in {:?}",
        block.index, block.nonce, block.hash, elapsed
    );
    Ok(MiningStats { attempts, elapsed })
}

/// Same nonce sequence as [`mine`], spread across the rayon pool.
///
/// `find_map_first` keeps the lowest winning nonce, so the result matches the
/// sequential search. On timeout the block is left untouched.
pub fn mine_parallel(block: &mut Block, budget: Duration) -> Result<MiningStats> {
    if block.difficulty == 0 || block.is_sealed() {
        return mine(block, budget);
    }

    let start = Instant::now();
    let attempts = AtomicU64::new(0);
    let template = &*block;
    let first = template.nonce.wrapping_add(1);

    let found = (first..u64::MAX).into_par_iter().find_map_first(|nonce| {
        if start.elapsed() > budget {
            return Some(None);
        }
        attempts.fetch_add(1, Ordering::Relaxed);
        let hash = template.hash_with_nonce(nonce);
        meets_difficulty(&hash, template.difficulty).then_some(Some((nonce, hash)))
    });

    let attempts = attempts.into_inner();
    match found.flatten() {
        Some((nonce, hash)) => {
            block.nonce = nonce;
            block.hash = hash;
            let elapsed = start.elapsed();
            info!(
                "Mined block {} with nonce {} and hash {} in {:?} (parallel)",
                block.index, block.nonce, block.hash, elapsed
            );
            Ok(MiningStats { attempts, elapsed })
        }
        None => {
            warn!(index = block.index, attempts, "parallel mining timed out");
            Err(timeout(block, budget))
        }
    }
}

fn timeout(block: &Block, budget: Duration) -> LedgerError {
    LedgerError::MiningTimeout {
        index: block.index,
        nonce: block.nonce,
        budget_ms: budget.as_millis() as u64,
    }
}
