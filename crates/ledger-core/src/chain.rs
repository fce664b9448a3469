use crate::block::now_millis;
use crate::config::ChainConfig;
use crate::constants::GENESIS_PREV_HASH;
use crate::error::{LedgerError, Rejection, Result};
use crate::hasher::{meets_difficulty, HashHex};
use crate::mine::{self, MiningStats};
use crate::record::CategoryHashes;
use crate::Block;
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Durable home of the chain's blocks.
/// This lives in `ledger-core` to avoid a circular dependency with storage.
pub trait BlockSink: Send + Sync {
    /// Every persisted block, index ascending.
    fn load_all(&self) -> anyhow::Result<Vec<Block>>;
    /// Atomic per block. Must fail if `block.index` is already stored.
    fn save(&self, block: &Block) -> anyhow::Result<()>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended { index: u64, hash: HashHex },
    Rejected { index: u64, reason: Rejection },
}

impl AppendOutcome {
    pub fn is_appended(&self) -> bool {
        matches!(self, AppendOutcome::Appended { .. })
    }

    /// Turn a soft rejection into [`LedgerError::ValidationRejected`].
    pub fn into_result(self) -> Result<HashHex> {
        match self {
            AppendOutcome::Appended { hash, .. } => Ok(hash),
            AppendOutcome::Rejected { index, reason } => {
                Err(LedgerError::ValidationRejected { index, reason })
            }
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BlockSummary {
    pub index: u64,
    pub prev_hash: HashHex,
    pub timestamp: u64,
    pub merkle_root: HashHex,
    pub hash: HashHex,
    pub difficulty: u32,
    pub status: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChainSummary {
    pub name: String,
    pub length: usize,
    pub difficulty: u32,
    pub blocks: Vec<BlockSummary>,
}

/// Append-only sequence of sealed blocks, persisted through a [`BlockSink`].
///
/// Single writer: every mutation goes through [`Chain::append`], which takes
/// `&mut self`.
pub struct Chain<S: BlockSink> {
    store: Arc<S>,
    config: ChainConfig,
    blocks: Vec<Block>,
}

impl<S: BlockSink> Chain<S> {
    /// Empty chain, nothing read from the store yet.
    pub fn new(store: Arc<S>, config: ChainConfig) -> Self {
        Self {
            store,
            config,
            blocks: Vec::new(),
        }
    }

    /// Chain holding whatever the store has persisted.
    pub fn load(store: Arc<S>, config: ChainConfig) -> Result<Self> {
        let blocks = store
            .load_all()
            .context("loading chain")
            .map_err(LedgerError::Persistence)?;
        debug!(blocks = blocks.len(), "chain loaded from store");
        Ok(Self {
            store,
            config,
            blocks,
        })
    }

    /// Load and re-verify, then mine and append a genesis block if the store
    /// was empty.
    pub fn init(store: Arc<S>, config: ChainConfig) -> Result<Self> {
        let mut chain = Self::load(store, config)?;
        chain.verify_integrity()?;
        if chain.ensure_genesis()? {
            info!(name = %chain.config.name, "created genesis block");
        } else {
            info!(
                "Blockchain loaded successfully with {} blocks.",
                chain.blocks.len()
            );
        }
        Ok(chain)
    }

    /// Ensure a genesis block exists. Idempotent; returns whether one was created.
    pub fn ensure_genesis(&mut self) -> Result<bool> {
        if !self.blocks.is_empty() {
            return Ok(false);
        }
        let mut genesis = Block::genesis(now_millis(), self.config.difficulty);
        self.mine(&mut genesis)?;
        self.append(genesis)?.into_result()?;
        Ok(true)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn difficulty(&self) -> u32 {
        self.config.difficulty
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn last_block(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Unsealed candidate extending the current tip.
    pub fn next_block(&self, hashes: CategoryHashes) -> Result<Block> {
        let (index, prev_hash, timestamp) = match self.last_block() {
            Some(tip) => {
                let index = tip.index.checked_add(1).ok_or_else(|| {
                    LedgerError::InvalidInput(format!("no index follows {}", tip.index))
                })?;
                (index, tip.hash.clone(), now_millis().max(tip.timestamp))
            }
            None => (0, GENESIS_PREV_HASH.to_string(), now_millis()),
        };
        let mut block = Block::new(index, prev_hash, timestamp, self.config.difficulty);
        block.set_hashes(hashes)?;
        Ok(block)
    }

    /// Seal `block` with this chain's mining policy.
    pub fn mine(&self, block: &mut Block) -> Result<MiningStats> {
        let budget = self.config.mining_budget();
        if self.config.parallel {
            mine::mine_parallel(block, budget)
        } else {
            mine::mine(block, budget)
        }
    }

    /// Check `candidate` against the tip and its own proof of work.
    ///
    /// The hash is recomputed from the candidate's fields; the stored `hash`
    /// is ignored. On success the recomputed hash is returned.
    pub fn validate(&self, candidate: &Block) -> Result<HashHex, Rejection> {
        if let Some(tip) = self.last_block() {
            let expected = tip
                .index
                .checked_add(1)
                .ok_or(Rejection::IndexOverflow { tip: tip.index })?;
            if candidate.index != expected {
                return Err(Rejection::IndexMismatch {
                    expected,
                    found: candidate.index,
                });
            }
            if candidate.prev_hash != tip.hash {
                return Err(Rejection::PrevHashMismatch {
                    expected: tip.hash.clone(),
                    found: candidate.prev_hash.clone(),
                });
            }
        }
        let hash = candidate.compute_hash();
        if !meets_difficulty(&hash, candidate.difficulty) {
            return Err(Rejection::InsufficientWork {
                difficulty: candidate.difficulty,
                hash,
            });
        }
        Ok(hash)
    }

    pub fn is_valid(&self, candidate: &Block) -> bool {
        self.validate(candidate).is_ok()
    }

    /// Validate, persist, then push.
    ///
    /// A failed validation is reported as [`AppendOutcome::Rejected`] and the
    /// chain is left as it was. A failed write is returned as
    /// [`LedgerError::Persistence`], also without touching the chain.
    pub fn append(&mut self, mut candidate: Block) -> Result<AppendOutcome> {
        let index = candidate.index;
        let hash = match self.validate(&candidate) {
            Ok(hash) => hash,
            Err(reason) => {
                warn!(index, %reason, "Invalid block!");
                return Ok(AppendOutcome::Rejected { index, reason });
            }
        };
        candidate.hash = hash.clone();

        self.store
            .save(&candidate)
            .with_context(|| format!("saving block {index}"))
            .map_err(LedgerError::Persistence)?;

        self.blocks.push(candidate);
        info!(index, %hash, "Block {index} added successfully.");
        Ok(AppendOutcome::Appended { index, hash })
    }

    /// Re-derive every hash and link. Catches blocks edited after they were
    /// stored.
    pub fn verify_integrity(&self) -> Result<()> {
        for (pos, block) in self.blocks.iter().enumerate() {
            let violation = |reason| LedgerError::IntegrityViolation {
                index: block.index,
                reason,
            };
            match pos.checked_sub(1).map(|p| &self.blocks[p]) {
                None => {
                    if block.index != 0 || block.prev_hash != GENESIS_PREV_HASH {
                        return Err(violation(Rejection::BadGenesis));
                    }
                }
                Some(prev) => {
                    let Some(expected) = prev.index.checked_add(1) else {
                        return Err(violation(Rejection::IndexOverflow { tip: prev.index }));
                    };
                    if block.index != expected {
                        return Err(violation(Rejection::IndexMismatch {
                            expected,
                            found: block.index,
                        }));
                    }
                    if block.prev_hash != prev.hash {
                        return Err(violation(Rejection::PrevHashMismatch {
                            expected: prev.hash.clone(),
                            found: block.prev_hash.clone(),
                        }));
                    }
                }
            }
            let computed = block.compute_hash();
            if computed != block.hash {
                return Err(violation(Rejection::HashMismatch {
                    stored: block.hash.clone(),
                    computed,
                }));
            }
            if !meets_difficulty(&block.hash, block.difficulty) {
                return Err(violation(Rejection::InsufficientWork {
                    difficulty: block.difficulty,
                    hash: block.hash.clone(),
                }));
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> ChainSummary {
        ChainSummary {
            name: self.config.name.clone(),
            length: self.blocks.len(),
            difficulty: self.config.difficulty,
            blocks: self
                .blocks
                .iter()
                .map(|b| BlockSummary {
                    index: b.index,
                    prev_hash: b.prev_hash.clone(),
                    timestamp: b.timestamp,
                    merkle_root: b.merkle_root.clone(),
                    hash: b.hash.clone(),
                    difficulty: b.difficulty,
                    status: b.status.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::digest;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const T: u64 = 1_700_000_000_000;

    #[derive(Default)]
    struct MemorySink {
        blocks: Mutex<Vec<Block>>,
        fail_saves: AtomicBool,
    }

    impl BlockSink for MemorySink {
        fn load_all(&self) -> anyhow::Result<Vec<Block>> {
            Ok(self.blocks.lock().unwrap().clone())
        }

        fn save(&self, block: &Block) -> anyhow::Result<()> {
            if self.fail_saves.load(Ordering::SeqCst) {
                anyhow::bail!("disk on fire");
            }
            self.blocks.lock().unwrap().push(block.clone());
            Ok(())
        }
    }

    fn config(difficulty: u32) -> ChainConfig {
        ChainConfig {
            difficulty,
            max_mining_ms: 30_000,
            ..ChainConfig::default()
        }
    }

    fn hashes(tag: &str) -> CategoryHashes {
        CategoryHashes {
            customer: digest(format!("{tag}-customer")),
            location: digest(format!("{tag}-location")),
            payment: digest(format!("{tag}-payment")),
        }
    }

    fn sealed_genesis(difficulty: u32) -> Block {
        let mut genesis = Block::genesis(T, difficulty);
        genesis.merkle_root = digest("genesis");
        genesis.mine(Duration::from_secs(30)).unwrap();
        genesis
    }

    fn chain_with_genesis(difficulty: u32) -> Chain<MemorySink> {
        let mut chain = Chain::new(Arc::new(MemorySink::default()), config(difficulty));
        assert!(chain.append(sealed_genesis(difficulty)).unwrap().is_appended());
        chain
    }

    fn extend(chain: &mut Chain<MemorySink>, tag: &str) -> AppendOutcome {
        let mut block = chain.next_block(hashes(tag)).unwrap();
        chain.mine(&mut block).unwrap();
        chain.append(block).unwrap()
    }

    #[test]
    fn genesis_then_second_block() {
        let mut chain = Chain::new(Arc::new(MemorySink::default()), config(2));
        let genesis = sealed_genesis(2);
        assert!(genesis.hash.starts_with("00"));
        assert!(chain.is_valid(&genesis));
        chain.append(genesis.clone()).unwrap().into_result().unwrap();

        let mut second = Block::new(1, genesis.hash.clone(), T + 1, 2);
        second.set_hashes(hashes("second")).unwrap();
        second.mine(Duration::from_secs(30)).unwrap();
        let outcome = chain.append(second).unwrap();

        assert!(outcome.is_appended());
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.store().load_all().unwrap().len(), 2);
    }

    #[test]
    fn init_synthesizes_genesis_once() {
        let store = Arc::new(MemorySink::default());
        let chain = Chain::init(store.clone(), config(1)).unwrap();
        assert_eq!(chain.len(), 1);
        let genesis = chain.last_block().unwrap();
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.prev_hash, "0");
        assert!(genesis.hash.starts_with('0'));

        let reloaded = Chain::init(store.clone(), config(1)).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.blocks(), chain.blocks());
        assert_eq!(store.load_all().unwrap().len(), 1);
    }

    #[test]
    fn init_fails_when_genesis_cannot_be_mined() {
        let cfg = ChainConfig {
            difficulty: 8,
            max_mining_ms: 1,
            ..ChainConfig::default()
        };
        let store = Arc::new(MemorySink::default());
        let err = Chain::init(store.clone(), cfg).err().unwrap();
        assert!(matches!(err, LedgerError::MiningTimeout { index: 0, .. }));
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn sequential_integrity() {
        let mut chain = chain_with_genesis(1);
        for i in 0..5 {
            assert!(extend(&mut chain, &format!("r{i}")).is_appended());
        }
        let blocks = chain.blocks();
        assert_eq!(blocks.len(), 6);
        for pair in blocks.windows(2) {
            assert_eq!(pair[1].index, pair[0].index + 1);
            assert_eq!(pair[1].prev_hash, pair[0].hash);
            assert!(pair[1].timestamp >= pair[0].timestamp);
        }
        chain.verify_integrity().unwrap();
    }

    #[test]
    fn duplicate_index_is_rejected() {
        let mut chain = chain_with_genesis(1);
        extend(&mut chain, "a");
        let tip = chain.last_block().unwrap().clone();

        let mut dup = Block::new(tip.index, tip.hash.clone(), T, 1);
        dup.set_hashes(hashes("dup")).unwrap();
        dup.mine(Duration::from_secs(30)).unwrap();

        let outcome = chain.append(dup.clone()).unwrap();
        assert_eq!(
            outcome,
            AppendOutcome::Rejected {
                index: tip.index,
                reason: Rejection::IndexMismatch {
                    expected: tip.index + 1,
                    found: tip.index
                }
            }
        );
        assert_eq!(chain.len(), 2);
        // rejecting again changes nothing either
        assert!(!chain.append(dup).unwrap().is_appended());
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn block_after_max_index_is_rejected_not_panicking() {
        let mut chain = Chain::new(Arc::new(MemorySink::default()), config(0));
        let last = Block::new(u64::MAX, digest("x"), 1, 0);
        assert!(chain.append(last).unwrap().is_appended());

        let tip_hash = chain.last_block().unwrap().hash.clone();
        let outcome = chain.append(Block::new(0, tip_hash, 2, 0)).unwrap();
        assert_eq!(
            outcome,
            AppendOutcome::Rejected {
                index: 0,
                reason: Rejection::IndexOverflow { tip: u64::MAX }
            }
        );
        assert_eq!(chain.len(), 1);

        let err = chain.next_block(hashes("after-max")).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
    }

    #[test]
    fn init_rejects_tampered_store() {
        let store = Arc::new(MemorySink::default());
        {
            let mut chain = Chain::init(store.clone(), config(1)).unwrap();
            assert!(extend(&mut chain, "a").is_appended());
        }
        store.blocks.lock().unwrap()[1].merkle_root = digest("forged");

        let err = Chain::init(store.clone(), config(1)).err().unwrap();
        assert!(matches!(
            err,
            LedgerError::IntegrityViolation {
                index: 1,
                reason: Rejection::HashMismatch { .. }
            }
        ));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn prev_hash_mismatch_is_rejected() {
        let mut chain = chain_with_genesis(1);
        let mut block = chain.next_block(hashes("x")).unwrap();
        block.prev_hash = digest("someone else");
        block.mine(Duration::from_secs(30)).unwrap();

        let err = chain.append(block).unwrap().into_result().unwrap_err();
        assert!(matches!(
            err,
            LedgerError::ValidationRejected {
                reason: Rejection::PrevHashMismatch { .. },
                ..
            }
        ));
        assert!(err.is_recoverable());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn unmined_block_is_rejected() {
        let mut chain = chain_with_genesis(0);
        let mut block = chain.next_block(hashes("lazy")).unwrap();
        block.difficulty = 3;
        while meets_difficulty(&block.compute_hash(), 3) {
            block.nonce += 1;
        }
        assert!(!chain.is_valid(&block));
        let outcome = chain.append(block).unwrap();
        assert!(matches!(
            outcome,
            AppendOutcome::Rejected {
                reason: Rejection::InsufficientWork { difficulty: 3, .. },
                ..
            }
        ));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn empty_chain_checks_only_work() {
        let mut chain = Chain::new(Arc::new(MemorySink::default()), config(0));
        let block = Block::new(5, digest("anything"), T, 0);
        assert!(chain.append(block).unwrap().is_appended());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn append_assigns_recomputed_hash() {
        let mut chain = chain_with_genesis(1);
        let mut block = chain.next_block(hashes("h")).unwrap();
        chain.mine(&mut block).unwrap();
        let expected = block.compute_hash();
        block.hash = "bogus".into();

        assert!(chain.is_valid(&block));
        assert_eq!(block.hash, "bogus");

        let hash = chain.append(block).unwrap().into_result().unwrap();
        assert_eq!(hash, expected);
        assert_eq!(chain.last_block().unwrap().hash, expected);
    }

    #[test]
    fn failed_save_leaves_chain_unchanged() {
        let mut chain = chain_with_genesis(1);
        chain.store().fail_saves.store(true, Ordering::SeqCst);
        let mut block = chain.next_block(hashes("f")).unwrap();
        chain.mine(&mut block).unwrap();

        let err = chain.append(block).unwrap_err();
        assert!(matches!(err, LedgerError::Persistence(_)));
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("disk on fire"));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn mining_timeout_leaves_chain_unchanged() {
        let mut chain = Chain::new(
            Arc::new(MemorySink::default()),
            ChainConfig {
                difficulty: 8,
                max_mining_ms: 1,
                ..ChainConfig::default()
            },
        );
        chain.append(sealed_genesis(0)).unwrap().into_result().unwrap();

        let mut block = chain.next_block(hashes("slow")).unwrap();
        let err = chain.mine(&mut block).unwrap_err();
        assert!(matches!(err, LedgerError::MiningTimeout { index: 1, .. }));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn parallel_policy_appends() {
        let mut chain = Chain::new(
            Arc::new(MemorySink::default()),
            ChainConfig {
                parallel: true,
                ..config(2)
            },
        );
        chain.ensure_genesis().unwrap();
        assert!(extend(&mut chain, "p").is_appended());
        chain.verify_integrity().unwrap();
    }

    #[test]
    fn next_block_extends_tip() {
        let chain = chain_with_genesis(1);
        let tip = chain.last_block().unwrap();
        let block = chain.next_block(hashes("n")).unwrap();
        assert_eq!(block.index, 1);
        assert_eq!(block.prev_hash, tip.hash);
        assert_eq!(block.difficulty, 1);
        assert_eq!(block.nonce, 0);
        assert_eq!(block.status, "new");
        assert!(block.timestamp >= tip.timestamp);
        assert_eq!(block.merkle_root, hashes("n").merkle_root().unwrap());
    }

    #[test]
    fn tampered_block_fails_verification() {
        let mut chain = chain_with_genesis(1);
        extend(&mut chain, "a");
        extend(&mut chain, "b");
        chain.blocks[1].merkle_root = digest("forged");

        let err = chain.verify_integrity().unwrap_err();
        assert!(matches!(
            err,
            LedgerError::IntegrityViolation {
                index: 1,
                reason: Rejection::HashMismatch { .. }
            }
        ));
    }

    #[test]
    fn rehashed_tamper_breaks_linkage() {
        let mut chain = chain_with_genesis(0);
        extend(&mut chain, "a");
        extend(&mut chain, "b");
        chain.blocks[1].merkle_root = digest("forged");
        chain.blocks[1].hash = chain.blocks[1].compute_hash();

        let err = chain.verify_integrity().unwrap_err();
        assert!(matches!(
            err,
            LedgerError::IntegrityViolation {
                index: 2,
                reason: Rejection::PrevHashMismatch { .. }
            }
        ));
    }

    #[test]
    fn summary_lists_blocks() {
        let mut chain = chain_with_genesis(1);
        extend(&mut chain, "s");
        let summary = chain.summary();
        assert_eq!(summary.name, "My Blockchain");
        assert_eq!(summary.length, 2);
        assert_eq!(summary.blocks[1].prev_hash, summary.blocks[0].hash);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["blocks"][0]["status"], "new");
    }
}
