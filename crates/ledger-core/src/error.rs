use thiserror::Error;

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

/// Why a block was turned away by the chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("expected index {expected}, found {found}")]
    IndexMismatch { expected: u64, found: u64 },

    #[error("no index follows {tip}")]
    IndexOverflow { tip: u64 },

    #[error("previous hash {found} does not match tip hash {expected}")]
    PrevHashMismatch { expected: String, found: String },

    #[error("hash {hash} does not have {difficulty} leading zeros")]
    InsufficientWork { difficulty: u32, hash: String },

    #[error("stored hash {stored} differs from recomputed {computed}")]
    HashMismatch { stored: String, computed: String },

    #[error("genesis block must have index 0 and previous hash \"0\"")]
    BadGenesis,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("mining timeout: block {index} not sealed within {budget_ms} ms (reached nonce {nonce})")]
    MiningTimeout { index: u64, nonce: u64, budget_ms: u64 },

    #[error("block {index} rejected: {reason}")]
    ValidationRejected { index: u64, reason: Rejection },

    #[error("integrity violation at block {index}: {reason}")]
    IntegrityViolation { index: u64, reason: Rejection },

    #[error("persistence failure: {0:#}")]
    Persistence(anyhow::Error),
}

impl LedgerError {
    /// Recoverable errors leave the chain untouched and can be retried with
    /// corrected input; persistence failures cannot.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            LedgerError::Persistence(_) | LedgerError::IntegrityViolation { .. }
        )
    }
}
