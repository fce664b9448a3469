//! Append-only, tamper-evident record ledger.
//!
//! Each block commits to one record's category digests through a Merkle root,
//! links to its predecessor by hash, and is sealed by a time-bounded
//! proof-of-work search. Storage and the record feed sit behind the
//! [`BlockSink`] and [`RecordSource`] traits.

pub mod block;
pub mod chain;
pub mod commit;
pub mod config;
pub mod constants;
pub mod error;
pub mod hasher;
pub mod merkle;
pub mod mine;
pub mod record;

pub use block::Block;
pub use chain::{AppendOutcome, BlockSink, Chain, ChainSummary};
pub use commit::{commit_pending, CommitReport};
pub use config::ChainConfig;
pub use error::{LedgerError, Rejection, Result};
pub use hasher::{digest, meets_difficulty, HashHex};
pub use merkle::merkle_root;
pub use mine::MiningStats;
pub use record::{CategoryHashes, Record, RecordSource};
