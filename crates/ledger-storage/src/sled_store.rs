use anyhow::{bail, Context, Result};
use ledger_core::{Block, BlockSink, Record, RecordSource};
use sled::{Db, Tree};
use std::path::Path;
use tracing::{debug, info, warn};

const TREE_BLOCKS: &str = "blocks";
const TREE_RECORDS: &str = "records";
const TREE_PROCESSED: &str = "processed";

/// Blocks keyed by big-endian index (bincode), records keyed by big-endian id
/// (JSON, since records are flattened rows), and a marker per processed id.
#[derive(Clone)]
pub struct SledStore {
  db: Db,
  blocks: Tree,
  records: Tree,
  processed: Tree,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let db = sled::open(path).with_context(|| format!("opening sled at {}", path.display()))?;
    let blocks = db.open_tree(TREE_BLOCKS)?;
    let records = db.open_tree(TREE_RECORDS)?;
    let processed = db.open_tree(TREE_PROCESSED)?;
    info!(path = %path.display(), "sled store opened");
    Ok(Self {
      db,
      blocks,
      records,
      processed,
    })
  }

  pub fn get_block(&self, index: u64) -> Result<Option<Block>> {
    self
      .blocks
      .get(index.to_be_bytes())?
      .map(|bytes| decode_block(index, &bytes))
      .transpose()
  }

  pub fn tip(&self) -> Result<Option<Block>> {
    match self.blocks.last()? {
      Some((key, bytes)) => decode_block(key_to_u64(&key)?, &bytes).map(Some),
      None => Ok(None),
    }
  }

  pub fn block_count(&self) -> usize {
    self.blocks.len()
  }

  /// Adds a source record unless its id is already known. Returns whether it
  /// was inserted.
  pub fn put_record(&self, record: &Record) -> Result<bool> {
    let bytes = serde_json::to_vec(record)?;
    let inserted = self
      .records
      .compare_and_swap(record.id.to_be_bytes(), None::<&[u8]>, Some(bytes))?
      .is_ok();
    if inserted {
      debug!(record = record.id, "record stored");
    }
    Ok(inserted)
  }

  pub fn put_records<'a>(&self, records: impl IntoIterator<Item = &'a Record>) -> Result<usize> {
    let mut inserted = 0;
    for record in records {
      if self.put_record(record)? {
        inserted += 1;
      }
    }
    self.db.flush()?;
    Ok(inserted)
  }

  pub fn is_processed(&self, record_id: u64) -> Result<bool> {
    Ok(self.processed.contains_key(record_id.to_be_bytes())?)
  }

  pub fn close(&self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }
}

impl BlockSink for SledStore {
  fn load_all(&self) -> Result<Vec<Block>> {
    self
      .blocks
      .iter()
      .map(|entry| {
        let (key, bytes) = entry?;
        decode_block(key_to_u64(&key)?, &bytes)
      })
      .collect()
  }

  fn save(&self, block: &Block) -> Result<()> {
    let bytes = bincode::serialize(block)?;
    insert_durable(&self.blocks, block.index, bytes, || {
      self.db.flush()?;
      Ok(())
    })?;
    info!("Block {} saved to database.", block.index);
    Ok(())
  }
}

impl RecordSource for SledStore {
  fn fetch_pending(&self) -> Result<Vec<Record>> {
    let mut pending = Vec::new();
    for entry in self.records.iter() {
      let (key, bytes) = entry?;
      if self.processed.contains_key(&key)? {
        continue;
      }
      let record: Record = serde_json::from_slice(&bytes)
        .with_context(|| format!("decoding record {}", key_to_u64(&key).unwrap_or_default()))?;
      pending.push(record);
    }
    Ok(pending)
  }

  fn mark_processed(&self, record_id: u64) -> Result<()> {
    self.processed.insert(record_id.to_be_bytes(), Vec::<u8>::new())?;
    self.processed.flush()?;
    Ok(())
  }
}

/// Inserts `bytes` under a fresh `index`, then runs `flush`. A failed flush
/// removes the entry again so a retry is not mistaken for a duplicate.
fn insert_durable(
  tree: &Tree,
  index: u64,
  bytes: Vec<u8>,
  flush: impl FnOnce() -> Result<()>,
) -> Result<()> {
  let key = index.to_be_bytes();
  if tree.compare_and_swap(key, None::<&[u8]>, Some(bytes))?.is_err() {
    bail!("block {index} is already stored");
  }
  if let Err(err) = flush() {
    warn!(index, error = %err, "flush failed, rolling back block");
    tree
      .remove(key)
      .with_context(|| format!("rolling back block {index} after failed flush"))?;
    return Err(err.context(format!("flushing block {index}")));
  }
  Ok(())
}

fn decode_block(index: u64, bytes: &[u8]) -> Result<Block> {
  bincode::deserialize(bytes).with_context(|| format!("decoding block {index}"))
}

fn key_to_u64(key: &[u8]) -> Result<u64> {
  let arr: [u8; 8] = key
    .try_into()
    .with_context(|| format!("malformed key of {} bytes", key.len()))?;
  Ok(u64::from_be_bytes(arr))
}
