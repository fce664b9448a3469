#![allow(dead_code)]

use std::fs;

use ledger_core::{ChainConfig, Record};
use ledger_storage::SledStore;
use rand::Rng;
use serde_json::json;
use tempfile::{tempdir, TempDir};

pub fn create_temp_store() -> (TempDir, SledStore) {
    // Create a temporary directory for the sled database
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().to_path_buf();
    (
        temp_dir,
        SledStore::open(&db_path).expect("Failed to open SledStore"),
    )
}

/// Callers drop every store handle first so sled releases its lock.
pub fn teardown(temp_dir: TempDir) {
    let db_path = temp_dir.path().to_path_buf();
    temp_dir.close().expect("Failed to delete temp dir");
    let _ = fs::remove_dir_all(&db_path);
    // Verify the directory is removed
    assert!(!db_path.exists(), "Database directory should be removed");
}

pub fn easy_config() -> ChainConfig {
    ChainConfig {
        difficulty: 1,
        max_mining_ms: 30_000,
        ..ChainConfig::default()
    }
}

pub fn sample_record(id: u64) -> Record {
    let mut rng = rand::thread_rng();
    serde_json::from_value(json!({
        "id": id,
        "customer_id": id,
        "full_name": format!("Customer {id}"),
        "citizen_ID": format!("{:012}", rng.gen_range(0..1_000_000_000_000u64)),
        "phone_number": format!("09{:08}", rng.gen_range(0..100_000_000u32)),
        "email": format!("customer{id}@example.com"),
        "status": "active",
        "ward": "Ben Nghe",
        "district": "Quan 1",
        "region": "Ho Chi Minh",
        "country": "Viet Nam",
        "country_id": 1,
        "Account_holder": format!("CUSTOMER {id}"),
        "Sort_of_card": "visa",
        "bank_name": "VCB",
        "Bank_number": format!("{:013}", rng.gen_range(0..10_000_000_000_000u64)),
        "cvv/cvc": format!("{:03}", rng.gen_range(0..1000u32)),
    }))
    .expect("sample record")
}

pub fn sample_records(ids: impl IntoIterator<Item = u64>) -> Vec<Record> {
    ids.into_iter().map(sample_record).collect()
}
