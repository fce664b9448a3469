//! Raw source records and the three category digests committed per record.

use crate::error::{LedgerError, Result};
use crate::hasher::{digest, HashHex};
use crate::merkle::merkle_root;
use anyhow::Result as AnyResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Customer identity fields. Field order is the serialization order and must
/// not change, since the category digest covers the JSON text.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerInfo {
    #[serde(default)]
    pub customer_id: Value,
    #[serde(default)]
    pub full_name: Value,
    #[serde(default)]
    pub first_name: Value,
    #[serde(default)]
    pub last_name: Value,
    #[serde(default)]
    pub middle_name: Value,
    #[serde(rename = "citizen_ID", default)]
    pub citizen_id: Value,
    #[serde(default)]
    pub phone_number: Value,
    #[serde(rename = "Gender", default)]
    pub gender: Value,
    #[serde(rename = "DoB", default)]
    pub dob: Value,
    #[serde(default)]
    pub email: Value,
    #[serde(default)]
    pub status: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationInfo {
    #[serde(default)]
    pub ward: Value,
    #[serde(default)]
    pub ward_tiki_code: Value,
    #[serde(default)]
    pub district: Value,
    #[serde(default)]
    pub district_tiki_code: Value,
    #[serde(default)]
    pub region: Value,
    #[serde(default)]
    pub region_tiki_code: Value,
    #[serde(default)]
    pub country: Value,
    #[serde(default)]
    pub country_id: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentInfo {
    #[serde(rename = "Account_holder", default)]
    pub account_holder: Value,
    #[serde(rename = "Sort_of_card", default)]
    pub sort_of_card: Value,
    #[serde(default)]
    pub bank_name: Value,
    #[serde(rename = "Bank_number", default)]
    pub bank_number: Value,
    #[serde(rename = "cvv/cvc", default)]
    pub cvv: Value,
}

/// One pending row. Serialized flat, the way rows come out of the source
/// table: `id` next to every customer, location and payment column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    #[serde(flatten)]
    pub customer: CustomerInfo,
    #[serde(flatten)]
    pub location: LocationInfo,
    #[serde(flatten)]
    pub payment: PaymentInfo,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryHashes {
    pub customer: HashHex,
    pub location: HashHex,
    pub payment: HashHex,
}

impl CategoryHashes {
    /// Merkle leaves in commitment order.
    pub fn leaves(&self) -> [&str; 3] {
        [
            self.customer.as_str(),
            self.location.as_str(),
            self.payment.as_str(),
        ]
    }

    pub fn merkle_root(&self) -> Result<HashHex> {
        merkle_root(&self.leaves())
    }
}

impl Record {
    pub fn category_hashes(&self) -> Result<CategoryHashes> {
        Ok(CategoryHashes {
            customer: json_digest(&self.customer)?,
            location: json_digest(&self.location)?,
            payment: json_digest(&self.payment)?,
        })
    }
}

fn json_digest<T: Serialize>(group: &T) -> Result<HashHex> {
    let text = serde_json::to_string(group)
        .map_err(|e| LedgerError::InvalidInput(format!("record not serializable: {e}")))?;
    Ok(digest(text))
}

/// Where pending records come from and where their completion is acknowledged.
pub trait RecordSource: Send + Sync {
    fn fetch_pending(&self) -> AnyResult<Vec<Record>>;
    /// Idempotent; called only after the record's block is durably appended.
    fn mark_processed(&self, record_id: u64) -> AnyResult<()>;
}
