//! Order catalog: the exported list of reimbursable records.
//!
//! Records are read from the order export (`all_orders.json`). The export is produced by
//! an external fetcher; only the fields the planner and executor need are modelled here.

use crate::error::StorageError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Identifier of the entity that owns a record. Records of different owners never merge.
pub type OwnerId = u64;

/// One reimbursable record. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "orderId", deserialize_with = "de_string_or_number")]
    pub order_id: String,

    #[serde(rename = "orgId", deserialize_with = "de_owner_id")]
    pub org_id: OwnerId,

    #[serde(rename = "ivcAmount", deserialize_with = "de_amount")]
    pub amount: f64,

    /// Whether the record may take part in a merge.
    #[serde(rename = "canHk", default)]
    pub eligible: bool,

    /// Opaque payload replayed to the remote form when the record is submitted.
    #[serde(
        rename = "originalOrderInfo",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub payload: Option<Value>,
}

impl Record {
    pub fn new(order_id: impl Into<String>, org_id: OwnerId, amount: f64) -> Self {
        Self {
            order_id: order_id.into(),
            org_id,
            amount,
            eligible: true,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn ineligible(mut self) -> Self {
        self.eligible = false;
        self
    }
}

/// Loaded records, indexed by order id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    records: Vec<Record>,
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(records: Vec<Record>) -> Self {
        let mut index = HashMap::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            // first occurrence wins; duplicate exports are common when pages overlap
            index.entry(record.order_id.clone()).or_insert(i);
        }
        Self { records, index }
    }

    /// Load the order export from a JSON array file.
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        if !path.exists() {
            return Err(StorageError::NotFound(path.to_path_buf()));
        }
        let raw = std::fs::read(path)?;
        let records: Vec<Record> =
            serde_json::from_slice(&raw).map_err(|e| StorageError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        tracing::debug!(path = %path.display(), records = records.len(), "Loaded order catalog");
        Ok(Self::new(records))
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, order_id: &str) -> Option<&Record> {
        self.index.get(order_id).map(|&i| &self.records[i])
    }

    /// Records whose order id is not in `exclude`, in catalog order. Repeated ids yield
    /// only their first occurrence, the same record `get` returns.
    pub fn without(&self, exclude: &HashSet<String>) -> Vec<Record> {
        self.records
            .iter()
            .enumerate()
            .filter(|(i, r)| self.index.get(&r.order_id) == Some(i))
            .map(|(_, r)| r)
            .filter(|r| !exclude.contains(&r.order_id))
            .cloned()
            .collect()
    }
}

fn de_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn de_owner_id<'de, D>(deserializer: D) -> Result<OwnerId, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom(format!("invalid owner id {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid owner id {s:?}"))),
        other => Err(serde::de::Error::custom(format!(
            "expected owner id, got {other}"
        ))),
    }
}

fn de_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let amount: f64 = match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom(format!("invalid amount {n}")))?,
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid amount {s:?}")))?,
        other => {
            return Err(serde::de::Error::custom(format!(
                "expected amount, got {other}"
            )))
        }
    };
    // "NaN", "inf" and "-5" all parse as f64
    if !amount.is_finite() || amount < 0.0 {
        return Err(serde::de::Error::custom(format!(
            "amount must be finite and non-negative, got {amount}"
        )));
    }
    Ok(amount)
}
