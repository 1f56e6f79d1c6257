use crate::catalog::{OwnerId, Record};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

const TOTAL_EPSILON: f64 = 1e-6;

/// Sorted set of order ids; identifies an invoice independently of selection order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey(Vec<String>);

impl IdentityKey {
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        ids.sort();
        ids.dedup();
        Self(ids)
    }

    pub fn ids(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(","))
    }
}

/// One planned group of records from a single owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub org_id: OwnerId,
    /// Selection order, not sorted.
    pub order_ids: Vec<String>,
    pub amounts: Vec<f64>,
    pub total: f64,
}

impl Invoice {
    /// Build an invoice from selected records. All records must share `org_id`.
    pub fn from_records(org_id: OwnerId, records: &[&Record]) -> Self {
        let order_ids = records.iter().map(|r| r.order_id.clone()).collect();
        let amounts: Vec<f64> = records.iter().map(|r| r.amount).collect();
        let total = amounts.iter().sum();
        Self {
            org_id,
            order_ids,
            amounts,
            total,
        }
    }

    pub fn count(&self) -> usize {
        self.order_ids.len()
    }

    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey::from_ids(self.order_ids.iter().cloned())
    }

    /// Amount above the target that this invoice spends.
    pub fn waste(&self, target_amount: f64) -> f64 {
        self.total - target_amount
    }

    fn check_shape(&self) -> Result<(), String> {
        if self.order_ids.is_empty() {
            return Err(format!("invoice for org {} has no orders", self.org_id));
        }
        if self.order_ids.len() != self.amounts.len() {
            return Err(format!(
                "invoice for org {} lists {} orders but {} amounts",
                self.org_id,
                self.order_ids.len(),
                self.amounts.len()
            ));
        }
        let sum: f64 = self.amounts.iter().sum();
        if (sum - self.total).abs() > TOTAL_EPSILON {
            return Err(format!(
                "invoice for org {} has total {} but amounts sum to {}",
                self.org_id, self.total, sum
            ));
        }
        Ok(())
    }
}

/// A record that could not be grouped to reach the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeftoverEntry {
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "ivcAmount")]
    pub amount: f64,
}

impl From<&Record> for LeftoverEntry {
    fn from(record: &Record) -> Self {
        Self {
            order_id: record.order_id.clone(),
            amount: record.amount,
        }
    }
}

/// Planner output: invoices in production order plus per-owner leftovers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub invoices: Vec<Invoice>,
    pub leftover: BTreeMap<OwnerId, Vec<LeftoverEntry>>,
}

impl Plan {
    pub fn total_invoices(&self) -> usize {
        self.invoices.len()
    }

    pub fn total_orders_used(&self) -> usize {
        self.invoices.iter().map(Invoice::count).sum()
    }

    pub fn total_amount(&self) -> f64 {
        self.invoices.iter().map(|i| i.total).sum()
    }

    pub fn leftover_count(&self) -> usize {
        self.leftover.values().map(Vec::len).sum()
    }

    /// Mean amount above target per invoice; zero for an empty plan.
    pub fn avg_waste(&self, target_amount: f64) -> f64 {
        if self.invoices.is_empty() {
            return 0.0;
        }
        let waste: f64 = self.invoices.iter().map(|i| i.waste(target_amount)).sum();
        waste / self.invoices.len() as f64
    }

    pub fn summary(&self, target_amount: f64) -> PlanSummary {
        PlanSummary {
            total_invoices: self.total_invoices(),
            total_orders_used: self.total_orders_used(),
            total_amount: self.total_amount(),
            avg_waste: self.avg_waste(target_amount),
        }
    }

    /// Structural checks applied to plans read back from disk.
    pub fn check_integrity(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for invoice in &self.invoices {
            invoice.check_shape()?;
            for id in &invoice.order_ids {
                if !seen.insert(id.as_str()) {
                    return Err(format!("order {id} appears in more than one place"));
                }
            }
        }
        for entries in self.leftover.values() {
            for entry in entries {
                if !seen.insert(entry.order_id.as_str()) {
                    return Err(format!(
                        "order {} appears in more than one place",
                        entry.order_id
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub total_invoices: usize,
    pub total_orders_used: usize,
    pub total_amount: f64,
    pub avg_waste: f64,
}

/// Persisted plan file layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDocument {
    pub invoices: Vec<Invoice>,
    #[serde(default)]
    pub leftover: BTreeMap<OwnerId, Vec<LeftoverEntry>>,
    pub summary: PlanSummary,
}

impl PlanDocument {
    pub fn new(plan: &Plan, target_amount: f64) -> Self {
        Self {
            invoices: plan.invoices.clone(),
            leftover: plan.leftover.clone(),
            summary: plan.summary(target_amount),
        }
    }

    pub fn into_plan(self) -> Plan {
        Plan {
            invoices: self.invoices,
            leftover: self.leftover,
        }
    }
}
