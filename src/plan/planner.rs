//! Merge planner: partitions eligible records per owner into the fewest-record groups that
//! each reach the target amount.
//!
//! Pure and deterministic. For every owner the planner repeatedly picks the combination of
//! remaining records with the smallest total that still reaches the target, trying group
//! sizes from 2 upward. Tight groups leave more records for further invoices, so the search
//! optimises invoice count rather than total waste.

use crate::catalog::{OwnerId, Record};
use crate::config::MergeConfig;
use crate::error::MergeError;
use crate::plan::model::{Invoice, LeftoverEntry, Plan};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Totals below `target * TIGHT_FACTOR` end the search for larger group sizes.
const TIGHT_FACTOR: f64 = 1.10;
const MIN_GROUP_SIZE: usize = 2;

#[derive(Debug, Clone)]
pub struct MergePlanner {
    target_amount: f64,
    max_group_size: usize,
    search_budget: Option<u64>,
}

impl MergePlanner {
    pub fn new(target_amount: f64, max_group_size: usize) -> Result<Self, MergeError> {
        if !target_amount.is_finite() || target_amount <= 0.0 {
            return Err(MergeError::InvalidInput(format!(
                "target amount must be positive, got {target_amount}"
            )));
        }
        if max_group_size == 0 {
            return Err(MergeError::InvalidInput(
                "max orders per invoice must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            target_amount,
            max_group_size,
            search_budget: None,
        })
    }

    pub fn from_config(config: &MergeConfig) -> Result<Self, MergeError> {
        Ok(Self::new(config.target_amount, config.max_orders_per_invoice)?
            .with_search_budget(config.search_budget))
    }

    /// Cap the number of combinations evaluated per group size. `None` searches exhaustively.
    pub fn with_search_budget(mut self, budget: Option<u64>) -> Self {
        self.search_budget = budget.filter(|b| *b > 0);
        self
    }

    pub fn target_amount(&self) -> f64 {
        self.target_amount
    }

    pub fn max_group_size(&self) -> usize {
        self.max_group_size
    }

    /// Build a plan from catalog records. Ineligible records are ignored entirely, and a
    /// repeated order id counts only at its first occurrence.
    pub fn plan(&self, records: &[Record]) -> Plan {
        let mut seen: HashSet<&str> = HashSet::with_capacity(records.len());
        let mut duplicates = 0usize;
        let mut by_owner: BTreeMap<OwnerId, Vec<&Record>> = BTreeMap::new();
        for record in records {
            if !seen.insert(record.order_id.as_str()) {
                duplicates += 1;
                continue;
            }
            if record.eligible {
                by_owner.entry(record.org_id).or_default().push(record);
            }
        }
        if duplicates > 0 {
            warn!(duplicates, "Ignoring repeated order ids");
        }

        let mut owners: Vec<(OwnerId, f64)> = by_owner
            .iter()
            .map(|(org_id, pool)| (*org_id, pool.iter().map(|r| r.amount).sum()))
            .collect();
        owners.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut plan = Plan::default();
        for (org_id, org_total) in owners {
            let pool = by_owner.remove(&org_id).unwrap_or_default();
            let pool_len = pool.len();
            let (invoices, leftover) = self.plan_owner(org_id, pool);
            debug!(
                org_id,
                records = pool_len,
                org_total,
                invoices = invoices.len(),
                leftover = leftover.len(),
                "Planned owner group"
            );
            plan.invoices.extend(invoices);
            if !leftover.is_empty() {
                plan.leftover.insert(
                    org_id,
                    leftover.iter().map(|r| LeftoverEntry::from(*r)).collect(),
                );
            }
        }
        plan
    }

    /// Leftover records keep their catalog order.
    fn plan_owner<'a>(
        &self,
        org_id: OwnerId,
        pool: Vec<&'a Record>,
    ) -> (Vec<Invoice>, Vec<&'a Record>) {
        let mut invoices = Vec::new();
        let mut remaining: Vec<(usize, &'a Record)> = pool.into_iter().enumerate().collect();
        loop {
            let remaining_total: f64 = remaining.iter().map(|(_, r)| r.amount).sum();
            if remaining_total < self.target_amount {
                break;
            }

            // stable: equal amounts keep catalog order
            remaining.sort_by(|a, b| b.1.amount.total_cmp(&a.1.amount));
            let amounts: Vec<f64> = remaining.iter().map(|(_, r)| r.amount).collect();
            let Some(chosen) = self.best_combination(&amounts) else {
                break;
            };

            let selected: Vec<&Record> = chosen.iter().map(|&i| remaining[i].1).collect();
            invoices.push(Invoice::from_records(org_id, &selected));

            let mut next = Vec::with_capacity(remaining.len() - chosen.len());
            let mut chosen_iter = chosen.iter().peekable();
            for (i, record) in remaining.into_iter().enumerate() {
                if chosen_iter.peek() == Some(&&i) {
                    chosen_iter.next();
                } else {
                    next.push(record);
                }
            }
            remaining = next;
        }
        remaining.sort_by_key(|(position, _)| *position);
        (invoices, remaining.into_iter().map(|(_, r)| r).collect())
    }

    /// Indices (ascending) of the tightest combination reaching the target.
    /// `amounts` must be sorted descending.
    fn best_combination(&self, amounts: &[f64]) -> Option<Vec<usize>> {
        let n = amounts.len();
        let max_size = self.max_group_size.min(n);
        let mut best: Option<Vec<usize>> = None;
        let mut best_sum = f64::INFINITY;

        for size in MIN_GROUP_SIZE..=max_size {
            let largest: f64 = amounts[..size].iter().sum();
            if largest < self.target_amount {
                continue;
            }
            let smallest: f64 = amounts[n - size..].iter().sum();
            if smallest >= best_sum {
                continue;
            }

            let mut found_at_size = false;
            let mut evaluated = 0u64;
            let mut combos = Combinations::new(n, size);
            while let Some(indices) = combos.next_combination() {
                let sum: f64 = indices.iter().map(|&i| amounts[i]).sum();
                if sum >= self.target_amount && sum < best_sum {
                    best_sum = sum;
                    best = Some(indices.to_vec());
                    found_at_size = true;
                }
                evaluated += 1;
                if let Some(budget) = self.search_budget {
                    if evaluated >= budget {
                        warn!(
                            size,
                            pool = n,
                            budget,
                            "Combination search budget exhausted; keeping best found so far"
                        );
                        break;
                    }
                }
            }

            if found_at_size && best_sum < self.target_amount * TIGHT_FACTOR {
                break;
            }
        }
        best
    }
}

/// Plan with explicit parameters and no search budget.
pub fn plan(
    records: &[Record],
    target_amount: f64,
    max_group_size: usize,
) -> Result<Plan, MergeError> {
    Ok(MergePlanner::new(target_amount, max_group_size)?.plan(records))
}

/// Lexicographic k-combinations of `0..n`, yielded as index slices.
struct Combinations {
    n: usize,
    indices: Vec<usize>,
    started: bool,
}

impl Combinations {
    fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            indices: (0..k).collect(),
            started: false,
        }
    }

    fn next_combination(&mut self) -> Option<&[usize]> {
        let k = self.indices.len();
        if k == 0 || k > self.n {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(&self.indices);
        }
        let mut i = k;
        loop {
            if i == 0 {
                return None;
            }
            i -= 1;
            if self.indices[i] != i + self.n - k {
                break;
            }
        }
        self.indices[i] += 1;
        for j in i + 1..k {
            self.indices[j] = self.indices[j - 1] + 1;
        }
        Some(&self.indices)
    }
}
