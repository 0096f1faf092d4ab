//! # Allocation Planning
//!
//! Applies a batch of allocation requests to a draft transaction in memory.
//! Storage (reading usage, claiming the draft, writing entries back) is the
//! caller's job; everything decided here is pure.
//!
//! ## Per Request
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. amount > 0                                                          │
//! │  2. source != target                       else SelfFunding             │
//! │  3. entry index in range (default 0)       else EntryIndexOutOfRange    │
//! │  4. amount <= available                    else InsufficientFunds       │
//! │        available = source remaining                                     │
//! │                  + what the re-pointed entry already drew from it       │
//! │                  - what earlier requests in this batch took from it     │
//! │  5. source does not (transitively) draw                                 │
//! │     from the target                        else CircularFunding         │
//! │  6. entry.source = source, source appended to the funding path          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The first failing request aborts the whole batch; the caller discards the
//! modified transaction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::funding::graph::FundingGraph;
use crate::funding::usage::UsageReport;
use crate::money::Money;
use crate::types::LedgerTransaction;
use crate::validation::validate_allocation_amount;

/// "Draw `amount` from `source_transaction_id` on entry `entry_index`."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AllocationRequest {
    pub source_transaction_id: String,
    pub amount: Money,
    /// Entry of the target to re-point; the first entry when omitted.
    #[serde(default)]
    #[ts(optional)]
    pub entry_index: Option<usize>,
}

impl AllocationRequest {
    pub fn new(source_transaction_id: impl Into<String>, amount: Money) -> Self {
        AllocationRequest {
            source_transaction_id: source_transaction_id.into(),
            amount,
            entry_index: None,
        }
    }

    pub fn on_entry(mut self, entry_index: usize) -> Self {
        self.entry_index = Some(entry_index);
        self
    }
}

/// One applied request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AllocationRecord {
    pub source_transaction_id: String,
    pub amount: Money,
    pub source_description: String,
    /// What the source has left after this request.
    pub remaining_amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AllocationOutcome {
    pub success: bool,
    pub transaction_id: String,
    pub allocations: Vec<AllocationRecord>,
}

/// Fails unless `target` is a draft.
pub fn ensure_allocatable(target: &LedgerTransaction) -> CoreResult<()> {
    if target.status.is_mutable() {
        Ok(())
    } else {
        Err(CoreError::ImmutableTransaction {
            id: target.id.clone(),
            status: target.status,
        })
    }
}

/// Accumulates a batch of allocations against one draft.
///
/// ## Example
/// ```rust,ignore
/// let mut planner = AllocationPlanner::new(&mut draft)?;
/// for request in &requests {
///     let usage = usage_of(&request.source_transaction_id)?;
///     planner.apply(request, &usage, &graph)?;
/// }
/// let outcome = planner.finish();
/// ```
#[derive(Debug)]
pub struct AllocationPlanner<'a> {
    target: &'a mut LedgerTransaction,
    /// Per entry, the source it drew from before this batch and how much.
    stored_draws: Vec<(Option<String>, Money)>,
    taken: HashMap<String, Money>,
    records: Vec<AllocationRecord>,
}

impl<'a> AllocationPlanner<'a> {
    pub fn new(target: &'a mut LedgerTransaction) -> CoreResult<Self> {
        ensure_allocatable(target)?;
        let stored_draws = target
            .entries
            .iter()
            .map(|e| (e.source_transaction_id.clone(), e.gross_amount()))
            .collect();
        Ok(AllocationPlanner {
            target,
            stored_draws,
            taken: HashMap::new(),
            records: Vec::new(),
        })
    }

    /// Applies one request. `usage` must be the source's usage as currently
    /// stored, which still includes the target's previous draws.
    pub fn apply(
        &mut self,
        request: &AllocationRequest,
        usage: &UsageReport,
        graph: &FundingGraph,
    ) -> CoreResult<AllocationRecord> {
        validate_allocation_amount(request.amount)?;

        let source_id = request.source_transaction_id.as_str();
        if source_id == self.target.id {
            return Err(CoreError::SelfFunding {
                id: self.target.id.clone(),
            });
        }

        let index = request.entry_index.unwrap_or(0);
        let (stored_source, stored_amount) =
            self.stored_draws
                .get(index)
                .ok_or_else(|| CoreError::EntryIndexOutOfRange {
                    transaction_id: self.target.id.clone(),
                    index,
                    entries: self.target.entries.len(),
                })?;

        let released = if stored_source.as_deref() == Some(source_id) {
            *stored_amount
        } else {
            Money::zero()
        };
        let taken = self.taken.get(source_id).copied().unwrap_or_default();
        let available = usage.remaining_amount + released - taken;

        if request.amount > available {
            return Err(CoreError::InsufficientFunds {
                source_id: source_id.to_string(),
                group_number: usage.group_number().to_string(),
                requested: request.amount,
                available: available.max(Money::zero()),
            });
        }

        if let Some(path) = graph.cycle_if_linked(&self.target.id, source_id) {
            return Err(CoreError::CircularFunding { path });
        }

        let entry = &mut self.target.entries[index];
        entry.source_transaction_id = Some(source_id.to_string());
        if !entry.funding_path.iter().any(|id| id == source_id) {
            entry.funding_path.push(source_id.to_string());
        }

        *self.taken.entry(source_id.to_string()).or_default() += request.amount;

        let record = AllocationRecord {
            source_transaction_id: source_id.to_string(),
            amount: request.amount,
            source_description: usage.source_transaction.description.clone(),
            remaining_amount: available - request.amount,
        };
        self.records.push(record.clone());
        Ok(record)
    }

    pub fn finish(self) -> AllocationOutcome {
        AllocationOutcome {
            success: true,
            transaction_id: self.target.id.clone(),
            allocations: self.records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funding::test_support::{draft, source, spender};
    use crate::funding::usage::summarize_usage;
    use crate::types::TransactionStatus;

    fn usage_of(id: &str, total: i64, spenders: &[LedgerTransaction]) -> UsageReport {
        summarize_usage(source(id, total), spenders).unwrap()
    }

    #[test]
    fn test_allocation_sets_source_and_path() {
        let mut target = draft("D", 700);
        let usage = usage_of("A", 1000, &[spender("B", "A", 300, TransactionStatus::Confirmed, 2)]);

        let mut planner = AllocationPlanner::new(&mut target).unwrap();
        let record = planner
            .apply(&AllocationRequest::new("A", Money::from_units(700)), &usage, &FundingGraph::new())
            .unwrap();
        assert_eq!(record.remaining_amount, Money::zero());

        let outcome = planner.finish();
        assert!(outcome.success);
        assert_eq!(outcome.allocations.len(), 1);
        assert_eq!(target.entries[0].source_transaction_id.as_deref(), Some("A"));
        assert_eq!(target.entries[0].funding_path, vec!["A".to_string()]);
    }

    #[test]
    fn test_over_allocation_reports_available() {
        let mut target = draft("D", 800);
        let usage = usage_of("A", 1000, &[spender("B", "A", 300, TransactionStatus::Confirmed, 2)]);

        let mut planner = AllocationPlanner::new(&mut target).unwrap();
        let err = planner
            .apply(&AllocationRequest::new("A", Money::from_units(800)), &usage, &FundingGraph::new())
            .unwrap_err();

        match err {
            CoreError::InsufficientFunds { requested, available, .. } => {
                assert_eq!(requested, Money::from_units(800));
                assert_eq!(available, Money::from_units(700));
            }
            other => panic!("expected InsufficientFunds, got {:?}", other),
        }
    }

    #[test]
    fn test_batch_requests_share_one_source() {
        let mut target = draft("D", 600);
        let usage = usage_of("A", 1000, &[]);
        let graph = FundingGraph::new();

        let mut planner = AllocationPlanner::new(&mut target).unwrap();
        planner
            .apply(&AllocationRequest::new("A", Money::from_units(600)), &usage, &graph)
            .unwrap();
        let err = planner
            .apply(&AllocationRequest::new("A", Money::from_units(600)).on_entry(1), &usage, &graph)
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientFunds { .. }));
    }

    #[test]
    fn test_reallocating_same_source_releases_previous_draw() {
        let mut target = draft("D", 700);
        target.entries[0] = target.entries[0].clone().funded_by("A");
        // The stored draft already draws 700.00 from A.
        let usage = usage_of("A", 1000, &[target.clone()]);
        assert_eq!(usage.remaining_amount, Money::from_units(300));

        let mut planner = AllocationPlanner::new(&mut target).unwrap();
        let record = planner
            .apply(&AllocationRequest::new("A", Money::from_units(1000)), &usage, &FundingGraph::new())
            .unwrap();
        assert_eq!(record.remaining_amount, Money::zero());
        drop(planner);
        assert_eq!(target.entries[0].funding_path, vec!["A".to_string()]);
    }

    #[test]
    fn test_confirmed_target_is_immutable() {
        let mut target = draft("D", 100);
        target.status = TransactionStatus::Confirmed;
        assert!(matches!(
            AllocationPlanner::new(&mut target),
            Err(CoreError::ImmutableTransaction { .. })
        ));
    }

    #[test]
    fn test_self_funding_and_bad_index() {
        let mut target = draft("D", 100);
        let own_usage = usage_of("D", 100, &[]);
        let other_usage = usage_of("A", 1000, &[]);
        let graph = FundingGraph::new();

        let mut planner = AllocationPlanner::new(&mut target).unwrap();
        assert!(matches!(
            planner.apply(&AllocationRequest::new("D", Money::from_units(1)), &own_usage, &graph),
            Err(CoreError::SelfFunding { .. })
        ));
        assert!(matches!(
            planner.apply(&AllocationRequest::new("A", Money::from_units(1)).on_entry(5), &other_usage, &graph),
            Err(CoreError::EntryIndexOutOfRange { index: 5, entries: 2, .. })
        ));
        assert!(matches!(
            planner.apply(&AllocationRequest::new("A", Money::zero()), &other_usage, &graph),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_multi_hop_cycle_is_rejected() {
        // A draws from C, C draws from B; B's draft now asks to draw from A.
        let graph = FundingGraph::from_edges([("A", "C"), ("C", "B")]);
        let mut target = draft("B", 100);
        let usage = usage_of("A", 1000, &[]);

        let mut planner = AllocationPlanner::new(&mut target).unwrap();
        let err = planner
            .apply(&AllocationRequest::new("A", Money::from_units(100)), &usage, &graph)
            .unwrap_err();
        match err {
            CoreError::CircularFunding { path } => assert_eq!(path, vec!["B", "A", "C", "B"]),
            other => panic!("expected CircularFunding, got {:?}", other),
        }
    }
}
