//! # Funding
//!
//! Pure funding logic: given transactions already loaded from storage,
//! compute usage, rank sources, plan allocations, analyze flow and assess
//! a transaction's references. Nothing here touches a database.
//!
//! ## How the pieces relate
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   usage      UsageReport / UsageTally  ◄── used by every other module  │
//! │     │                                                                   │
//! │     ├──► sources     rank_funding_sources   (Funding Source Finder)    │
//! │     ├──► flow        analyze_flow           (Flow Analyzer)            │
//! │     ├──► allocation  AllocationPlanner      (Allocation Writer)        │
//! │     └──► assessment  assess_funding         (Allocation Validator)     │
//! │                                                                         │
//! │   graph      FundingGraph  ◄── cycle checks for allocation/assessment  │
//! │   chain      trace_chain   ◄── provenance walk                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod allocation;
pub mod assessment;
pub mod chain;
pub mod flow;
pub mod graph;
pub mod sources;
pub mod usage;

pub use allocation::{ensure_allocatable, AllocationOutcome, AllocationPlanner, AllocationRecord, AllocationRequest};
pub use assessment::{assess_funding, FundingIssue, FundingRecommendation, ValidationReport, NO_ENTRIES_MESSAGE};
pub use chain::{trace_chain, FundingChain, FundingLink};
pub use flow::{analyze_flow, FlowAnalysis, FlowDetail};
pub use graph::FundingGraph;
pub use sources::{rank_funding_sources, FundingSource};
pub use usage::{summarize_usage, UsageDetail, UsageLine, UsageReport, UsageTally};

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{TimeZone, Utc};

    use crate::money::Money;
    use crate::types::{LedgerEntry, LedgerTransaction, TransactionStatus};

    fn transaction(id: &str, units: i64, status: TransactionStatus, day: u32) -> LedgerTransaction {
        let amount = Money::from_units(units);
        LedgerTransaction {
            id: id.into(),
            group_number: format!("202601{:02}001", day),
            description: format!("transaction {}", id),
            transaction_date: Utc.with_ymd_and_hms(2026, 1, day, 9, 0, 0).unwrap(),
            status,
            total_amount: amount,
            created_by: "owner-1".into(),
            organization_id: None,
            entries: vec![
                LedgerEntry::debit("acct-cash", amount),
                LedgerEntry::credit("acct-capital", amount),
            ],
            version: 0,
        }
    }

    /// A confirmed source dated 2026-01-01.
    pub fn source(id: &str, units: i64) -> LedgerTransaction {
        transaction(id, units, TransactionStatus::Confirmed, 1)
    }

    /// A transaction whose first entry draws `units` from `source_id`.
    pub fn spender(
        id: &str,
        source_id: &str,
        units: i64,
        status: TransactionStatus,
        day: u32,
    ) -> LedgerTransaction {
        let mut tx = transaction(id, units, status, day);
        tx.entries[0] = tx.entries[0].clone().funded_by(source_id);
        tx
    }

    /// An unfunded draft dated 2026-01-10.
    pub fn draft(id: &str, units: i64) -> LedgerTransaction {
        transaction(id, units, TransactionStatus::Draft, 10)
    }
}
