//! # Usage Tracking
//!
//! How much of a source transaction has been consumed, and by whom.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Source A (confirmed, total 1,000.00)                                   │
//! │     ▲            ▲             ▲                                        │
//! │     │ 300.00     │ 500.00      │ 200.00                                 │
//! │     │            │             │                                        │
//! │   B confirmed  C cancelled   D draft                                    │
//! │                                                                         │
//! │  used      = 300.00 + 200.00        (C excluded)                        │
//! │  remaining = 1,000.00 - 500.00 = 500.00                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two shapes of input are supported:
//! - [`summarize_usage`] takes whole referencing transactions and produces
//!   the detailed [`UsageReport`] for one source.
//! - [`UsageTally`] takes flat [`UsageLine`]s (one scoped query for every
//!   source at once) and answers "used amount" per source for listings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{LedgerTransaction, TransactionStatus};

/// One referencing entry that consumes part of a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UsageDetail {
    pub transaction_id: String,
    pub group_number: String,
    pub description: String,
    pub amount: Money,
    #[ts(as = "String")]
    pub transaction_date: DateTime<Utc>,
    pub status: TransactionStatus,
}

/// The usage of one source transaction.
///
/// `used_amount + remaining_amount == total_amount` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    pub source_transaction: LedgerTransaction,
    pub total_amount: Money,
    pub used_amount: Money,
    pub remaining_amount: Money,
    /// Most recent first.
    pub usage_details: Vec<UsageDetail>,
}

impl UsageReport {
    /// What `transaction_id` itself draws from this source.
    pub fn drawn_by(&self, transaction_id: &str) -> Money {
        self.usage_details
            .iter()
            .filter(|d| d.transaction_id == transaction_id)
            .map(|d| d.amount)
            .sum()
    }

    /// The amount `transaction_id` could draw if its own current draws were
    /// released first.
    pub fn available_to(&self, transaction_id: &str) -> Money {
        self.remaining_amount + self.drawn_by(transaction_id)
    }

    pub fn group_number(&self) -> &str {
        &self.source_transaction.group_number
    }
}

/// Builds the usage report of `source` from the transactions that reference it.
///
/// Cancelled transactions and the source's own entries are skipped; anything
/// else referencing the source counts, draft or confirmed. A malformed
/// referencing entry is an error rather than a silent zero.
pub fn summarize_usage(
    source: LedgerTransaction,
    referencing: &[LedgerTransaction],
) -> CoreResult<UsageReport> {
    let mut usage_details = Vec::new();

    for transaction in referencing {
        if !transaction.status.counts_as_usage() || transaction.id == source.id {
            continue;
        }

        for (line, entry) in transaction.entries.iter().enumerate() {
            if !entry.draws_from(&source.id) {
                continue;
            }

            usage_details.push(UsageDetail {
                transaction_id: transaction.id.clone(),
                group_number: transaction.group_number.clone(),
                description: transaction.description.clone(),
                amount: transaction.entry_amount(line)?,
                transaction_date: transaction.transaction_date,
                status: transaction.status,
            });
        }
    }

    // Stable: entries of one transaction keep their line order.
    usage_details.sort_by(|a, b| b.transaction_date.cmp(&a.transaction_date));

    let total_amount = source.total_amount;
    let used_amount: Money = usage_details.iter().map(|d| d.amount).sum();

    Ok(UsageReport {
        source_transaction: source,
        total_amount,
        used_amount,
        remaining_amount: total_amount - used_amount,
        usage_details,
    })
}

// =============================================================================
// Bulk Tally
// =============================================================================

/// A referencing entry as returned by the bulk usage query: already scoped
/// and already stripped of cancelled transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageLine {
    pub source_transaction_id: String,
    pub transaction_id: String,
    pub line_no: usize,
    pub debit_amount: Money,
    pub credit_amount: Money,
}

/// Used amount per source id.
#[derive(Debug, Clone, Default)]
pub struct UsageTally {
    used: HashMap<String, Money>,
}

impl UsageTally {
    /// Groups lines by source, summing each line's single non-zero side.
    pub fn from_lines(lines: &[UsageLine]) -> CoreResult<Self> {
        let mut used: HashMap<String, Money> = HashMap::new();

        for line in lines {
            if line.transaction_id == line.source_transaction_id {
                continue;
            }

            let amount = line_amount(line)?;
            *used.entry(line.source_transaction_id.clone()).or_default() += amount;
        }

        Ok(UsageTally { used })
    }

    /// Total drawn from `source_id`; zero when nothing references it.
    pub fn used_by(&self, source_id: &str) -> Money {
        self.used.get(source_id).copied().unwrap_or_default()
    }
}

fn line_amount(line: &UsageLine) -> CoreResult<Money> {
    let entry = crate::types::LedgerEntry {
        account_id: String::new(),
        debit_amount: line.debit_amount,
        credit_amount: line.credit_amount,
        source_transaction_id: None,
        funding_path: Vec::new(),
    };

    entry.drawn_amount().map_err(|defect| CoreError::MalformedEntry {
        transaction_id: line.transaction_id.clone(),
        line: line.line_no,
        reason: defect.to_string(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funding::test_support::{source, spender};

    #[test]
    fn test_untouched_source_has_full_remaining() {
        let report = summarize_usage(source("A", 1000), &[]).unwrap();
        assert_eq!(report.used_amount, Money::zero());
        assert_eq!(report.remaining_amount, Money::from_units(1000));
        assert!(report.usage_details.is_empty());
    }

    #[test]
    fn test_cancelled_references_are_excluded() {
        let b = spender("B", "A", 300, TransactionStatus::Confirmed, 2);
        let c = spender("C", "A", 500, TransactionStatus::Cancelled, 3);
        let report = summarize_usage(source("A", 1000), &[b, c]).unwrap();

        assert_eq!(report.used_amount, Money::from_units(300));
        assert_eq!(report.remaining_amount, Money::from_units(700));
        assert_eq!(report.usage_details.len(), 1);
        assert_eq!(report.usage_details[0].transaction_id, "B");
    }

    #[test]
    fn test_drafts_count_and_details_are_newest_first() {
        let b = spender("B", "A", 300, TransactionStatus::Confirmed, 2);
        let d = spender("D", "A", 700, TransactionStatus::Draft, 9);
        let report = summarize_usage(source("A", 1000), &[b, d]).unwrap();

        assert_eq!(report.used_amount, Money::from_units(1000));
        assert_eq!(report.remaining_amount, Money::zero());
        let order: Vec<_> = report.usage_details.iter().map(|d| d.transaction_id.as_str()).collect();
        assert_eq!(order, vec!["D", "B"]);
    }

    #[test]
    fn test_conservation_holds_even_when_overdrawn() {
        let b = spender("B", "A", 800, TransactionStatus::Confirmed, 2);
        let d = spender("D", "A", 700, TransactionStatus::Draft, 3);
        let report = summarize_usage(source("A", 1000), &[b, d]).unwrap();

        assert_eq!(report.used_amount + report.remaining_amount, report.total_amount);
        assert!(report.remaining_amount.is_negative());
    }

    #[test]
    fn test_source_does_not_consume_itself() {
        let mut a = source("A", 1000);
        a.entries[0] = a.entries[0].clone().funded_by("A");
        let report = summarize_usage(a.clone(), &[a]).unwrap();
        assert_eq!(report.used_amount, Money::zero());
    }

    #[test]
    fn test_malformed_reference_is_surfaced() {
        let mut b = spender("B", "A", 300, TransactionStatus::Confirmed, 2);
        b.entries[0].credit_amount = Money::from_units(300);
        let err = summarize_usage(source("A", 1000), &[b]).unwrap_err();
        assert!(matches!(err, CoreError::MalformedEntry { .. }));
    }

    #[test]
    fn test_available_to_releases_own_draws() {
        let b = spender("B", "A", 300, TransactionStatus::Confirmed, 2);
        let d = spender("D", "A", 700, TransactionStatus::Draft, 3);
        let report = summarize_usage(source("A", 1000), &[b, d]).unwrap();

        assert_eq!(report.available_to("D"), Money::from_units(700));
        assert_eq!(report.available_to("X"), Money::zero());
    }

    #[test]
    fn test_tally_groups_by_source() {
        let line = |source: &str, tx: &str, debit: i64, credit: i64| UsageLine {
            source_transaction_id: source.into(),
            transaction_id: tx.into(),
            line_no: 0,
            debit_amount: Money::from_units(debit),
            credit_amount: Money::from_units(credit),
        };

        let tally = UsageTally::from_lines(&[
            line("A", "B", 300, 0),
            line("A", "D", 0, 200),
            line("E", "F", 50, 0),
            line("A", "A", 999, 0),
        ])
        .unwrap();

        assert_eq!(tally.used_by("A"), Money::from_units(500));
        assert_eq!(tally.used_by("E"), Money::from_units(50));
        assert_eq!(tally.used_by("Z"), Money::zero());

        assert!(UsageTally::from_lines(&[line("A", "B", 1, 1)]).is_err());
    }
}
