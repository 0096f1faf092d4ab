//! # Funding Assessment
//!
//! Read-only check of a transaction's funding references. Problems are
//! collected as [`FundingIssue`]s instead of failing the call, so one report
//! shows everything that is wrong.
//!
//! ## Checks
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  no entries                      → issue, nothing else checked          │
//! │  per entry                                                              │
//! │    malformed amounts             → issue                                │
//! │    source == self                → circular reference issue             │
//! │    source not found in scope     → issue                                │
//! │    source not confirmed          → issue                                │
//! │    amount > source available     → issue                                │
//! │    no source                     → recommendation                       │
//! │  per source                                                             │
//! │    several entries, sum > available → issue                             │
//! │  graph                                                                  │
//! │    source chain leads back here  → circular chain issue                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! "Available" is the source's remaining amount with this transaction's own
//! draws released, so a transaction that already fits is not flagged for
//! counting itself.

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use ts_rs::TS;

use crate::funding::graph::FundingGraph;
use crate::funding::usage::UsageReport;
use crate::money::Money;
use crate::types::{LedgerTransaction, TransactionStatus};

/// Message for a transaction without entries.
pub const NO_ENTRIES_MESSAGE: &str = "交易沒有分錄";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundingIssue {
    NoEntries,
    MalformedEntry {
        line: usize,
        reason: String,
    },
    SelfReference {
        line: usize,
        transaction_id: String,
    },
    SourceNotFound {
        line: usize,
        source_id: String,
    },
    SourceNotConfirmed {
        line: usize,
        group_number: String,
        status: TransactionStatus,
    },
    ExceedsAvailable {
        line: usize,
        group_number: String,
        amount: Money,
        available: Money,
    },
    CombinedExceedsAvailable {
        group_number: String,
        entries: usize,
        amount: Money,
        available: Money,
    },
    CircularChain {
        path: Vec<String>,
    },
}

impl fmt::Display for FundingIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FundingIssue::NoEntries => f.write_str(NO_ENTRIES_MESSAGE),
            FundingIssue::MalformedEntry { line, reason } => {
                write!(f, "Entry {}: {}", line, reason)
            }
            FundingIssue::SelfReference { line, transaction_id } => write!(
                f,
                "Entry {}: circular reference, transaction {} lists itself as its funding source",
                line, transaction_id
            ),
            FundingIssue::SourceNotFound { line, source_id } => {
                write!(f, "Entry {}: funding source {} not found", line, source_id)
            }
            FundingIssue::SourceNotConfirmed {
                line,
                group_number,
                status,
            } => write!(
                f,
                "Entry {}: funding source {} is {}, not confirmed",
                line, group_number, status
            ),
            FundingIssue::ExceedsAvailable {
                line,
                group_number,
                amount,
                available,
            } => write!(
                f,
                "Entry {}: amount {} exceeds the {} available in source {}",
                line, amount, available, group_number
            ),
            FundingIssue::CombinedExceedsAvailable {
                group_number,
                entries,
                amount,
                available,
            } => write!(
                f,
                "{} entries draw {} in total from source {}, which has {} available",
                entries, amount, group_number, available
            ),
            FundingIssue::CircularChain { path } => {
                write!(f, "circular reference through funding chain {}", path.join(" -> "))
            }
        }
    }
}

impl Serialize for FundingIssue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundingRecommendation {
    AssignSource { line: usize, account_id: String },
}

impl fmt::Display for FundingRecommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FundingRecommendation::AssignSource { line, account_id } => write!(
                f,
                "Entry {} (account {}) has no funding source; consider assigning one",
                line, account_id
            ),
        }
    }
}

impl Serialize for FundingRecommendation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub transaction_id: String,
    pub is_valid: bool,
    #[ts(as = "Vec<String>")]
    pub issues: Vec<FundingIssue>,
    #[ts(as = "Vec<String>")]
    pub recommendations: Vec<FundingRecommendation>,
}

/// Assesses `transaction` against the usage of the sources it references.
///
/// `sources` holds a usage report for every source that resolved within
/// scope; a referenced id missing from it is reported as not found.
///
/// ## Available Amount
/// Entries are checked against [`UsageReport::available_to`], not the raw
/// `remaining_amount` the usage tracker shows: the transaction's own draws
/// are added back, so a draft that exactly exhausts its source is still
/// valid. For a source with 1,000.00 of which this draft draws 700.00 and
/// nothing else draws, `remaining_amount` is 300.00 but the draft's entries
/// may draw up to 1,000.00 between them.
pub fn assess_funding(
    transaction: &LedgerTransaction,
    sources: &HashMap<String, UsageReport>,
    graph: &FundingGraph,
) -> ValidationReport {
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    if transaction.entries.is_empty() {
        issues.push(FundingIssue::NoEntries);
        return ValidationReport {
            transaction_id: transaction.id.clone(),
            is_valid: false,
            issues,
            recommendations,
        };
    }

    // source id -> (entries drawing from it, their combined amount)
    let mut per_source: BTreeMap<&str, (usize, Money)> = BTreeMap::new();

    for (line, entry) in transaction.entries.iter().enumerate() {
        if let Err(defect) = entry.drawn_amount() {
            issues.push(FundingIssue::MalformedEntry {
                line,
                reason: defect.to_string(),
            });
        }

        let Some(source_id) = entry.source_transaction_id.as_deref() else {
            if entry.gross_amount().is_positive() {
                recommendations.push(FundingRecommendation::AssignSource {
                    line,
                    account_id: entry.account_id.clone(),
                });
            }
            continue;
        };

        if source_id == transaction.id {
            issues.push(FundingIssue::SelfReference {
                line,
                transaction_id: transaction.id.clone(),
            });
        }

        let Some(usage) = sources.get(source_id) else {
            issues.push(FundingIssue::SourceNotFound {
                line,
                source_id: source_id.to_string(),
            });
            continue;
        };

        let source = &usage.source_transaction;
        if source.status != TransactionStatus::Confirmed {
            issues.push(FundingIssue::SourceNotConfirmed {
                line,
                group_number: source.group_number.clone(),
                status: source.status,
            });
        }

        let amount = entry.gross_amount();
        let available = usage.available_to(&transaction.id);
        if amount > available {
            issues.push(FundingIssue::ExceedsAvailable {
                line,
                group_number: source.group_number.clone(),
                amount,
                available,
            });
        }

        let slot = per_source.entry(source_id).or_insert((0, Money::zero()));
        slot.0 += 1;
        slot.1 += amount;
    }

    for (source_id, (entries, amount)) in per_source {
        if entries < 2 {
            continue;
        }
        if let Some(usage) = sources.get(source_id) {
            let available = usage.available_to(&transaction.id);
            if amount > available {
                issues.push(FundingIssue::CombinedExceedsAvailable {
                    group_number: usage.group_number().to_string(),
                    entries,
                    amount,
                    available,
                });
            }
        }
    }

    if let Some(path) = graph.cycle_through(&transaction.id) {
        issues.push(FundingIssue::CircularChain { path });
    }

    ValidationReport {
        transaction_id: transaction.id.clone(),
        is_valid: issues.is_empty(),
        issues,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funding::test_support::{draft, source, spender};
    use crate::funding::usage::summarize_usage;

    fn usage_map(reports: Vec<UsageReport>) -> HashMap<String, UsageReport> {
        reports
            .into_iter()
            .map(|r| (r.source_transaction.id.clone(), r))
            .collect()
    }

    #[test]
    fn test_empty_transaction_has_single_issue() {
        let mut tx = draft("D", 100);
        tx.entries.clear();

        let report = assess_funding(&tx, &HashMap::new(), &FundingGraph::new());
        assert!(!report.is_valid);
        assert_eq!(report.issues, vec![FundingIssue::NoEntries]);
        assert_eq!(report.issues[0].to_string(), "交易沒有分錄");
    }

    #[test]
    fn test_self_reference_is_circular() {
        let mut tx = draft("D", 100);
        tx.entries[0] = tx.entries[0].clone().funded_by("D");
        let sources = usage_map(vec![summarize_usage(tx.clone(), &[tx.clone()]).unwrap()]);

        let report = assess_funding(&tx, &sources, &FundingGraph::new());
        assert!(!report.is_valid);
        assert!(report
            .issues
            .iter()
            .any(|issue| issue.to_string().contains("circular reference")));
    }

    #[test]
    fn test_fitting_allocation_is_valid() {
        let mut tx = draft("D", 700);
        tx.entries[0] = tx.entries[0].clone().funded_by("A");
        let b = spender("B", "A", 300, TransactionStatus::Confirmed, 2);
        let sources = usage_map(vec![summarize_usage(source("A", 1000), &[b, tx.clone()]).unwrap()]);

        let report = assess_funding(&tx, &sources, &FundingGraph::new());
        assert!(report.is_valid, "unexpected issues: {:?}", report.issues);
        assert_eq!(report.recommendations.len(), 1);
    }

    #[test]
    fn test_own_draws_are_released_before_comparing() {
        let mut tx = draft("D", 1000);
        tx.entries[0] = tx.entries[0].clone().funded_by("A");
        let usage = summarize_usage(source("A", 1000), &[tx.clone()]).unwrap();
        assert_eq!(usage.remaining_amount, Money::zero());

        let report = assess_funding(&tx, &usage_map(vec![usage]), &FundingGraph::new());
        assert!(report.is_valid, "unexpected issues: {:?}", report.issues);
    }

    #[test]
    fn test_overdrawn_and_unconfirmed_sources_are_flagged() {
        let mut tx = draft("D", 800);
        tx.entries[0] = tx.entries[0].clone().funded_by("A");
        let b = spender("B", "A", 300, TransactionStatus::Confirmed, 2);
        let mut a = source("A", 1000);
        a.status = TransactionStatus::Draft;
        let sources = usage_map(vec![summarize_usage(a, &[b, tx.clone()]).unwrap()]);

        let report = assess_funding(&tx, &sources, &FundingGraph::new());
        assert!(!report.is_valid);
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, FundingIssue::SourceNotConfirmed { line: 0, .. })));
        assert!(report.issues.iter().any(|i| matches!(
            i,
            FundingIssue::ExceedsAvailable { amount, available, .. }
                if *amount == Money::from_units(800) && *available == Money::from_units(700)
        )));
    }

    #[test]
    fn test_combined_draws_are_checked() {
        let mut tx = draft("D", 400);
        tx.entries[0] = tx.entries[0].clone().funded_by("A");
        tx.entries[1] = tx.entries[1].clone().funded_by("A");
        let sources = usage_map(vec![summarize_usage(source("A", 500), &[tx.clone()]).unwrap()]);

        let report = assess_funding(&tx, &sources, &FundingGraph::new());
        assert_eq!(
            report.issues,
            vec![FundingIssue::CombinedExceedsAvailable {
                group_number: "20260101001".into(),
                entries: 2,
                amount: Money::from_units(800),
                available: Money::from_units(500),
            }]
        );
    }

    #[test]
    fn test_missing_source_and_cycle() {
        let mut tx = draft("D", 100);
        tx.entries[0] = tx.entries[0].clone().funded_by("ghost");
        let graph = FundingGraph::from_edges([("D", "C"), ("C", "D")]);

        let report = assess_funding(&tx, &HashMap::new(), &graph);
        assert!(report.issues.contains(&FundingIssue::SourceNotFound {
            line: 0,
            source_id: "ghost".into()
        }));
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, FundingIssue::CircularChain { .. })));
    }

    #[test]
    fn test_issues_serialize_as_messages() {
        let report = ValidationReport {
            transaction_id: "D".into(),
            is_valid: false,
            issues: vec![FundingIssue::NoEntries],
            recommendations: vec![],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["issues"][0], "交易沒有分錄");
        assert_eq!(json["isValid"], false);
    }
}
