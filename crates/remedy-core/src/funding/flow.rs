//! # Flow Analysis
//!
//! Totals and utilization across every confirmed source in scope.
//!
//! ```text
//!   utilization = used / total × 100      (0 when total is 0)
//!
//!   A  1,000.00 used   300.00   30.00%
//!   E    500.00 used   500.00  100.00%   ← sorted first
//!   ───────────────────────────────────
//!      1,500.00 used   800.00   53.33%
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::funding::usage::UsageTally;
use crate::money::Money;
use crate::types::{LedgerTransaction, Percentage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FlowDetail {
    pub transaction_id: String,
    pub group_number: String,
    pub description: String,
    #[ts(as = "String")]
    pub transaction_date: DateTime<Utc>,
    pub total_amount: Money,
    pub used_amount: Money,
    pub available_amount: Money,
    /// Percent, two decimals.
    pub utilization_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FlowAnalysis {
    pub total_funding_amount: Money,
    pub total_used_amount: Money,
    pub total_available_amount: Money,
    pub utilization_rate: f64,
    pub transaction_count: usize,
    /// Highest utilization first.
    pub flow_details: Vec<FlowDetail>,
}

impl FlowAnalysis {
    pub fn empty() -> Self {
        FlowAnalysis {
            total_funding_amount: Money::zero(),
            total_used_amount: Money::zero(),
            total_available_amount: Money::zero(),
            utilization_rate: 0.0,
            transaction_count: 0,
            flow_details: Vec::new(),
        }
    }
}

pub fn analyze_flow(candidates: &[LedgerTransaction], tally: &UsageTally) -> FlowAnalysis {
    let mut rated: Vec<(Percentage, FlowDetail)> = candidates
        .iter()
        .map(|candidate| {
            let used_amount = tally.used_by(&candidate.id);
            let rate = Percentage::from_ratio(used_amount, candidate.total_amount);
            let detail = FlowDetail {
                transaction_id: candidate.id.clone(),
                group_number: candidate.group_number.clone(),
                description: candidate.description.clone(),
                transaction_date: candidate.transaction_date,
                total_amount: candidate.total_amount,
                used_amount,
                available_amount: candidate.total_amount - used_amount,
                utilization_rate: rate.as_f64(),
            };
            (rate, detail)
        })
        .collect();

    rated.sort_by(|(a, _), (b, _)| b.cmp(a));

    let total_funding_amount: Money = rated.iter().map(|(_, d)| d.total_amount).sum();
    let total_used_amount: Money = rated.iter().map(|(_, d)| d.used_amount).sum();

    FlowAnalysis {
        total_funding_amount,
        total_used_amount,
        total_available_amount: total_funding_amount - total_used_amount,
        utilization_rate: Percentage::from_ratio(total_used_amount, total_funding_amount).as_f64(),
        transaction_count: rated.len(),
        flow_details: rated.into_iter().map(|(_, d)| d).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funding::test_support::source;
    use crate::funding::usage::UsageLine;

    fn line(source: &str, tx: &str, units: i64) -> UsageLine {
        UsageLine {
            source_transaction_id: source.into(),
            transaction_id: tx.into(),
            line_no: 0,
            debit_amount: Money::from_units(units),
            credit_amount: Money::zero(),
        }
    }

    #[test]
    fn test_totals_and_ordering() {
        let candidates = vec![source("A", 1000), source("E", 500)];
        let tally = UsageTally::from_lines(&[line("A", "B", 300), line("E", "F", 500)]).unwrap();

        let analysis = analyze_flow(&candidates, &tally);
        assert_eq!(analysis.total_funding_amount, Money::from_units(1500));
        assert_eq!(analysis.total_used_amount, Money::from_units(800));
        assert_eq!(analysis.total_available_amount, Money::from_units(700));
        assert_eq!(analysis.utilization_rate, 53.33);
        assert_eq!(analysis.transaction_count, 2);

        assert_eq!(analysis.flow_details[0].transaction_id, "E");
        assert_eq!(analysis.flow_details[0].utilization_rate, 100.0);
        assert_eq!(analysis.flow_details[1].utilization_rate, 30.0);
    }

    #[test]
    fn test_zero_total_source_has_zero_rate() {
        let analysis = analyze_flow(&[source("Z", 0)], &UsageTally::default());
        assert_eq!(analysis.flow_details[0].utilization_rate, 0.0);
        assert_eq!(analysis.utilization_rate, 0.0);
    }

    #[test]
    fn test_no_sources() {
        let analysis = analyze_flow(&[], &UsageTally::default());
        assert_eq!(analysis, FlowAnalysis::empty());
    }
}
