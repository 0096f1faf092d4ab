//! Upstream funding chain of one transaction, breadth-first.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use ts_rs::TS;

use crate::funding::graph::FundingGraph;
use crate::money::Money;
use crate::types::LedgerTransaction;

/// "`transaction_id` draws `amount` from `source_transaction_id`."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FundingLink {
    pub transaction_id: String,
    pub source_transaction_id: String,
    /// `None` when the source is not visible in scope.
    #[ts(optional)]
    pub source_group_number: Option<String>,
    pub amount: Money,
    /// 1 for the root's own sources.
    pub depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FundingChain {
    pub root_transaction_id: String,
    pub links: Vec<FundingLink>,
    pub has_cycle: bool,
}

/// Walks sources upward from `root_id` through `transactions`.
///
/// Each transaction is expanded once, so a cycle terminates the walk;
/// `has_cycle` reports whether one was met. One link is produced per funded
/// entry, in entry order. Cancelled transactions draw nothing: they add no
/// links and no edges, the same rule [`FundingGraph`] applies.
pub fn trace_chain(root_id: &str, transactions: &HashMap<String, LedgerTransaction>) -> FundingChain {
    let mut links = Vec::new();
    let mut expanded: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<(&str, usize)> = VecDeque::from([(root_id, 0)]);

    while let Some((id, depth)) = queue.pop_front() {
        if !expanded.insert(id) {
            continue;
        }
        let Some(transaction) = transactions.get(id) else {
            continue;
        };
        if !transaction.status.counts_as_usage() {
            continue;
        }

        for entry in &transaction.entries {
            let Some(source_id) = entry.source_transaction_id.as_deref() else {
                continue;
            };

            links.push(FundingLink {
                transaction_id: transaction.id.clone(),
                source_transaction_id: source_id.to_string(),
                source_group_number: transactions.get(source_id).map(|s| s.group_number.clone()),
                amount: entry.gross_amount(),
                depth: depth + 1,
            });
            queue.push_back((source_id, depth + 1));
        }
    }

    let graph = FundingGraph::from_transactions(transactions.values());
    let self_funded = transactions
        .get(root_id)
        .is_some_and(|root| root.status.counts_as_usage() && root.source_ids().contains(root_id));

    FundingChain {
        root_transaction_id: root_id.to_string(),
        links,
        has_cycle: self_funded || graph.has_cycle_from(root_id),
    }
}
