//! Available funding sources: confirmed transactions with money left,
//! largest availability first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ts_rs::TS;

use crate::funding::usage::UsageTally;
use crate::money::Money;
use crate::types::{Account, LedgerTransaction};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FundingSource {
    pub transaction_id: String,
    pub group_number: String,
    pub description: String,
    #[ts(as = "String")]
    pub transaction_date: DateTime<Utc>,
    pub total_amount: Money,
    pub used_amount: Money,
    pub available_amount: Money,
    /// Primary (first entry) account, when it resolves.
    #[ts(optional)]
    pub account_id: Option<String>,
    #[ts(optional)]
    pub account_name: Option<String>,
    #[ts(optional)]
    pub account_code: Option<String>,
}

/// Ranks `candidates` by available amount, dropping the exhausted ones.
///
/// `candidates` should already be confirmed and scoped; ties keep the
/// candidates' order.
pub fn rank_funding_sources(
    candidates: &[LedgerTransaction],
    accounts: &HashMap<String, Account>,
    tally: &UsageTally,
) -> Vec<FundingSource> {
    let mut sources: Vec<FundingSource> = candidates
        .iter()
        .filter_map(|candidate| {
            let used_amount = tally.used_by(&candidate.id);
            let available_amount = candidate.total_amount - used_amount;
            if !available_amount.is_positive() {
                return None;
            }

            let account = candidate
                .primary_account_id()
                .and_then(|id| accounts.get(id));

            Some(FundingSource {
                transaction_id: candidate.id.clone(),
                group_number: candidate.group_number.clone(),
                description: candidate.description.clone(),
                transaction_date: candidate.transaction_date,
                total_amount: candidate.total_amount,
                used_amount,
                available_amount,
                account_id: candidate.primary_account_id().map(str::to_string),
                account_name: account.map(|a| a.name.clone()),
                account_code: account.map(|a| a.code.clone()),
            })
        })
        .collect();

    sources.sort_by(|a, b| b.available_amount.cmp(&a.available_amount));
    sources
}
