//! # Domain Types
//!
//! Ledger transactions, their entries, accounts and the caller scope.
//!
//! ## Transaction Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Draft ──────── allocate sources (sourceTransactionId, fundingPath)   │
//! │     │                                                                   │
//! │     │ confirm (balanced, well-formed)                                  │
//! │     ▼                                                                   │
//! │   Confirmed ──── funding references frozen, can act as a source        │
//! │     │                                                                   │
//! │     │ cancel                                                            │
//! │     ▼                                                                   │
//! │   Cancelled ──── excluded from every usage calculation                 │
//! │                  (frees whatever it had consumed)                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

// =============================================================================
// Transaction Status
// =============================================================================

/// The status of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Being prepared; funding references may still change.
    #[default]
    Draft,
    /// Posted; funding references are frozen.
    Confirmed,
    /// Voided; consumes nothing.
    Cancelled,
}

impl TransactionStatus {
    /// Only drafts may have their funding allocation modified.
    pub fn is_mutable(&self) -> bool {
        matches!(self, TransactionStatus::Draft)
    }

    /// Cancelled transactions are invisible to usage calculations.
    pub fn counts_as_usage(&self) -> bool {
        !matches!(self, TransactionStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Draft => "draft",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Caller Scope
// =============================================================================

/// Who is asking: the owning user and, optionally, the organization.
///
/// Passed explicitly to every funding operation; nothing reads the scope
/// from ambient state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FundingScope {
    pub owner_id: String,
    pub organization_id: Option<String>,
}

impl FundingScope {
    pub fn new(owner_id: impl Into<String>) -> Self {
        FundingScope {
            owner_id: owner_id.into(),
            organization_id: None,
        }
    }

    /// Narrows the scope to one organization.
    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    /// Returns true if the transaction is visible within this scope.
    pub fn covers(&self, transaction: &LedgerTransaction) -> bool {
        if transaction.created_by != self.owner_id {
            return false;
        }
        match &self.organization_id {
            Some(org) => transaction.organization_id.as_deref() == Some(org.as_str()),
            None => true,
        }
    }
}

// =============================================================================
// Date Range
// =============================================================================

/// Inclusive `[start, end]` bound on `transaction_date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    #[ts(as = "String")]
    pub start: DateTime<Utc>,
    #[ts(as = "String")]
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        DateRange { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

// =============================================================================
// Ledger Entry
// =============================================================================

/// Why an entry is not a single-sided double-entry line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryDefect {
    BothZero,
    BothSides,
    NegativeAmount,
}

impl fmt::Display for EntryDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryDefect::BothZero => write!(f, "debit and credit are both zero"),
            EntryDefect::BothSides => write!(f, "debit and credit are both non-zero"),
            EntryDefect::NegativeAmount => write!(f, "negative debit or credit"),
        }
    }
}

/// One line of a ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub account_id: String,
    pub debit_amount: Money,
    pub credit_amount: Money,
    /// The transaction this line draws its money from.
    pub source_transaction_id: Option<String>,
    /// Provenance chain of source ids, oldest first.
    #[serde(default)]
    pub funding_path: Vec<String>,
}

impl LedgerEntry {
    /// A debit line with no funding source.
    pub fn debit(account_id: impl Into<String>, amount: Money) -> Self {
        LedgerEntry {
            account_id: account_id.into(),
            debit_amount: amount,
            credit_amount: Money::zero(),
            source_transaction_id: None,
            funding_path: Vec::new(),
        }
    }

    /// A credit line with no funding source.
    pub fn credit(account_id: impl Into<String>, amount: Money) -> Self {
        LedgerEntry {
            account_id: account_id.into(),
            debit_amount: Money::zero(),
            credit_amount: amount,
            source_transaction_id: None,
            funding_path: Vec::new(),
        }
    }

    /// Sets the funding source (and records it in the path).
    pub fn funded_by(mut self, source_id: impl Into<String>) -> Self {
        let source_id = source_id.into();
        if !self.funding_path.contains(&source_id) {
            self.funding_path.push(source_id.clone());
        }
        self.source_transaction_id = Some(source_id);
        self
    }

    /// The single non-zero side of the line.
    ///
    /// ```rust
    /// use remedy_core::{LedgerEntry, Money};
    ///
    /// let line = LedgerEntry::credit("cash", Money::from_units(300));
    /// assert_eq!(line.drawn_amount().unwrap(), Money::from_units(300));
    /// ```
    pub fn drawn_amount(&self) -> Result<Money, EntryDefect> {
        let (debit, credit) = (self.debit_amount, self.credit_amount);
        if debit.is_negative() || credit.is_negative() {
            return Err(EntryDefect::NegativeAmount);
        }
        match (debit.is_zero(), credit.is_zero()) {
            (false, true) => Ok(debit),
            (true, false) => Ok(credit),
            (true, true) => Err(EntryDefect::BothZero),
            (false, false) => Err(EntryDefect::BothSides),
        }
    }

    /// Debit plus credit, without any well-formedness check.
    pub fn gross_amount(&self) -> Money {
        self.debit_amount + self.credit_amount
    }

    pub fn draws_from(&self, source_id: &str) -> bool {
        self.source_transaction_id.as_deref() == Some(source_id)
    }
}

// =============================================================================
// Ledger Transaction
// =============================================================================

/// A ledger event made of balanced entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTransaction {
    pub id: String,
    /// Human-readable sequence, `YYYYMMDD` + 3 digits.
    pub group_number: String,
    pub description: String,
    #[ts(as = "String")]
    pub transaction_date: DateTime<Utc>,
    pub status: TransactionStatus,
    /// Sum of the debit entries.
    pub total_amount: Money,
    /// Owner (user id).
    pub created_by: String,
    pub organization_id: Option<String>,
    pub entries: Vec<LedgerEntry>,
    /// Optimistic concurrency counter, bumped on every write.
    pub version: i64,
}

impl LedgerTransaction {
    pub fn debit_total(&self) -> Money {
        self.entries.iter().map(|e| e.debit_amount).sum()
    }

    pub fn credit_total(&self) -> Money {
        self.entries.iter().map(|e| e.credit_amount).sum()
    }

    pub fn is_balanced(&self) -> bool {
        self.debit_total() == self.credit_total()
    }

    /// The drawn amount of entry `line`, with the defect mapped to a
    /// `MalformedEntry` error that names this transaction.
    pub fn entry_amount(&self, line: usize) -> CoreResult<Money> {
        let entry = self
            .entries
            .get(line)
            .ok_or_else(|| CoreError::EntryIndexOutOfRange {
                transaction_id: self.id.clone(),
                index: line,
                entries: self.entries.len(),
            })?;

        entry.drawn_amount().map_err(|defect| CoreError::MalformedEntry {
            transaction_id: self.id.clone(),
            line,
            reason: defect.to_string(),
        })
    }

    /// Distinct funding sources referenced by this transaction's entries.
    pub fn source_ids(&self) -> BTreeSet<&str> {
        self.entries
            .iter()
            .filter_map(|e| e.source_transaction_id.as_deref())
            .collect()
    }

    /// Id of the first entry's account, the "primary" account of the
    /// transaction in funding listings.
    pub fn primary_account_id(&self) -> Option<&str> {
        self.entries.first().map(|e| e.account_id.as_str())
    }

    pub fn touches_account(&self, account_id: &str) -> bool {
        self.entries.iter().any(|e| e.account_id == account_id)
    }
}

// =============================================================================
// Account
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

/// A chart-of-accounts row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub owner_id: String,
    pub organization_id: Option<String>,
}

// =============================================================================
// Percentage
// =============================================================================

/// A percentage held in basis points (1 bp = 0.01%).
///
/// ## Why Basis Points?
/// Utilization rates are reported with two decimals; holding them as an
/// integer number of hundredths keeps sorting and equality exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Percentage(i64);

impl Percentage {
    #[inline]
    pub const fn from_bps(bps: i64) -> Self {
        Percentage(bps)
    }

    /// `part / whole * 100`, rounded half away from zero to 2 decimals.
    /// A zero (or negative) `whole` yields 0%.
    ///
    /// ```rust
    /// use remedy_core::{Money, Percentage};
    ///
    /// let rate = Percentage::from_ratio(Money::from_units(1), Money::from_units(3));
    /// assert_eq!(rate.bps(), 3333);
    /// assert_eq!(rate.as_f64(), 33.33);
    /// ```
    pub fn from_ratio(part: Money, whole: Money) -> Self {
        if !whole.is_positive() {
            return Percentage(0);
        }
        let scaled = part.cents() as i128 * 10_000;
        let whole = whole.cents() as i128;
        let half = whole / 2;
        let bps = if scaled >= 0 {
            (scaled + half) / whole
        } else {
            (scaled - half) / whole
        };
        Percentage(bps as i64)
    }

    #[inline]
    pub const fn bps(&self) -> i64 {
        self.0
    }

    /// The percentage as a number, e.g. `70.0` for 7000 bps.
    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}%", self.as_f64())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(entries: Vec<LedgerEntry>) -> LedgerTransaction {
        LedgerTransaction {
            id: "tx-1".into(),
            group_number: "20260105001".into(),
            description: "Wholesale purchase".into(),
            transaction_date: Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap(),
            status: TransactionStatus::Draft,
            total_amount: Money::from_units(100),
            created_by: "owner-1".into(),
            organization_id: Some("org-1".into()),
            entries,
            version: 0,
        }
    }

    #[test]
    fn test_drawn_amount_picks_single_side() {
        assert_eq!(
            LedgerEntry::debit("inv", Money::from_units(5)).drawn_amount(),
            Ok(Money::from_units(5))
        );
        assert_eq!(
            LedgerEntry::credit("cash", Money::from_units(7)).drawn_amount(),
            Ok(Money::from_units(7))
        );
    }

    #[test]
    fn test_drawn_amount_rejects_malformed_lines() {
        let mut both = LedgerEntry::debit("inv", Money::from_units(5));
        both.credit_amount = Money::from_units(1);
        assert_eq!(both.drawn_amount(), Err(EntryDefect::BothSides));

        let zero = LedgerEntry::debit("inv", Money::zero());
        assert_eq!(zero.drawn_amount(), Err(EntryDefect::BothZero));

        let negative = LedgerEntry::debit("inv", Money::from_cents(-1));
        assert_eq!(negative.drawn_amount(), Err(EntryDefect::NegativeAmount));
    }

    #[test]
    fn test_entry_amount_reports_transaction_context() {
        let tx = sample(vec![LedgerEntry::debit("inv", Money::zero())]);
        match tx.entry_amount(0) {
            Err(CoreError::MalformedEntry { transaction_id, line, .. }) => {
                assert_eq!(transaction_id, "tx-1");
                assert_eq!(line, 0);
            }
            other => panic!("expected MalformedEntry, got {:?}", other),
        }
        assert!(matches!(
            tx.entry_amount(3),
            Err(CoreError::EntryIndexOutOfRange { index: 3, entries: 1, .. })
        ));
    }

    #[test]
    fn test_balance_and_sources() {
        let tx = sample(vec![
            LedgerEntry::debit("inventory", Money::from_units(100)).funded_by("src-a"),
            LedgerEntry::credit("cash", Money::from_units(60)).funded_by("src-b"),
            LedgerEntry::credit("payable", Money::from_units(40)).funded_by("src-a"),
        ]);
        assert!(tx.is_balanced());
        assert_eq!(tx.source_ids().into_iter().collect::<Vec<_>>(), vec!["src-a", "src-b"]);
        assert_eq!(tx.primary_account_id(), Some("inventory"));
        assert!(tx.touches_account("cash"));
        assert!(!tx.touches_account("equity"));
    }

    #[test]
    fn test_funded_by_does_not_duplicate_path() {
        let entry = LedgerEntry::debit("inv", Money::from_units(1))
            .funded_by("a")
            .funded_by("a");
        assert_eq!(entry.funding_path, vec!["a".to_string()]);
    }

    #[test]
    fn test_scope_covers() {
        let tx = sample(vec![]);
        assert!(FundingScope::new("owner-1").covers(&tx));
        assert!(FundingScope::new("owner-1").with_organization("org-1").covers(&tx));
        assert!(!FundingScope::new("owner-1").with_organization("org-2").covers(&tx));
        assert!(!FundingScope::new("owner-2").covers(&tx));
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 1, 31, 23, 59, 59).unwrap();
        let range = DateRange::new(start, end);
        assert!(range.contains(start));
        assert!(range.contains(end));
        assert!(!range.contains(end + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(Percentage::from_ratio(Money::from_units(300), Money::from_units(1000)).bps(), 3000);
        assert_eq!(Percentage::from_ratio(Money::from_units(2), Money::from_units(3)).bps(), 6667);
        assert_eq!(Percentage::from_ratio(Money::from_units(5), Money::zero()).bps(), 0);
        assert_eq!(Percentage::from_bps(6667).to_string(), "66.67%");
    }

    #[test]
    fn test_status_helpers() {
        assert!(TransactionStatus::Draft.is_mutable());
        assert!(!TransactionStatus::Confirmed.is_mutable());
        assert!(!TransactionStatus::Cancelled.counts_as_usage());
        assert_eq!(TransactionStatus::default(), TransactionStatus::Draft);
        assert_eq!(TransactionStatus::Confirmed.to_string(), "confirmed");
    }
}
