//! # remedy-core: Pure Funding Logic for Remedy POS
//!
//! Ledger types and the funding rules of the pharmacy POS: which transaction
//! paid for which, how much of a source is left, and whether an allocation
//! holds up. Everything here is pure; storage lives in `remedy-db`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Remedy POS Funding Engine                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 remedy-ledger (CLI)                             │   │
//! │  │    usage, sources, allocate, flow, validate, trace             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 remedy-funding (FundingService)                 │   │
//! │  │    loads scoped data, runs the rules, writes allocations       │   │
//! │  └──────────────┬──────────────────────────────┬───────────────────┘   │
//! │                 │                              │                        │
//! │  ┌──────────────▼──────────────────┐  ┌───────▼───────────────────┐   │
//! │  │  ★ remedy-core (THIS CRATE) ★   │  │  remedy-db                │   │
//! │  │  types  money  funding          │  │  SQLite repositories      │   │
//! │  │  NO I/O • PURE FUNCTIONS        │  │  migrations               │   │
//! │  └─────────────────────────────────┘  └───────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Transactions, entries, accounts, scope
//! - [`money`] - Integer money (cents)
//! - [`funding`] - Usage, sources, allocation, flow, assessment, chains
//! - [`error`] - Domain error types
//! - [`validation`] - Input and ledger-shape checks
//!
//! ## Example Usage
//!
//! ```rust
//! use remedy_core::funding::summarize_usage;
//! use remedy_core::{LedgerEntry, LedgerTransaction, Money, TransactionStatus};
//!
//! let source = LedgerTransaction {
//!     id: "a".into(),
//!     group_number: "20260105001".into(),
//!     description: "Capital injection".into(),
//!     transaction_date: chrono::Utc::now(),
//!     status: TransactionStatus::Confirmed,
//!     total_amount: Money::from_units(1000),
//!     created_by: "owner".into(),
//!     organization_id: None,
//!     entries: vec![],
//!     version: 0,
//! };
//! let mut spender = source.clone();
//! spender.id = "b".into();
//! spender.entries = vec![LedgerEntry::debit("inventory", Money::from_units(300)).funded_by("a")];
//!
//! let report = summarize_usage(source, &[spender]).unwrap();
//! assert_eq!(report.remaining_amount, Money::from_units(700));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod funding;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;
