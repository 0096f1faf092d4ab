//! # Error Types
//!
//! Domain-specific error types for remedy-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  remedy-core errors (this file)                                        │
//! │  ├── CoreError        - Funding/ledger rule violations (hard failures) │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  remedy-db errors                                                      │
//! │  └── DbError          - Storage failures                               │
//! │                                                                         │
//! │  remedy-funding errors                                                 │
//! │  └── FundingError     - CoreError | DbError, what callers see          │
//! │                                                                         │
//! │  Non-fatal findings are NOT errors: see `funding::FundingIssue`.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (transaction id, group number, amounts)
//! 3. Errors are enum variants, never String

use thiserror::Error;

use crate::money::Money;
use crate::types::TransactionStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Ledger and funding rule violations.
///
/// Every variant aborts the operation that raised it. None of them are
/// transient, so callers never retry on a `CoreError`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The transaction does not exist, or exists outside the caller's
    /// owner/organization scope. The two cases are deliberately
    /// indistinguishable.
    #[error("Transaction not found or not accessible: {id}")]
    NotFoundOrForbidden { id: String },

    /// Funding references of a non-draft transaction cannot change.
    #[error("Transaction {id} is {status} and its funding allocation cannot be modified")]
    ImmutableTransaction {
        id: String,
        status: TransactionStatus,
    },

    /// An allocation asks for more than the source has left.
    ///
    /// ## User Workflow
    /// ```text
    /// Source #20260105001: total 1,000.00, used 300.00
    ///      │
    ///      ▼
    /// allocate 800.00 to draft #20260107002
    ///      │
    ///      ▼
    /// InsufficientFunds { requested: 800.00, available: 700.00 }
    ///      │
    ///      ▼
    /// UI: "Source 20260105001 only has 700.00 available"
    /// ```
    #[error(
        "Insufficient funds in source {group_number} ({source_id}): requested {requested}, available {available}"
    )]
    InsufficientFunds {
        source_id: String,
        group_number: String,
        requested: Money,
        available: Money,
    },

    /// A ledger line is not a proper single-sided double-entry line.
    #[error("Malformed entry {line} of transaction {transaction_id}: {reason}")]
    MalformedEntry {
        transaction_id: String,
        line: usize,
        reason: String,
    },

    /// A transaction was named as its own funding source.
    #[error("Transaction {id} cannot fund itself")]
    SelfFunding { id: String },

    /// Following funding sources from the new source leads back to the target.
    #[error("Circular funding path: {}", path.join(" -> "))]
    CircularFunding { path: Vec<String> },

    #[error("Entry index {index} out of range for transaction {transaction_id} ({entries} entries)")]
    EntryIndexOutOfRange {
        transaction_id: String,
        index: usize,
        entries: usize,
    },

    /// Debits and credits differ; only balanced transactions may be confirmed.
    #[error("Transaction is unbalanced: debits {debits}, credits {credits}")]
    UnbalancedTransaction { debits: Money, credits: Money },

    #[error("Transaction {id} has no entries")]
    EmptyTransaction { id: String },

    /// Confirmation found problems in the draft's funding references.
    #[error("Transaction {id} cannot be confirmed: {}", issues.join("; "))]
    UnsoundFunding { id: String, issues: Vec<String> },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
