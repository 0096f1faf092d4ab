//! # Validation Module
//!
//! Input and ledger-shape validation for Remedy POS.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (CLI flags / HTTP handler)                            │
//! │  └── Parse amounts and ids                                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Identifier and amount checks                                      │
//! │  └── Double-entry shape before confirmation                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (debit_cents >= 0 AND credit_cents >= 0)                    │
//! │  └── Foreign key on source_transaction_id                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::LedgerTransaction;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest identifier accepted anywhere in the ledger.
pub const MAX_ID_LEN: usize = 64;

/// Longest transaction description.
pub const MAX_DESCRIPTION_LEN: usize = 500;

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates a record identifier (transaction, account, owner).
///
/// ## Rules
/// - Must not be blank
/// - At most 64 characters
///
/// ```rust
/// use remedy_core::validation::validate_id;
///
/// assert!(validate_id("transaction id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_id("transaction id", "  ").is_err());
/// ```
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if id.len() > MAX_ID_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_ID_LEN,
        });
    }

    Ok(())
}

/// Validates a group number: 8 date digits followed by a 3+ digit sequence.
pub fn validate_group_number(group_number: &str) -> ValidationResult<()> {
    if group_number.len() < 11 || !group_number.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "group number".to_string(),
            reason: "expected YYYYMMDD followed by a sequence number".to_string(),
        });
    }
    Ok(())
}

pub fn validate_description(description: &str) -> ValidationResult<()> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ValidationError::TooLong {
            field: "description".to_string(),
            max: MAX_DESCRIPTION_LEN,
        });
    }
    Ok(())
}

// =============================================================================
// Amount Validators
// =============================================================================

/// An allocation must move a positive amount.
pub fn validate_allocation_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "allocation amount".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Ledger Shape
// =============================================================================

/// Checks that a transaction can be confirmed.
///
/// ## Rules
/// - At least one entry
/// - Every entry has exactly one non-zero, non-negative side
/// - Debits equal credits
pub fn validate_for_confirmation(transaction: &LedgerTransaction) -> CoreResult<()> {
    if transaction.entries.is_empty() {
        return Err(CoreError::EmptyTransaction {
            id: transaction.id.clone(),
        });
    }

    for line in 0..transaction.entries.len() {
        transaction.entry_amount(line)?;
    }

    if !transaction.is_balanced() {
        return Err(CoreError::UnbalancedTransaction {
            debits: transaction.debit_total(),
            credits: transaction.credit_total(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LedgerEntry, TransactionStatus};
    use chrono::Utc;

    fn draft(entries: Vec<LedgerEntry>) -> LedgerTransaction {
        LedgerTransaction {
            id: "tx".into(),
            group_number: "20260101001".into(),
            description: String::new(),
            transaction_date: Utc::now(),
            status: TransactionStatus::Draft,
            total_amount: Money::zero(),
            created_by: "owner".into(),
            organization_id: None,
            entries,
            version: 0,
        }
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("id", "tx-1").is_ok());
        assert!(validate_id("id", "").is_err());
        assert!(validate_id("id", &"x".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_group_number() {
        assert!(validate_group_number("20260105001").is_ok());
        assert!(validate_group_number("2026010500").is_err());
        assert!(validate_group_number("2026-01-05-1").is_err());
    }

    #[test]
    fn test_validate_allocation_amount() {
        assert!(validate_allocation_amount(Money::from_cents(1)).is_ok());
        assert!(validate_allocation_amount(Money::zero()).is_err());
        assert!(validate_allocation_amount(Money::from_cents(-5)).is_err());
    }

    #[test]
    fn test_validate_description() {
        assert!(validate_description("藥品進貨").is_ok());
        assert!(validate_description(&"a".repeat(501)).is_err());
    }

    #[test]
    fn test_confirmation_requires_balanced_well_formed_entries() {
        assert!(matches!(
            validate_for_confirmation(&draft(vec![])),
            Err(CoreError::EmptyTransaction { .. })
        ));

        let unbalanced = draft(vec![
            LedgerEntry::debit("inventory", Money::from_units(10)),
            LedgerEntry::credit("cash", Money::from_units(9)),
        ]);
        assert!(matches!(
            validate_for_confirmation(&unbalanced),
            Err(CoreError::UnbalancedTransaction { .. })
        ));

        let malformed = draft(vec![
            LedgerEntry::debit("inventory", Money::zero()),
            LedgerEntry::credit("cash", Money::zero()),
        ]);
        assert!(matches!(
            validate_for_confirmation(&malformed),
            Err(CoreError::MalformedEntry { line: 0, .. })
        ));

        let balanced = draft(vec![
            LedgerEntry::debit("inventory", Money::from_units(10)),
            LedgerEntry::credit("cash", Money::from_units(10)),
        ]);
        assert!(validate_for_confirmation(&balanced).is_ok());
    }
}
