//! # Funding Service Errors
//!
//! ```text
//! CoreError (rules)  ─┐
//!                     ├──► FundingError ──► CLI (anyhow)
//! DbError (storage)  ─┘
//! ```

use remedy_core::{CoreError, ValidationError};
use remedy_db::DbError;
use thiserror::Error;

/// Errors returned by [`FundingService`](crate::FundingService).
#[derive(Debug, Error)]
pub enum FundingError {
    /// A funding rule rejected the request.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The store failed. `DbError::Conflict` has already been retried.
    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<ValidationError> for FundingError {
    fn from(err: ValidationError) -> Self {
        FundingError::Core(CoreError::Validation(err))
    }
}

impl FundingError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, FundingError::Db(e) if e.is_conflict())
    }

    /// The domain error, if this is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            FundingError::Core(e) => Some(e),
            FundingError::Db(_) => None,
        }
    }
}

pub type FundingResult<T> = Result<T, FundingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_become_core_errors() {
        let err: FundingError = ValidationError::Required {
            field: "allocations".into(),
        }
        .into();
        assert!(matches!(err.as_core(), Some(CoreError::Validation(_))));
        assert_eq!(err.to_string(), "Validation error: allocations is required");
    }

    #[test]
    fn test_only_db_conflicts_are_conflicts() {
        assert!(FundingError::Db(DbError::Conflict("database is locked".into())).is_conflict());
        assert!(!FundingError::Db(DbError::PoolExhausted).is_conflict());
        assert!(!FundingError::Core(CoreError::SelfFunding { id: "a".into() }).is_conflict());
    }
}
