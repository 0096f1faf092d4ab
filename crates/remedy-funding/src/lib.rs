//! # remedy-funding: Funding Allocation & Traceability
//!
//! Answers "which transaction paid for which" over the ledger of the Remedy
//! pharmacy POS, and lets operators attach draft transactions to the
//! confirmed transactions that fund them.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  remedy-ledger CLI / back-office API                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              remedy-funding (THIS CRATE)                        │   │
//! │  │   FundingService ── FundingConfig (retries)                     │   │
//! │  └──────────┬───────────────────────────────────┬──────────────────┘   │
//! │             │ rules                             │ storage              │
//! │             ▼                                   ▼                      │
//! │  remedy-core::funding                   remedy-db repositories         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use remedy_core::funding::AllocationRequest;
//! use remedy_core::{FundingScope, Money};
//! use remedy_db::{Database, DbConfig};
//! use remedy_funding::FundingService;
//!
//! let service = FundingService::new(Database::new(DbConfig::new("ledger.db")).await?);
//! let scope = FundingScope::new("owner-1");
//!
//! let outcome = service
//!     .create_funding_allocation("draft-1", &[AllocationRequest::new("capital-1", Money::from_units(300))], &scope)
//!     .await?;
//! ```

pub mod config;
pub mod error;
pub mod service;

pub use config::FundingConfig;
pub use error::{FundingError, FundingResult};
pub use service::FundingService;
