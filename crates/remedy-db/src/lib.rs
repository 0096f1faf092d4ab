//! # remedy-db: Database Layer for the Remedy Funding Ledger
//!
//! SQLite storage for ledger transactions, entries and accounts, accessed
//! asynchronously through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Remedy Funding Data Flow                            │
//! │                                                                         │
//! │  FundingService (remedy-funding)                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    remedy-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐ │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │ │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │ │   │
//! │  │   │               │    │ TransactionRepo│    │              │ │   │
//! │  │   │ SqlitePool    │◄───│ AccountRepo    │    │ 001_initial  │ │   │
//! │  │   │ WAL, busy     │    │ LedgerWriteTx  │    │  _schema.sql │ │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘ │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   <data dir>/remedy-pos/ledger.db                               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Transaction and account repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use remedy_core::FundingScope;
//! use remedy_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("ledger.db")).await?;
//! let scope = FundingScope::new("owner-1");
//! let spenders = db.transactions().referencing("tx-a", &scope).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::account::AccountRepository;
pub use repository::transaction::{new_transaction_id, DraftClaim, LedgerWriteTx, TransactionRepository};
