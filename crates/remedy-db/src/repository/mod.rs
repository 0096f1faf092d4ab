//! # Repository Module
//!
//! Database repositories for the funding ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  FundingService                                                        │
//! │       │                                                                 │
//! │       │  db.transactions().referencing("tx-a", &scope)                 │
//! │       ▼                                                                 │
//! │  TransactionRepository                                                 │
//! │  ├── get_scoped / referencing / confirmed                              │
//! │  ├── usage_lines / funding_edges                                       │
//! │  ├── insert_draft / confirm / cancel / next_group_number               │
//! │  └── begin_write() → LedgerWriteTx (allocations)                       │
//! │                                                                         │
//! │  AccountRepository                                                     │
//! │  └── insert / get_by_id / list_in_scope                                │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`TransactionRepository`](transaction::TransactionRepository) - Ledger transactions and entries
//! - [`AccountRepository`](account::AccountRepository) - Chart of accounts

pub mod account;
pub mod transaction;
