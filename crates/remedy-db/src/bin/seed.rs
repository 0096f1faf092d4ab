//! # Seed Data Generator
//!
//! Populates the database with a small demo ledger for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./remedy_dev.db for owner "demo-owner"
//! cargo run -p remedy-db --bin seed
//!
//! # Specify database path and scope
//! cargo run -p remedy-db --bin seed -- --db ./data/ledger.db --owner u-1 --organization pharmacy-1
//! ```
//!
//! ## Generated Ledger
//! - A chart of accounts (cash, bank, inventory, loan, capital, expenses)
//! - Confirmed funding sources: capital injection, bank loan, daily takings
//! - Unfunded drafts ready for allocation: wholesale purchases, rent
//!
//! Seeding is skipped when the owner already has confirmed transactions.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use remedy_core::{Account, AccountType, FundingScope, LedgerEntry, LedgerTransaction, Money, TransactionStatus};
use remedy_db::{new_transaction_id, Database, DbConfig};
use std::env;

/// `(id suffix, code, name, type)`
const ACCOUNTS: &[(&str, &str, &str, AccountType)] = &[
    ("cash", "1101", "Cash on hand", AccountType::Asset),
    ("bank", "1102", "Bank deposit", AccountType::Asset),
    ("inventory", "1301", "Drug inventory", AccountType::Asset),
    ("loan", "2101", "Short-term bank loan", AccountType::Liability),
    ("capital", "3101", "Owner capital", AccountType::Equity),
    ("sales", "4101", "Prescription sales", AccountType::Revenue),
    ("rent", "6101", "Rent expense", AccountType::Expense),
];

/// `(description, day of month, debit account, credit account, units)`
const SOURCES: &[(&str, u32, &str, &str, i64)] = &[
    ("Capital injection", 2, "bank", "capital", 100_000),
    ("Working capital loan", 3, "bank", "loan", 50_000),
    ("Daily takings", 4, "cash", "sales", 12_500),
];

const DRAFTS: &[(&str, u32, &str, &str, i64)] = &[
    ("Wholesale purchase: antibiotics", 6, "inventory", "bank", 30_000),
    ("Wholesale purchase: OTC analgesics", 7, "inventory", "bank", 18_000),
    ("Monthly rent", 8, "rent", "cash", 8_000),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./remedy_dev.db");
    let mut owner = String::from("demo-owner");
    let mut organization: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--owner" | "-o" => {
                if i + 1 < args.len() {
                    owner = args[i + 1].clone();
                    i += 1;
                }
            }
            "--organization" => {
                if i + 1 < args.len() {
                    organization = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Remedy Funding Ledger Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>          Database file path (default: ./remedy_dev.db)");
                println!("  -o, --owner <ID>         Owner user id (default: demo-owner)");
                println!("      --organization <ID>  Organization id (default: none)");
                println!("  -h, --help               Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Remedy Funding Ledger Seed");
    println!("==========================");
    println!("Database: {}", db_path);
    println!("Owner:    {}", owner);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let mut scope = FundingScope::new(&owner);
    if let Some(org) = &organization {
        scope = scope.with_organization(org);
    }

    let existing = db.transactions().confirmed(&scope, None, None).await?;
    if !existing.is_empty() {
        println!("⚠ Owner already has {} confirmed transactions", existing.len());
        println!("  Skipping seed to avoid duplicates.");
        return Ok(());
    }

    for (suffix, code, name, account_type) in ACCOUNTS {
        let account = Account {
            id: account_id(&owner, suffix),
            code: code.to_string(),
            name: name.to_string(),
            account_type: *account_type,
            owner_id: owner.clone(),
            organization_id: None,
        };
        if let Err(e) = db.accounts().insert(&account).await {
            eprintln!("Failed to insert account {}: {}", code, e);
        }
    }
    println!("✓ {} accounts", ACCOUNTS.len());

    let base = NaiveDate::from_ymd_opt(2026, 1, 1).ok_or("invalid base date")?;

    for (description, day, debit, credit, units) in SOURCES {
        let draft = demo_transaction(&db, &owner, &organization, base, *day, description, debit, credit, *units).await?;
        let stored = db.transactions().insert_draft(&draft).await?;
        db.transactions().confirm(&stored.id, &scope, stored.version).await?;
        println!("  + source {} {} ({})", stored.group_number, description, stored.total_amount);
    }

    for (description, day, debit, credit, units) in DRAFTS {
        let draft = demo_transaction(&db, &owner, &organization, base, *day, description, debit, credit, *units).await?;
        let stored = db.transactions().insert_draft(&draft).await?;
        println!("  + draft  {} {} ({})", stored.group_number, description, stored.total_amount);
    }

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

fn account_id(owner: &str, suffix: &str) -> String {
    format!("{}-{}", owner, suffix)
}

#[allow(clippy::too_many_arguments)]
async fn demo_transaction(
    db: &Database,
    owner: &str,
    organization: &Option<String>,
    base: NaiveDate,
    day: u32,
    description: &str,
    debit: &str,
    credit: &str,
    units: i64,
) -> Result<LedgerTransaction, Box<dyn std::error::Error>> {
    let date = base + Duration::days(i64::from(day) - 1);
    let group_number = db.transactions().next_group_number(owner, date).await?;
    let at = date.and_hms_opt(9, 0, 0).ok_or("invalid time")?;

    Ok(LedgerTransaction {
        id: new_transaction_id(),
        group_number,
        description: description.to_string(),
        transaction_date: Utc.from_utc_datetime(&at),
        status: TransactionStatus::Draft,
        total_amount: Money::zero(),
        created_by: owner.to_string(),
        organization_id: organization.clone(),
        entries: vec![
            LedgerEntry::debit(account_id(owner, debit), Money::from_units(units)),
            LedgerEntry::credit(account_id(owner, credit), Money::from_units(units)),
        ],
        version: 0,
    })
}
