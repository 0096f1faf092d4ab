//! # remedy-ledger
//!
//! Operator command line for the funding ledger. Every subcommand runs one
//! `FundingService` operation and prints its result as pretty JSON on
//! stdout; logs go to stderr.
//!
//! ## Usage
//! ```bash
//! remedy-ledger --owner u-1 usage <SOURCE_ID>
//! remedy-ledger --owner u-1 sources --account acct-bank
//! remedy-ledger --owner u-1 allocate <DRAFT_ID> --from <SOURCE_ID>:300 --from <SOURCE_ID>:150.50:1
//! remedy-ledger --owner u-1 flow --from 2026-01-01 --to 2026-01-31
//! remedy-ledger --owner u-1 validate <ID>
//! remedy-ledger --owner u-1 trace <ID>
//! remedy-ledger --owner u-1 confirm <ID>
//! remedy-ledger --owner u-1 cancel <ID>
//! remedy-ledger migrate
//! ```

mod args;
mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use remedy_core::funding::AllocationRequest;
use remedy_db::{migrations, Database};
use remedy_funding::FundingService;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::args::{date_range, parse_allocation, parse_date};
use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "remedy-ledger", version)]
#[command(about = "Funding allocation and traceability for the Remedy POS ledger")]
struct Cli {
    /// Config file (default: platform config dir / remedy-pos / ledger.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Owner (user id) to act as
    #[arg(long, global = true)]
    owner: Option<String>,

    /// Restrict to one organization
    #[arg(long, global = true)]
    organization: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// How much of a source transaction other transactions consume
    Usage { source: String },

    /// Confirmed transactions with money left, most available first
    Sources {
        /// Only transactions with an entry on this account
        #[arg(long)]
        account: Option<String>,
    },

    /// Point entries of a draft at funding sources
    Allocate {
        target: String,

        /// Repeatable; ENTRY defaults to the first entry
        #[arg(long = "from", value_name = "SOURCE:AMOUNT[:ENTRY]", required = true, value_parser = parse_allocation)]
        from: Vec<AllocationRequest>,
    },

    /// Utilization of confirmed transactions
    Flow {
        /// First day (inclusive), YYYY-MM-DD
        #[arg(long, value_parser = parse_date)]
        from: Option<chrono::NaiveDate>,

        /// Last day (inclusive), YYYY-MM-DD
        #[arg(long, value_parser = parse_date)]
        to: Option<chrono::NaiveDate>,
    },

    /// Report funding problems of one transaction
    Validate { id: String },

    /// Walk a transaction's funding sources upstream
    Trace { id: String },

    /// Confirm a balanced draft, freezing its funding
    Confirm { id: String },

    /// Cancel a transaction, releasing what it drew
    Cancel { id: String },

    /// Apply pending database migrations
    Migrate,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MigrationReport {
    total: usize,
    applied: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CliConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(db) = cli.db {
        config.database.path = db;
    }
    if let Some(owner) = cli.owner {
        config.scope.owner_id = owner;
    }
    if let Some(org) = cli.organization {
        config.scope.organization_id = Some(org);
    }

    init_tracing(&config.logging.filter);

    if let Command::Migrate = cli.command {
        let db = Database::new(config.db_config().run_migrations(false)).await?;
        db.run_migrations().await?;
        let (total, applied) = migrations::migration_status(db.pool()).await?;
        db.close().await;
        return print_json(&MigrationReport { total, applied });
    }

    config.validate()?;
    let scope = config.scope();

    let db = Database::new(config.db_config()).await.context("opening database")?;
    let service = FundingService::with_config(db.clone(), config.funding.clone());

    info!(owner = %scope.owner_id, organization = ?scope.organization_id, "Ledger opened");

    let result = match cli.command {
        Command::Usage { source } => print_json(&service.track_funding_usage(&source, &scope).await?),
        Command::Sources { account } => print_json(
            &service
                .get_available_funding_sources(&scope, account.as_deref())
                .await?,
        ),
        Command::Allocate { target, from } => {
            print_json(&service.create_funding_allocation(&target, &from, &scope).await?)
        }
        Command::Flow { from, to } => {
            let range = date_range(from, to)?;
            print_json(&service.get_funding_flow_analysis(&scope, range.as_ref()).await?)
        }
        Command::Validate { id } => print_json(&service.validate_funding_allocation(&id, &scope).await?),
        Command::Trace { id } => print_json(&service.trace_funding_chain(&id, &scope).await?),
        Command::Confirm { id } => print_json(&service.confirm_transaction(&id, &scope).await?),
        Command::Cancel { id } => print_json(&service.cancel_transaction(&id, &scope).await?),
        Command::Migrate => Ok(()),
    };

    db.close().await;
    result
}

/// Initializes the tracing subscriber, writing to stderr.
///
/// `RUST_LOG` wins over the configured filter.
fn init_tracing(configured: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
