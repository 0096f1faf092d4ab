//! # Funding Service
//!
//! Loads scoped ledger data, runs the funding rules of `remedy-core` over it
//! and writes allocations back.
//!
//! ## Allocation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   create_funding_allocation()                           │
//! │                                                                         │
//! │  validate amounts (no I/O)                                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────── one SQLite write transaction ──────────────────┐ │
//! │  │ claim_draft(target)      Missing → NotFoundOrForbidden            │ │
//! │  │                          NotDraft → ImmutableTransaction          │ │
//! │  │ load target, funding edges                                        │ │
//! │  │ for each request:                                                 │ │
//! │  │     usage of source (cached per batch)                            │ │
//! │  │     planner.apply()      self / index / funds / cycle checks      │ │
//! │  │ update_funding(target)                                            │ │
//! │  │ commit                                                            │ │
//! │  └───────────────────────────────────────────────────────────────────┘ │
//! │       │                                                                 │
//! │       ├── DbError::Conflict → backoff, re-run (max_conflict_retries)   │
//! │       ▼                                                                 │
//! │  AllocationOutcome                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any error inside the write transaction drops it, which rolls back: a
//! batch is applied completely or not at all.
//!
//! `record_draft` takes the same path: the draft is inserted without its
//! funding references, which are then re-applied through the planner as one
//! batch before the commit.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::FundingConfig;
use crate::error::{FundingError, FundingResult};
use remedy_core::funding::{
    analyze_flow, assess_funding, rank_funding_sources, summarize_usage, trace_chain, AllocationOutcome,
    AllocationPlanner, AllocationRequest, FlowAnalysis, FundingChain, FundingGraph, FundingSource, UsageReport,
    UsageTally, ValidationReport,
};
use remedy_core::validation::{
    validate_allocation_amount, validate_description, validate_for_confirmation, validate_group_number, validate_id,
};
use remedy_core::{CoreError, DateRange, FundingScope, LedgerTransaction, TransactionStatus, ValidationError};
use remedy_db::{new_transaction_id, Database, DraftClaim, LedgerWriteTx};

fn not_found(id: &str) -> CoreError {
    CoreError::NotFoundOrForbidden { id: id.to_string() }
}

/// Entry point for every funding operation.
///
/// Cheap to clone; clones share the database pool.
#[derive(Debug, Clone)]
pub struct FundingService {
    db: Database,
    config: FundingConfig,
}

impl FundingService {
    pub fn new(db: Database) -> Self {
        FundingService::with_config(db, FundingConfig::default())
    }

    pub fn with_config(db: Database, config: FundingConfig) -> Self {
        FundingService { db, config }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &FundingConfig {
        &self.config
    }

    // =========================================================================
    // Usage Tracker
    // =========================================================================

    /// How much of `source_id` other non-cancelled transactions consume.
    ///
    /// ## Errors
    /// - `NotFoundOrForbidden` if the source is not visible in `scope`
    /// - `MalformedEntry` if a referencing entry has no single usable side
    pub async fn track_funding_usage(&self, source_id: &str, scope: &FundingScope) -> FundingResult<UsageReport> {
        let repo = self.db.transactions();

        let source = repo
            .get_scoped(source_id, scope)
            .await?
            .ok_or_else(|| not_found(source_id))?;
        let referencing = repo.referencing(source_id, scope).await?;

        let report = summarize_usage(source, &referencing)?;

        debug!(
            source = %source_id,
            used = %report.used_amount,
            remaining = %report.remaining_amount,
            details = report.usage_details.len(),
            "Funding usage tracked"
        );

        Ok(report)
    }

    // =========================================================================
    // Funding Source Finder
    // =========================================================================

    /// Confirmed transactions with money left, most available first.
    ///
    /// `account_id` keeps only transactions with an entry on that account.
    pub async fn get_available_funding_sources(
        &self,
        scope: &FundingScope,
        account_id: Option<&str>,
    ) -> FundingResult<Vec<FundingSource>> {
        let repo = self.db.transactions();

        let candidates = repo.confirmed(scope, account_id, None).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let tally = UsageTally::from_lines(&repo.usage_lines(scope).await?)?;
        let accounts = self.db.accounts().list_in_scope(scope).await?;

        let sources = rank_funding_sources(&candidates, &accounts, &tally);

        debug!(
            candidates = candidates.len(),
            available = sources.len(),
            "Funding sources listed"
        );

        Ok(sources)
    }

    // =========================================================================
    // Allocation Writer
    // =========================================================================

    /// Points entries of the draft `target_id` at funding sources.
    ///
    /// Requests are applied in order; a request without `entry_index` uses
    /// the first entry. Earlier requests of the batch reduce what later ones
    /// may draw from the same source.
    ///
    /// ## Errors
    /// - `Validation` for an empty batch or a non-positive amount
    /// - `NotFoundOrForbidden` for a target or source outside `scope`
    /// - `ImmutableTransaction` unless the target is a draft
    /// - `SelfFunding`, `EntryIndexOutOfRange`, `InsufficientFunds`,
    ///   `CircularFunding` from the first failing request
    /// - `Db(Conflict)` once retries are exhausted
    pub async fn create_funding_allocation(
        &self,
        target_id: &str,
        allocations: &[AllocationRequest],
        scope: &FundingScope,
    ) -> FundingResult<AllocationOutcome> {
        if allocations.is_empty() {
            return Err(ValidationError::Required {
                field: "allocations".to_string(),
            }
            .into());
        }
        for request in allocations {
            validate_allocation_amount(request.amount)?;
        }

        self.retry_on_conflict(target_id, || self.allocate_once(target_id, allocations, scope))
            .await
    }

    /// Runs `operation` again with exponential backoff while it fails with a
    /// write conflict, at most `max_conflict_retries` more times.
    async fn retry_on_conflict<T, F, Fut>(&self, transaction_id: &str, mut operation: F) -> FundingResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FundingResult<T>>,
    {
        let max_retries = self.config.max_conflict_retries;
        let mut attempts = 0u32;

        backoff::future::retry_notify(
            self.config.backoff(),
            || {
                attempts += 1;
                let attempt = attempts;
                let run = operation();
                async move {
                    run.await.map_err(|e| {
                        if e.is_conflict() && attempt <= max_retries {
                            backoff::Error::transient(e)
                        } else {
                            backoff::Error::permanent(e)
                        }
                    })
                }
            },
            |e: FundingError, delay: Duration| {
                warn!(
                    transaction_id = %transaction_id,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Write lost the database lock, retrying"
                );
            },
        )
        .await
    }

    async fn allocate_once(
        &self,
        target_id: &str,
        allocations: &[AllocationRequest],
        scope: &FundingScope,
    ) -> FundingResult<AllocationOutcome> {
        let mut tx = self.db.transactions().begin_write().await?;

        match tx.claim_draft(target_id, scope).await? {
            DraftClaim::Claimed => {}
            DraftClaim::Missing => return Err(not_found(target_id).into()),
            DraftClaim::NotDraft(status) => {
                return Err(CoreError::ImmutableTransaction {
                    id: target_id.to_string(),
                    status,
                }
                .into())
            }
        }

        let mut target = tx
            .get_scoped(target_id, scope)
            .await?
            .ok_or_else(|| not_found(target_id))?;
        let mut planner = AllocationPlanner::new(&mut target)?;
        plan_batch(&mut tx, &mut planner, target_id, allocations, scope).await?;
        let outcome = planner.finish();

        tx.update_funding(&target).await?;
        tx.commit().await?;

        info!(
            transaction_id = %target_id,
            allocations = outcome.allocations.len(),
            "Allocation committed"
        );

        Ok(outcome)
    }

    // =========================================================================
    // Flow Analyzer
    // =========================================================================

    /// Utilization of every confirmed transaction in scope, optionally
    /// limited to those dated inside `range`.
    pub async fn get_funding_flow_analysis(
        &self,
        scope: &FundingScope,
        range: Option<&DateRange>,
    ) -> FundingResult<FlowAnalysis> {
        let repo = self.db.transactions();

        let candidates = repo.confirmed(scope, None, range).await?;
        if candidates.is_empty() {
            return Ok(FlowAnalysis::empty());
        }

        let tally = UsageTally::from_lines(&repo.usage_lines(scope).await?)?;
        let analysis = analyze_flow(&candidates, &tally);

        debug!(
            transactions = analysis.transaction_count,
            utilization = analysis.utilization_rate,
            "Funding flow analyzed"
        );

        Ok(analysis)
    }

    // =========================================================================
    // Allocation Validator
    // =========================================================================

    /// Reports everything wrong with the funding of `transaction_id` without
    /// failing on it. Only a missing transaction or a storage failure errors.
    pub async fn validate_funding_allocation(
        &self,
        transaction_id: &str,
        scope: &FundingScope,
    ) -> FundingResult<ValidationReport> {
        let repo = self.db.transactions();

        let transaction = repo
            .get_scoped(transaction_id, scope)
            .await?
            .ok_or_else(|| not_found(transaction_id))?;

        let mut sources = HashMap::new();
        for source_id in transaction.source_ids() {
            let Some(source) = repo.get_scoped(source_id, scope).await? else {
                continue;
            };
            // Its own draws are measured against the rest; malformed lines of
            // its own become issues, not errors.
            let mut referencing = repo.referencing(source_id, scope).await?;
            referencing.retain(|t| t.id != transaction.id);
            sources.insert(source_id.to_string(), summarize_usage(source, &referencing)?);
        }

        let graph = FundingGraph::from_edges(repo.funding_edges(scope).await?);
        let report = assess_funding(&transaction, &sources, &graph);

        debug!(
            transaction_id = %transaction_id,
            is_valid = report.is_valid,
            issues = report.issues.len(),
            recommendations = report.recommendations.len(),
            "Funding allocation validated"
        );

        Ok(report)
    }

    // =========================================================================
    // Chain Trace
    // =========================================================================

    /// Upstream provenance of `transaction_id`. Sources outside scope end
    /// their branch; cancelled transactions are loaded but not expanded.
    pub async fn trace_funding_chain(&self, transaction_id: &str, scope: &FundingScope) -> FundingResult<FundingChain> {
        let repo = self.db.transactions();

        let root = repo
            .get_scoped(transaction_id, scope)
            .await?
            .ok_or_else(|| not_found(transaction_id))?;

        let mut loaded: HashMap<String, LedgerTransaction> = HashMap::new();
        let mut seen: HashSet<String> = HashSet::from([root.id.clone()]);
        let mut queue: VecDeque<String> = VecDeque::new();
        if root.status.counts_as_usage() {
            queue.extend(root.source_ids().into_iter().map(str::to_string));
        }
        loaded.insert(root.id.clone(), root);

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(transaction) = repo.get_scoped(&id, scope).await? {
                if transaction.status.counts_as_usage() {
                    queue.extend(transaction.source_ids().into_iter().map(str::to_string));
                }
                loaded.insert(id, transaction);
            }
        }

        let chain = trace_chain(transaction_id, &loaded);

        debug!(
            transaction_id = %transaction_id,
            links = chain.links.len(),
            has_cycle = chain.has_cycle,
            "Funding chain traced"
        );

        Ok(chain)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Stores `draft` as a new draft of the scope's owner.
    ///
    /// An empty `id` gets a fresh UUID and an empty `group_number` the next
    /// number of the owner's day. Ownership fields are taken from `scope`.
    ///
    /// Entries that already name a `source_transaction_id` draw their own
    /// amount from it. Those draws go through the same checks as
    /// [`create_funding_allocation`](Self::create_funding_allocation), in the
    /// same write transaction as the insert, and `funding_path` is rebuilt
    /// from the source.
    ///
    /// ## Errors
    /// - `Validation` for a bad id, group number or description
    /// - `MalformedEntry` for a funded entry with no single usable side
    /// - `NotFoundOrForbidden` for a source outside `scope`
    /// - `SelfFunding`, `InsufficientFunds`, `CircularFunding` from the first
    ///   failing draw; nothing is stored then
    pub async fn record_draft(&self, mut draft: LedgerTransaction, scope: &FundingScope) -> FundingResult<LedgerTransaction> {
        validate_id("owner id", &scope.owner_id)?;
        validate_description(&draft.description)?;

        let repo = self.db.transactions();

        if draft.id.is_empty() {
            draft.id = new_transaction_id();
        } else {
            validate_id("transaction id", &draft.id)?;
        }
        if draft.group_number.is_empty() {
            draft.group_number = repo
                .next_group_number(&scope.owner_id, draft.transaction_date.date_naive())
                .await?;
        } else {
            validate_group_number(&draft.group_number)?;
        }

        draft.created_by = scope.owner_id.clone();
        draft.organization_id = scope.organization_id.clone();

        let mut draws = Vec::new();
        for (index, entry) in draft.entries.iter().enumerate() {
            if let Some(source_id) = &entry.source_transaction_id {
                draws.push(AllocationRequest::new(source_id.clone(), draft.entry_amount(index)?).on_entry(index));
            }
        }
        for entry in &mut draft.entries {
            entry.source_transaction_id = None;
            entry.funding_path.clear();
        }

        let stored = self
            .retry_on_conflict(&draft.id, || self.insert_once(&draft, &draws, scope))
            .await?;
        info!(
            id = %stored.id,
            group_number = %stored.group_number,
            funded_entries = draws.len(),
            "Draft recorded"
        );

        Ok(stored)
    }

    async fn insert_once(
        &self,
        draft: &LedgerTransaction,
        draws: &[AllocationRequest],
        scope: &FundingScope,
    ) -> FundingResult<LedgerTransaction> {
        let mut tx = self.db.transactions().begin_write().await?;
        let mut stored = tx.insert_draft(draft).await?;

        if !draws.is_empty() {
            let mut planner = AllocationPlanner::new(&mut stored)?;
            plan_batch(&mut tx, &mut planner, &draft.id, draws, scope).await?;
            planner.finish();
            tx.update_funding(&stored).await?;
        }

        tx.commit().await?;
        Ok(stored)
    }

    /// Confirms a draft once it is non-empty, well-formed and balanced, and
    /// its funding report has no issues. Its funding references are frozen
    /// from then on.
    ///
    /// ## Errors
    /// - `UnsoundFunding` listing every issue of
    ///   [`validate_funding_allocation`](Self::validate_funding_allocation)
    pub async fn confirm_transaction(&self, id: &str, scope: &FundingScope) -> FundingResult<LedgerTransaction> {
        let repo = self.db.transactions();

        let transaction = repo.get_scoped(id, scope).await?.ok_or_else(|| not_found(id))?;
        if !transaction.status.is_mutable() {
            return Err(CoreError::ImmutableTransaction {
                id: id.to_string(),
                status: transaction.status,
            }
            .into());
        }
        validate_for_confirmation(&transaction)?;

        let report = self.validate_funding_allocation(id, scope).await?;
        if !report.is_valid {
            return Err(CoreError::UnsoundFunding {
                id: id.to_string(),
                issues: report.issues.iter().map(ToString::to_string).collect(),
            }
            .into());
        }

        repo.confirm(id, scope, transaction.version).await?;

        Ok(LedgerTransaction {
            status: TransactionStatus::Confirmed,
            version: transaction.version + 1,
            ..transaction
        })
    }

    /// Cancels a draft or confirmed transaction, releasing whatever it drew
    /// from its sources. Cancelling twice is a no-op.
    pub async fn cancel_transaction(&self, id: &str, scope: &FundingScope) -> FundingResult<LedgerTransaction> {
        let repo = self.db.transactions();

        let transaction = repo.get_scoped(id, scope).await?.ok_or_else(|| not_found(id))?;
        if transaction.status == TransactionStatus::Cancelled {
            return Ok(transaction);
        }

        if !repo.cancel(id, scope).await? {
            return Err(FundingError::Db(remedy_db::DbError::Conflict(format!(
                "transaction {} changed before it could be cancelled",
                id
            ))));
        }

        repo.get_scoped(id, scope).await?.ok_or_else(|| not_found(id).into())
    }
}

/// Applies `requests` to `planner` against the usage stored in `tx`.
/// Usage is loaded once per source, so earlier requests of the batch count
/// against later ones.
async fn plan_batch(
    tx: &mut LedgerWriteTx,
    planner: &mut AllocationPlanner<'_>,
    target_id: &str,
    requests: &[AllocationRequest],
    scope: &FundingScope,
) -> FundingResult<()> {
    let graph = FundingGraph::from_edges(tx.funding_edges(scope).await?);
    let mut usage: HashMap<String, UsageReport> = HashMap::new();

    for request in requests {
        let source_id = request.source_transaction_id.as_str();
        let report = match usage.entry(source_id.to_string()) {
            Entry::Occupied(cached) => cached.into_mut(),
            Entry::Vacant(slot) => {
                let source = tx
                    .get_scoped(source_id, scope)
                    .await?
                    .ok_or_else(|| not_found(source_id))?;
                let referencing = tx.referencing(source_id, scope).await?;
                slot.insert(summarize_usage(source, &referencing)?)
            }
        };

        let record = planner.apply(request, report, &graph)?;
        debug!(
            transaction_id = %target_id,
            source = %record.source_transaction_id,
            amount = %record.amount,
            remaining = %record.remaining_amount,
            "Allocation planned"
        );
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use remedy_core::{LedgerEntry, Money};
    use remedy_db::{DbConfig, DbError};
    use std::cell::Cell;

    async fn service() -> FundingService {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        FundingService::new(db)
    }

    fn locked() -> FundingError {
        FundingError::Db(DbError::Conflict("database is locked".into()))
    }

    fn scope() -> FundingScope {
        FundingScope::new("owner-1")
    }

    fn balanced(units: i64) -> LedgerTransaction {
        LedgerTransaction {
            id: String::new(),
            group_number: String::new(),
            description: "Wholesale purchase".into(),
            transaction_date: Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap(),
            status: TransactionStatus::Draft,
            total_amount: Money::zero(),
            created_by: String::new(),
            organization_id: None,
            entries: vec![
                LedgerEntry::debit("acct-inventory", Money::from_units(units)),
                LedgerEntry::credit("acct-bank", Money::from_units(units)),
            ],
            version: 0,
        }
    }

    #[tokio::test]
    async fn test_record_draft_assigns_id_and_group_number() {
        let service = service().await;

        let first = service.record_draft(balanced(100), &scope()).await.unwrap();
        let second = service.record_draft(balanced(50), &scope()).await.unwrap();

        assert!(!first.id.is_empty());
        assert_eq!(first.group_number, "20260105001");
        assert_eq!(second.group_number, "20260105002");
        assert_eq!(first.created_by, "owner-1");
        assert_eq!(first.total_amount, Money::from_units(100));
    }

    #[tokio::test]
    async fn test_record_draft_rejects_bad_group_number() {
        let service = service().await;
        let mut draft = balanced(100);
        draft.group_number = "2026-01-05".into();

        let err = service.record_draft(draft, &scope()).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_confirm_rejects_unbalanced_draft() {
        let service = service().await;
        let mut draft = balanced(100);
        draft.entries[1].credit_amount = Money::from_units(90);
        let stored = service.record_draft(draft, &scope()).await.unwrap();

        let err = service.confirm_transaction(&stored.id, &scope()).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::UnbalancedTransaction { .. })));
    }

    #[tokio::test]
    async fn test_confirm_twice_is_immutable() {
        let service = service().await;
        let stored = service.record_draft(balanced(100), &scope()).await.unwrap();

        let confirmed = service.confirm_transaction(&stored.id, &scope()).await.unwrap();
        assert_eq!(confirmed.status, TransactionStatus::Confirmed);

        let err = service.confirm_transaction(&stored.id, &scope()).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::ImmutableTransaction { .. })));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let service = service().await;
        let stored = service.record_draft(balanced(100), &scope()).await.unwrap();

        let cancelled = service.cancel_transaction(&stored.id, &scope()).await.unwrap();
        assert_eq!(cancelled.status, TransactionStatus::Cancelled);

        let again = service.cancel_transaction(&stored.id, &scope()).await.unwrap();
        assert_eq!(again.version, cancelled.version);
    }

    #[tokio::test]
    async fn test_empty_allocation_batch_is_rejected() {
        let service = service().await;
        let stored = service.record_draft(balanced(100), &scope()).await.unwrap();

        let err = service
            .create_funding_allocation(&stored.id, &[], &scope())
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::Validation(ValidationError::Required { .. }))
        ));
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let service = service().await;

        for err in [
            service.track_funding_usage("nope", &scope()).await.unwrap_err(),
            service.validate_funding_allocation("nope", &scope()).await.unwrap_err(),
            service.trace_funding_chain("nope", &scope()).await.unwrap_err(),
            service.cancel_transaction("nope", &scope()).await.unwrap_err(),
        ] {
            assert!(matches!(err.as_core(), Some(CoreError::NotFoundOrForbidden { .. })));
        }
    }

    #[tokio::test]
    async fn test_empty_ledger_reports() {
        let service = service().await;

        assert!(service
            .get_available_funding_sources(&scope(), None)
            .await
            .unwrap()
            .is_empty());

        let flow = service.get_funding_flow_analysis(&scope(), None).await.unwrap();
        assert_eq!(flow, FlowAnalysis::empty());
    }

    #[tokio::test]
    async fn test_conflicts_are_retried_until_success() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let config = FundingConfig {
            retry_delay_ms: 1,
            ..FundingConfig::default()
        };
        let service = FundingService::with_config(db, config);

        let calls = Cell::new(0u32);
        let result = service
            .retry_on_conflict("D", || {
                calls.set(calls.get() + 1);
                let call = calls.get();
                async move {
                    if call < 3 {
                        Err(locked())
                    } else {
                        Ok(call)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_retries_stop_at_the_configured_count() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let config = FundingConfig {
            retry_delay_ms: 1,
            ..FundingConfig::default()
        }
        .max_conflict_retries(2);
        let service = FundingService::with_config(db, config);

        let calls = Cell::new(0u32);
        let err = service
            .retry_on_conflict("D", || {
                calls.set(calls.get() + 1);
                async { Err::<(), _>(locked()) }
            })
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_rule_errors_are_not_retried() {
        let service = service().await;

        let calls = Cell::new(0u32);
        let err = service
            .retry_on_conflict("D", || {
                calls.set(calls.get() + 1);
                async { Err::<(), _>(FundingError::from(CoreError::SelfFunding { id: "D".into() })) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err.as_core(), Some(CoreError::SelfFunding { .. })));
        assert_eq!(calls.get(), 1);
    }
}
