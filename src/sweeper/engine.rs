use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::models::{CandidateOutcome, SweepConfig, SweepRunSummary};
use crate::authority::{AuthorityClient, TwoTierVerifier};
use crate::error::{AppError, AppResult, SweepError};
use crate::ledger::models::{
    AuditAction, NewAuditEntry, TransactionKind, TransactionRecord, TransactionStatus,
    TransitionOutcome,
};
use crate::ledger::LedgerStore;

/// Repairs `add_domain` ledger rows left pending by a crash between the
/// authority call and the local status write.
///
/// INVARIANTS:
/// - Only `pending -> success` and `pending -> failed` are written
/// - The status compare-and-set is the only serialization point; the audit
///   entry commits with it, and only for the run that won it
/// - A verification failure never leads to a rollback
pub struct ReconciliationEngine {
    ledger: Arc<dyn LedgerStore>,
    authority: Arc<dyn AuthorityClient>,
}

impl ReconciliationEngine {
    pub fn new(ledger: Arc<dyn LedgerStore>, authority: Arc<dyn AuthorityClient>) -> Self {
        Self { ledger, authority }
    }

    /// Run one bounded sweep.
    ///
    /// Only a failure to query the ledger is fatal; everything per-candidate
    /// is counted in the summary.
    #[instrument(skip(self, config), fields(batch_size = config.batch_size))]
    pub async fn run_sweep(&self, config: &SweepConfig) -> Result<SweepRunSummary, SweepError> {
        let started = Utc::now();
        let cutoff = started - config.staleness;

        let batch = self
            .ledger
            .select_stale(TransactionKind::AddDomain, cutoff, config.batch_size as i64)
            .await
            .map_err(|e| SweepError::StoreUnavailable(e.to_string()))?;

        let mut summary = SweepRunSummary::new(started);
        summary.swept = batch.len();

        for id in &batch.incomplete {
            error!(record_id = %id, "{}", SweepError::JoinDataMissing(*id));
            summary.record(CandidateOutcome::Failed);
        }

        if batch.candidates.is_empty() {
            info!(swept = summary.swept, "No resolvable zombie transactions");
            return Ok(summary);
        }

        info!("🔄 Sweeping {} stale transactions", batch.candidates.len());

        let verifier = TwoTierVerifier::new(self.authority.clone(), config.call_timeout);
        let outcomes: Vec<CandidateOutcome> = stream::iter(batch.candidates)
            .map(|record| self.process_candidate(&verifier, record))
            .buffer_unordered(config.concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            summary.record(outcome);
        }

        info!(
            swept = summary.swept,
            committed = summary.committed,
            rolled_back = summary.rolled_back,
            already_resolved = summary.already_resolved,
            errors = summary.errors,
            "✓ Sweep completed"
        );

        Ok(summary)
    }

    /// Never fails: every error is folded into an outcome
    async fn process_candidate(
        &self,
        verifier: &TwoTierVerifier,
        record: TransactionRecord,
    ) -> CandidateOutcome {
        match self.resolve(verifier, &record).await {
            Ok(outcome) => outcome,
            Err(AppError::Verification(e)) => {
                warn!(
                    record_id = %record.id,
                    subject = %record.subject_ref,
                    "Verification failed, leaving pending: {}",
                    e
                );
                CandidateOutcome::Skipped
            }
            Err(e) => {
                error!(record_id = %record.id, subject = %record.subject_ref, "Failed to resolve: {}", e);
                CandidateOutcome::Failed
            }
        }
    }

    #[instrument(skip(self, verifier, record), fields(record_id = %record.id, subject = %record.subject_ref))]
    async fn resolve(
        &self,
        verifier: &TwoTierVerifier,
        record: &TransactionRecord,
    ) -> AppResult<CandidateOutcome> {
        let verdict = verifier.verify(record).await?;

        let (to, action, outcome) = if verdict.exists {
            (
                TransactionStatus::Success,
                AuditAction::ZombieCommit,
                CandidateOutcome::Committed,
            )
        } else {
            (
                TransactionStatus::Failed,
                AuditAction::ZombieRollback,
                CandidateOutcome::RolledBack,
            )
        };

        let mut details = serde_json::json!({
            "account": record.account_ref,
            "kind": record.kind.as_str(),
            "amount": record.amount.to_string(),
            "source": verdict.source,
        });
        if let (Some(details), Some(evidence)) = (details.as_object_mut(), verdict.evidence.as_object()) {
            details.extend(evidence.clone());
        }

        if action == AuditAction::ZombieRollback {
            // TODO: release the reserved reseller balance once a refund policy
            // for rolled-back add_domain charges exists.
            details["refund"] = serde_json::json!("deferred");
        }

        let entry = NewAuditEntry {
            actor_id: None,
            action,
            target_type: "transaction".to_string(),
            target_id: record.id,
            details,
        };

        match self
            .ledger
            .transition_with_audit(record.id, TransactionStatus::Pending, to, entry)
            .await?
        {
            TransitionOutcome::Applied => {}
            TransitionOutcome::AlreadyChanged => {
                info!("Already resolved elsewhere, nothing to do");
                return Ok(CandidateOutcome::AlreadyResolved);
            }
            TransitionOutcome::NotFound => {
                return Err(SweepError::RecordNotFound(record.id).into());
            }
        }

        if action == AuditAction::ZombieRollback {
            warn!(amount = %record.amount, "Rolled back, refund follow-up required");
        }

        info!(decision = ?action, source = ?verdict.source, "Zombie transaction resolved");

        Ok(outcome)
    }
}
