// In-memory ledger used by the engine and router tests.
//
// Same compare-and-set semantics as the Postgres repository, with a switch to
// simulate the database being unreachable and per-record faults.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use super::models::*;
use super::repository::LedgerRepository;
use super::traits::{AuditSink, LedgerStore};
use crate::error::{AppError, AppResult, SweepError};

/// Failure injected for a single record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The status write errors
    Transition,
    /// The audit insert errors, taking the status write down with it
    Audit,
    /// The row is deleted right before the status write
    Vanish,
}

#[derive(Default)]
pub struct MemoryLedger {
    rows: Mutex<HashMap<Uuid, CandidateRow>>,
    audit: Mutex<Vec<AuditEntry>>,
    faults: Mutex<HashMap<Uuid, Fault>>,
    unavailable: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pending row, returning its id
    pub fn insert(
        &self,
        kind: TransactionKind,
        account_ref: Option<&str>,
        subject_ref: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.rows.lock().insert(
            id,
            CandidateRow {
                id,
                kind,
                amount: "10.00".parse().expect("valid decimal literal"),
                status: TransactionStatus::Pending,
                created_at,
                account_ref: account_ref.map(str::to_string),
                subject_ref: subject_ref.map(str::to_string),
            },
        );
        id
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn inject(&self, id: Uuid, fault: Fault) {
        self.faults.lock().insert(id, fault);
    }

    pub fn clear_fault(&self, id: Uuid) {
        self.faults.lock().remove(&id);
    }

    pub fn status_of(&self, id: Uuid) -> Option<TransactionStatus> {
        self.rows.lock().get(&id).map(|row| row.status)
    }

    pub fn count_with_status(&self, status: TransactionStatus) -> usize {
        self.rows
            .lock()
            .values()
            .filter(|row| row.status == status)
            .count()
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.lock().clone()
    }

    pub fn audit_for(&self, id: Uuid) -> Vec<AuditEntry> {
        self.audit
            .lock()
            .iter()
            .filter(|entry| entry.target_id == id)
            .cloned()
            .collect()
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    /// Applies `Transition` and `Vanish` faults; `Audit` is left to the caller
    fn before_write(&self, id: Uuid) -> AppResult<Option<Fault>> {
        self.check_available()?;

        let fault = self.faults.lock().get(&id).copied();
        match fault {
            Some(Fault::Transition) => Err(AppError::Database(sqlx::Error::PoolTimedOut)),
            Some(Fault::Vanish) => {
                self.rows.lock().remove(&id);
                Ok(fault)
            }
            _ => Ok(fault),
        }
    }

    fn store_audit(&self, entry: NewAuditEntry) -> AuditEntry {
        let stored = AuditEntry {
            id: Uuid::new_v4(),
            actor_id: entry.actor_id,
            action: entry.action,
            target_type: entry.target_type,
            target_id: entry.target_id,
            details: entry.details,
            created_at: Utc::now(),
        };
        self.audit.lock().push(stored.clone());
        stored
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn select_stale(
        &self,
        kind: TransactionKind,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<StaleBatch> {
        self.check_available()?;

        let mut rows: Vec<CandidateRow> = self
            .rows
            .lock()
            .values()
            .filter(|row| {
                row.status == TransactionStatus::Pending
                    && row.kind == kind
                    && row.created_at <= older_than
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        rows.truncate(limit.max(0) as usize);

        Ok(StaleBatch::from_rows(rows))
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> AppResult<TransitionOutcome> {
        LedgerRepository::validate_state_transition(from, to)?;
        self.before_write(id)?;

        let mut rows = self.rows.lock();
        match rows.get_mut(&id) {
            None => Ok(TransitionOutcome::NotFound),
            Some(row) if row.status != from => Ok(TransitionOutcome::AlreadyChanged),
            Some(row) => {
                row.status = to;
                Ok(TransitionOutcome::Applied)
            }
        }
    }

    async fn transition_with_audit(
        &self,
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
        entry: NewAuditEntry,
    ) -> AppResult<TransitionOutcome> {
        LedgerRepository::validate_state_transition(from, to)?;
        let fault = self.before_write(id)?;

        // Row lock held across both writes, like the database transaction
        let mut rows = self.rows.lock();
        match rows.get_mut(&id) {
            None => Ok(TransitionOutcome::NotFound),
            Some(row) if row.status != from => Ok(TransitionOutcome::AlreadyChanged),
            Some(_) if fault == Some(Fault::Audit) => Err(SweepError::AuditWriteFailed {
                id,
                message: "injected audit failure".to_string(),
            }
            .into()),
            Some(row) => {
                row.status = to;
                self.store_audit(entry);
                Ok(TransitionOutcome::Applied)
            }
        }
    }
}

#[async_trait]
impl AuditSink for MemoryLedger {
    async fn append(&self, entry: NewAuditEntry) -> AppResult<AuditEntry> {
        self.check_available()?;
        Ok(self.store_audit(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_compare_and_set_loses_second_writer() {
        let ledger = MemoryLedger::new();
        let id = ledger.insert(
            TransactionKind::AddDomain,
            Some("acct"),
            Some("example.com"),
            Utc::now(),
        );

        let first = ledger
            .transition_status(id, TransactionStatus::Pending, TransactionStatus::Success)
            .await
            .unwrap();
        let second = ledger
            .transition_status(id, TransactionStatus::Pending, TransactionStatus::Failed)
            .await
            .unwrap();
        let missing = ledger
            .transition_status(Uuid::new_v4(), TransactionStatus::Pending, TransactionStatus::Failed)
            .await
            .unwrap();

        assert_eq!(first, TransitionOutcome::Applied);
        assert_eq!(second, TransitionOutcome::AlreadyChanged);
        assert_eq!(missing, TransitionOutcome::NotFound);
        assert_eq!(ledger.status_of(id), Some(TransactionStatus::Success));
    }

    #[tokio::test]
    async fn test_select_stale_filters_and_orders() {
        let ledger = MemoryLedger::new();
        let now = Utc::now();
        let older = ledger.insert(TransactionKind::AddDomain, Some("a"), Some("old.com"), now - Duration::minutes(30));
        let newer = ledger.insert(TransactionKind::AddDomain, Some("a"), Some("mid.com"), now - Duration::minutes(20));
        ledger.insert(TransactionKind::AddDomain, Some("a"), Some("fresh.com"), now);
        ledger.insert(TransactionKind::Topup, Some("a"), Some("topup"), now - Duration::hours(1));

        let batch = ledger
            .select_stale(TransactionKind::AddDomain, now - Duration::minutes(10), 10)
            .await
            .unwrap();

        let ids: Vec<Uuid> = batch.candidates.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![older, newer]);
    }

    fn entry_for(id: Uuid) -> NewAuditEntry {
        NewAuditEntry {
            actor_id: None,
            action: AuditAction::ZombieRollback,
            target_type: "transaction".to_string(),
            target_id: id,
            details: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_transition_with_audit_is_all_or_nothing() {
        let ledger = MemoryLedger::new();
        let ok = ledger.insert(TransactionKind::AddDomain, Some("a"), Some("ok.com"), Utc::now());
        let broken = ledger.insert(TransactionKind::AddDomain, Some("a"), Some("broken.com"), Utc::now());
        ledger.inject(broken, Fault::Audit);

        let applied = ledger
            .transition_with_audit(ok, TransactionStatus::Pending, TransactionStatus::Failed, entry_for(ok))
            .await
            .unwrap();
        let repeat = ledger
            .transition_with_audit(ok, TransactionStatus::Pending, TransactionStatus::Failed, entry_for(ok))
            .await
            .unwrap();
        let failed = ledger
            .transition_with_audit(broken, TransactionStatus::Pending, TransactionStatus::Failed, entry_for(broken))
            .await;

        assert_eq!(applied, TransitionOutcome::Applied);
        assert_eq!(repeat, TransitionOutcome::AlreadyChanged);
        assert_eq!(ledger.audit_for(ok).len(), 1);
        assert!(matches!(
            failed,
            Err(AppError::Sweep(SweepError::AuditWriteFailed { .. }))
        ));
        assert_eq!(ledger.status_of(broken), Some(TransactionStatus::Pending));
        assert!(ledger.audit_for(broken).is_empty());
    }

    #[tokio::test]
    async fn test_append_is_standalone() {
        let ledger = MemoryLedger::new();
        let id = Uuid::new_v4();

        let stored = ledger.append(entry_for(id)).await.unwrap();

        assert_eq!(stored.target_id, id);
        assert_eq!(ledger.audit_entries().len(), 1);
    }
}
