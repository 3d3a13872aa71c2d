use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::{
    AuditEntry, NewAuditEntry, StaleBatch, TransactionKind, TransactionStatus, TransitionOutcome,
};
use crate::error::AppResult;

/// Durable ledger of side-effecting transactions
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Up to `limit` pending records of `kind` created at or before
    /// `older_than`, oldest first.
    async fn select_stale(
        &self,
        kind: TransactionKind,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<StaleBatch>;

    /// Atomic compare-and-set on status.
    ///
    /// INVARIANT: losing the race returns `AlreadyChanged`, never an error.
    async fn transition_status(
        &self,
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> AppResult<TransitionOutcome>;

    /// Compare-and-set plus the audit entry for it, committed together.
    ///
    /// The entry is written only when the transition is `Applied`. If the
    /// audit write fails the status change is rolled back as well.
    async fn transition_with_audit(
        &self,
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
        entry: NewAuditEntry,
    ) -> AppResult<TransitionOutcome>;
}

/// Append-only audit log
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: NewAuditEntry) -> AppResult<AuditEntry>;
}
