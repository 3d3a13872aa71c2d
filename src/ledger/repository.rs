use super::models::*;
use super::traits::{AuditSink, LedgerStore};
use crate::error::{AppResult, SweepError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::debug;
use uuid::Uuid;

/// Ledger repository - THE source of truth for transaction state
pub struct LedgerRepository {
    pub pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Validate status transitions the sweeper is allowed to write
    /// Valid transitions:
    /// - Pending → Success, Failed
    /// - Everything else is owned by other flows (e.g. Success → Refunded)
    pub fn validate_state_transition(
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> AppResult<()> {
        match (from, to) {
            (TransactionStatus::Pending, TransactionStatus::Success)
            | (TransactionStatus::Pending, TransactionStatus::Failed) => Ok(()),
            _ => Err(SweepError::TransitionRejected { from, to }.into()),
        }
    }

    /// Conditional status write followed by an existence probe when it
    /// matched nothing.
    async fn compare_and_set(
        conn: &mut PgConnection,
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> AppResult<TransitionOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(TransitionOutcome::Applied);
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM transactions WHERE id = $1)")
                .bind(id)
                .fetch_one(&mut *conn)
                .await?;

        if exists {
            Ok(TransitionOutcome::AlreadyChanged)
        } else {
            Ok(TransitionOutcome::NotFound)
        }
    }

    async fn insert_audit(
        conn: &mut PgConnection,
        entry: NewAuditEntry,
    ) -> Result<AuditEntry, sqlx::Error> {
        sqlx::query_as::<_, AuditEntry>(
            r#"
            INSERT INTO audit_logs (actor_id, action, target_type, target_id, details)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, actor_id, action, target_type, target_id, details, created_at
            "#,
        )
        .bind(entry.actor_id)
        .bind(entry.action)
        .bind(entry.target_type)
        .bind(entry.target_id)
        .bind(entry.details)
        .fetch_one(&mut *conn)
        .await
    }
}

#[async_trait]
impl LedgerStore for LedgerRepository {
    async fn select_stale(
        &self,
        kind: TransactionKind,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<StaleBatch> {
        // LEFT JOIN so rows with a dangling account/domain still surface and
        // get reported as incomplete instead of silently disappearing.
        let rows = sqlx::query_as::<_, CandidateRow>(
            r#"
            SELECT
                t.id, t.kind, t.amount, t.status, t.created_at,
                a.external_account_id AS account_ref,
                d.name AS subject_ref
            FROM transactions t
            LEFT JOIN reseller_accounts a ON a.id = t.account_id
            LEFT JOIN domains d ON d.id = t.domain_id
            WHERE t.status = $1 AND t.kind = $2 AND t.created_at <= $3
            ORDER BY t.created_at ASC, t.id ASC
            LIMIT $4
            "#,
        )
        .bind(TransactionStatus::Pending)
        .bind(kind)
        .bind(older_than)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        debug!("Selected {} stale {} rows", rows.len(), kind.as_str());

        Ok(StaleBatch::from_rows(rows))
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> AppResult<TransitionOutcome> {
        Self::validate_state_transition(from, to)?;

        let mut conn = self.pool.acquire().await?;
        Self::compare_and_set(&mut *conn, id, from, to).await
    }

    async fn transition_with_audit(
        &self,
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
        entry: NewAuditEntry,
    ) -> AppResult<TransitionOutcome> {
        Self::validate_state_transition(from, to)?;

        let mut tx = self.pool.begin().await?;

        let outcome = Self::compare_and_set(&mut *tx, id, from, to).await?;
        if outcome != TransitionOutcome::Applied {
            tx.rollback().await?;
            return Ok(outcome);
        }

        // Dropping `tx` on the error path rolls the status change back
        let stored = Self::insert_audit(&mut *tx, entry)
            .await
            .map_err(|e| SweepError::AuditWriteFailed {
                id,
                message: e.to_string(),
            })?;

        tx.commit().await?;

        debug!(audit_id = %stored.id, "Transition and audit entry committed");
        Ok(TransitionOutcome::Applied)
    }
}

#[async_trait]
impl AuditSink for LedgerRepository {
    async fn append(&self, entry: NewAuditEntry) -> AppResult<AuditEntry> {
        let mut conn = self.pool.acquire().await?;
        Ok(Self::insert_audit(&mut *conn, entry).await?)
    }
}
