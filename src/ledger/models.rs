use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::BigDecimal, Type};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Transaction status enum
///
/// Only `Pending -> Success` and `Pending -> Failed` are written by the sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "transaction_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Refunded => "refunded",
        }
    }
}

/// Kind of side-effecting operation a ledger entry was opened for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "transaction_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    AddDomain,
    RenewDomain,
    Topup,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::AddDomain => "add_domain",
            TransactionKind::RenewDomain => "renew_domain",
            TransactionKind::Topup => "topup",
        }
    }
}

/// Ledger entry for one side-effecting call against the authority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub account_ref: String,
    pub subject_ref: String,
    pub kind: TransactionKind,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: rust_decimal::Decimal,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

/// Raw candidate row as it comes back from the LEFT JOIN.
///
/// Converted into a [`TransactionRecord`] at the store boundary; the engine
/// never sees this shape.
#[derive(Debug, Clone, FromRow)]
pub struct CandidateRow {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub amount: BigDecimal,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub account_ref: Option<String>,
    pub subject_ref: Option<String>,
}

impl CandidateRow {
    /// `None` when the account or domain join is missing or blank
    pub fn into_record(self) -> Option<TransactionRecord> {
        let account_ref = non_blank(self.account_ref)?;
        let subject_ref = non_blank(self.subject_ref)?;
        let amount = rust_decimal::Decimal::from_str(&self.amount.to_string()).ok()?;

        Some(TransactionRecord {
            id: self.id,
            account_ref,
            subject_ref,
            kind: self.kind,
            amount,
            status: self.status,
            created_at: self.created_at,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Result of a stale-candidate query
#[derive(Debug, Clone, Default)]
pub struct StaleBatch {
    /// Fully joined records, oldest first
    pub candidates: Vec<TransactionRecord>,
    /// Ids selected by the query whose join data was missing
    pub incomplete: Vec<Uuid>,
}

impl StaleBatch {
    pub fn from_rows(rows: Vec<CandidateRow>) -> Self {
        let mut batch = StaleBatch::default();
        for row in rows {
            let id = row.id;
            match row.into_record() {
                Some(record) => batch.candidates.push(record),
                None => batch.incomplete.push(id),
            }
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.candidates.len() + self.incomplete.len()
    }
}

/// Outcome of a compare-and-set status write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// The row exists but is no longer in the expected status
    AlreadyChanged,
    NotFound,
}

/// Audit action enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "audit_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ZombieCommit,
    ZombieRollback,
}

/// Audit entry before it is persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuditEntry {
    /// `None` for system actions
    pub actor_id: Option<Uuid>,
    pub action: AuditAction,
    pub target_type: String,
    pub target_id: Uuid,
    pub details: serde_json::Value,
}

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: AuditAction,
    pub target_type: String,
    pub target_id: Uuid,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
