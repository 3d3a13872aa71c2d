use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::VerificationError;

/// Outcome of the last-order lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum LastOrderStatus {
    Found { issued: bool, status: String },
    NotFound,
}

/// Read-only view of the external certificate authority
///
/// Implementations must report transport and remote failures as
/// `VerificationError`, never as a negative answer.
#[async_trait]
pub trait AuthorityClient: Send + Sync {
    /// Cache-backed listing check. Fast but may lag.
    async fn verify_exists(
        &self,
        account_ref: &str,
        subject_ref: &str,
    ) -> Result<bool, VerificationError>;

    /// Authoritative order lookup. Slower and rate limited.
    async fn get_last_status(
        &self,
        account_ref: &str,
        subject_ref: &str,
    ) -> Result<LastOrderStatus, VerificationError>;
}
