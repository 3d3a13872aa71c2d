use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::traits::{AuthorityClient, LastOrderStatus};
use crate::error::VerificationError;
use crate::ledger::models::TransactionRecord;

/// Which tier produced the verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    Primary,
    Fallback,
}

/// Result of checking one record against the authority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityVerdict {
    pub exists: bool,
    pub source: VerdictSource,
    pub evidence: serde_json::Value,
}

/// Primary listing check, then the order lookup when the listing says no
pub struct TwoTierVerifier {
    client: Arc<dyn AuthorityClient>,
    call_timeout: Duration,
}

impl TwoTierVerifier {
    pub fn new(client: Arc<dyn AuthorityClient>, call_timeout: Duration) -> Self {
        Self {
            client,
            call_timeout,
        }
    }

    async fn bounded<T, F>(&self, call: &'static str, fut: F) -> Result<T, VerificationError>
    where
        F: Future<Output = Result<T, VerificationError>>,
    {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .map_err(|_| VerificationError::Timeout {
                call,
                after_ms: self.call_timeout.as_millis() as u64,
            })?
    }

    pub async fn verify(
        &self,
        record: &TransactionRecord,
    ) -> Result<AuthorityVerdict, VerificationError> {
        let account = record.account_ref.as_str();
        let subject = record.subject_ref.as_str();

        let listed = self
            .bounded("verify_exists", self.client.verify_exists(account, subject))
            .await?;

        if listed {
            return Ok(AuthorityVerdict {
                exists: true,
                source: VerdictSource::Primary,
                evidence: serde_json::json!({
                    "subject": subject,
                    "reason": "listed in authority domain listing",
                }),
            });
        }

        debug!(record_id = %record.id, subject, "Not listed, consulting last order status");

        let last = self
            .bounded("get_last_status", self.client.get_last_status(account, subject))
            .await?;

        let verdict = match last {
            LastOrderStatus::Found { issued: true, status } => AuthorityVerdict {
                exists: true,
                source: VerdictSource::Fallback,
                evidence: serde_json::json!({
                    "subject": subject,
                    "reason": "last order issued but missing from listing",
                    "order_status": status,
                }),
            },
            LastOrderStatus::Found { issued: false, status } => AuthorityVerdict {
                exists: false,
                source: VerdictSource::Fallback,
                evidence: serde_json::json!({
                    "subject": subject,
                    "reason": "not listed and last order not issued",
                    "order_status": status,
                }),
            },
            LastOrderStatus::NotFound => AuthorityVerdict {
                exists: false,
                source: VerdictSource::Fallback,
                evidence: serde_json::json!({
                    "subject": subject,
                    "reason": "not listed and no order found",
                }),
            },
        };

        Ok(verdict)
    }
}
