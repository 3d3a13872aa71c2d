use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::traits::{AuthorityClient, LastOrderStatus};
use crate::error::{AppError, AppResult, VerificationError};

/// Order states the authority uses for a certificate that was provisioned
const ISSUED_STATES: [&str; 3] = ["issued", "active", "completed"];

/// Error codes the authority puts in a 404 body when it looked and found nothing
const ACCOUNT_NOT_FOUND: &str = "account_not_found";
const ORDER_NOT_FOUND: &str = "order_not_found";

/// Connection settings for the certificate authority API
#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Per HTTP request, not per verification call
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(3),
            max_retries: 2,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

/// Response from the domain listing endpoint
#[derive(Debug, Deserialize)]
pub struct DomainListResponse {
    #[serde(default)]
    pub domains: Vec<DomainEntry>,
}

#[derive(Debug, Deserialize)]
pub struct DomainEntry {
    pub name: String,
}

/// Response from the last-order endpoint
#[derive(Debug, Deserialize)]
pub struct LastOrderResponse {
    pub status: String,
    #[serde(default)]
    pub order_id: Option<String>,
}

/// Error body the authority sends with 4xx responses
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
}

/// Keep remote bodies short in errors and logs
fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}

/// HTTP client for the external certificate authority
///
/// Constructed explicitly and injected; nothing here is process-global.
pub struct CertificateAuthorityClient {
    config: AuthorityConfig,
    base_url: Url,
    http: Client,
}

impl CertificateAuthorityClient {
    pub fn new(config: AuthorityConfig) -> AppResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| AppError::Config(format!("Invalid AUTHORITY_BASE_URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Config(format!(
                "AUTHORITY_BASE_URL cannot be used as a base: {}",
                config.base_url
            )));
        }

        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            config,
            base_url,
            http,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, VerificationError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| VerificationError::Decode("base URL has no path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Exponential backoff with up to 50% jitter
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.config.retry_backoff.as_millis() as u64;
        let exp = base.saturating_mul(1u64 << attempt.min(6));
        let jitter = if exp > 1 {
            rand::rng().random_range(0..=exp / 2)
        } else {
            0
        };
        Duration::from_millis(exp + jitter)
    }

    async fn send_once(&self, call: &'static str, url: &Url) -> Result<Response, VerificationError> {
        let mut request = self.http.get(url.clone());
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                VerificationError::Timeout {
                    call,
                    after_ms: self.config.request_timeout.as_millis() as u64,
                }
            } else {
                VerificationError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(VerificationError::Remote {
            status: status.as_u16(),
            message: snippet(&body),
        })
    }

    /// A 404 only counts as an answer when the authority itself says what
    /// it could not find. Anything else (a route miss behind a proxy, a
    /// wrong base path) is an error, never evidence of absence.
    async fn confirm_not_found(
        response: Response,
        accepted: &[&str],
    ) -> Result<String, VerificationError> {
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(error) if accepted.contains(&error.code.as_str()) => Ok(error.code),
            _ => Err(VerificationError::Remote {
                status: StatusCode::NOT_FOUND.as_u16(),
                message: snippet(&body),
            }),
        }
    }

    /// GET with bounded retries on transient failures.
    ///
    /// Returns 2xx and 404 responses; everything else is an error.
    async fn get_with_retry(&self, call: &'static str, url: Url) -> Result<Response, VerificationError> {
        let mut attempt = 0;
        loop {
            match self.send_once(call, &url).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.backoff(attempt);
                    warn!(
                        call,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Authority call failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl AuthorityClient for CertificateAuthorityClient {
    async fn verify_exists(
        &self,
        account_ref: &str,
        subject_ref: &str,
    ) -> Result<bool, VerificationError> {
        let url = self.endpoint(&["accounts", account_ref, "domains"])?;
        let response = self.get_with_retry("verify_exists", url).await?;

        // Unknown account on the listing side just means "not listed";
        // the order lookup gets the final word.
        if response.status() == StatusCode::NOT_FOUND {
            Self::confirm_not_found(response, &[ACCOUNT_NOT_FOUND]).await?;
            debug!(account_ref, "Account not present in domain listing");
            return Ok(false);
        }

        let listing: DomainListResponse = response
            .json()
            .await
            .map_err(|e| VerificationError::Decode(e.to_string()))?;

        Ok(listing
            .domains
            .iter()
            .any(|d| d.name.trim().eq_ignore_ascii_case(subject_ref.trim())))
    }

    async fn get_last_status(
        &self,
        account_ref: &str,
        subject_ref: &str,
    ) -> Result<LastOrderStatus, VerificationError> {
        let mut url = self.endpoint(&["accounts", account_ref, "orders", "last"])?;
        url.query_pairs_mut().append_pair("domain", subject_ref);

        let response = self.get_with_retry("get_last_status", url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            let code =
                Self::confirm_not_found(response, &[ACCOUNT_NOT_FOUND, ORDER_NOT_FOUND]).await?;
            debug!(account_ref, subject_ref, code = %code, "No order on record");
            return Ok(LastOrderStatus::NotFound);
        }

        let order: LastOrderResponse = response
            .json()
            .await
            .map_err(|e| VerificationError::Decode(e.to_string()))?;

        let status = order.status.trim().to_ascii_lowercase();
        debug!(
            account_ref,
            subject_ref,
            order_id = ?order.order_id,
            status = %status,
            "Last order status"
        );

        Ok(LastOrderStatus::Found {
            issued: ISSUED_STATES.contains(&status.as_str()),
            status,
        })
    }
}
