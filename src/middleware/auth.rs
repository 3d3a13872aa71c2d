use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::api::handler::AppState;
use crate::error::AppError;

/// Bearer-token guard for the cron trigger.
///
/// Runs before the handler, so a rejected request does no work at all.
pub async fn require_cron_secret(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.cron_secret.as_deref() else {
        warn!("CRON_SECRET not configured, rejecting sweep trigger");
        return Err(AppError::Unauthorized);
    };

    let provided = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match provided {
        Some(token) if secrets_match(token, expected) => Ok(next.run(req).await),
        Some(_) => {
            warn!("Sweep trigger rejected: bearer token mismatch");
            Err(AppError::Unauthorized)
        }
        None => {
            warn!("Sweep trigger rejected: missing bearer token");
            Err(AppError::Unauthorized)
        }
    }
}

/// Exact match, compared in constant time
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    provided.len() == expected.len() && bool::from(provided.as_bytes().ct_eq(expected.as_bytes()))
}
