use axum::{extract::State, Json};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use super::models::HealthResponse;
use crate::{
    error::AppResult,
    sweeper::{ReconciliationEngine, SweepConfig, SweepRunSummary},
};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReconciliationEngine>,
    pub sweep_config: SweepConfig,
    /// `None` keeps the trigger closed
    pub cron_secret: Option<Arc<str>>,
}

/// Liveness probe
/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        timestamp: Utc::now(),
    })
}

/// Run one sweep and report what it did
/// POST /api/v1/cron/sweep
///
/// - Authorized by `require_cron_secret` before this runs
/// - A store outage aborts with 500 and no summary
pub async fn trigger_sweep(State(state): State<AppState>) -> AppResult<Json<SweepRunSummary>> {
    info!("🧹 Sweep triggered via cron endpoint");

    let summary = state.engine.run_sweep(&state.sweep_config).await?;

    Ok(Json(summary))
}
