use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ========== RESPONSE MODELS ==========

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: DateTime<Utc>,
}
