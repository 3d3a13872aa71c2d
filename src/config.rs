use serde::Deserialize;
use std::time::Duration;

use crate::authority::AuthorityConfig;
use crate::error::{AppError, AppResult};
use crate::sweeper::SweepConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// Shared secret for the cron trigger; unset means the trigger is closed
    pub cron_secret: Option<String>,
    pub authority_base_url: String,
    pub authority_api_key: Option<String>,
    pub authority_request_timeout_ms: u64,
    pub authority_max_retries: u32,
    pub authority_retry_backoff_ms: u64,
    pub sweep_staleness_secs: i64,
    pub sweep_batch_size: usize,
    pub sweep_concurrency: usize,
    pub sweep_call_timeout_ms: u64,
    /// 0 disables the in-process scheduler
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Self::from_source(config::Environment::default())
    }

    fn from_source(env: config::Environment) -> AppResult<Self> {
        let settings = config::Config::builder()
            .set_default("database_url", "postgresql://localhost/backend")?
            .set_default("bind_address", "0.0.0.0:8080")?
            .set_default("authority_base_url", "http://localhost:9000")?
            .set_default("authority_request_timeout_ms", 3000_i64)?
            .set_default("authority_max_retries", 2_i64)?
            .set_default("authority_retry_backoff_ms", 200_i64)?
            .set_default("sweep_staleness_secs", 600_i64)?
            .set_default("sweep_batch_size", 50_i64)?
            .set_default("sweep_concurrency", 4_i64)?
            .set_default("sweep_call_timeout_ms", 5000_i64)?
            .set_default("sweep_interval_secs", 0_i64)?
            .add_source(env)
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        if self.sweep_batch_size == 0 {
            return Err(AppError::Config("SWEEP_BATCH_SIZE must be at least 1".to_string()));
        }
        if self.sweep_concurrency == 0 {
            return Err(AppError::Config("SWEEP_CONCURRENCY must be at least 1".to_string()));
        }
        if self.sweep_staleness_secs < 0 {
            return Err(AppError::Config("SWEEP_STALENESS_SECS cannot be negative".to_string()));
        }
        if self.sweep_call_timeout_ms == 0 {
            return Err(AppError::Config("SWEEP_CALL_TIMEOUT_MS must be positive".to_string()));
        }
        Ok(())
    }

    /// Trimmed secret, `None` when unset or blank
    pub fn cron_secret(&self) -> Option<String> {
        non_blank(self.cron_secret.as_deref())
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            staleness: chrono::Duration::seconds(self.sweep_staleness_secs),
            batch_size: self.sweep_batch_size,
            concurrency: self.sweep_concurrency,
            call_timeout: Duration::from_millis(self.sweep_call_timeout_ms),
        }
    }

    pub fn authority_config(&self) -> AuthorityConfig {
        AuthorityConfig {
            base_url: self.authority_base_url.clone(),
            api_key: non_blank(self.authority_api_key.as_deref()),
            request_timeout: Duration::from_millis(self.authority_request_timeout_ms),
            max_retries: self.authority_max_retries,
            retry_backoff: Duration::from_millis(self.authority_retry_backoff_ms),
        }
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
