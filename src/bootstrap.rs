use std::{sync::Arc, time::Duration};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::{info, warn};
use crate::{
    api::handler::AppState,
    authority::CertificateAuthorityClient,
    config::Config,
    error::AppResult,
    ledger::LedgerRepository,
    sweeper::{ReconciliationEngine, SweepScheduler},
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    // Database pool
    let pool = initialize_database(&config.database_url).await?;

    // Ledger doubles as the audit sink so a status change and its audit
    // entry commit in one database transaction
    let ledger = Arc::new(LedgerRepository::new(pool));

    // Authority client is built here and injected, never global
    let authority_config = config.authority_config();
    info!("🔗 Certificate authority at {}", authority_config.base_url);
    let authority = Arc::new(CertificateAuthorityClient::new(authority_config)?);

    let engine = Arc::new(ReconciliationEngine::new(ledger, authority));
    let sweep_config = config.sweep_config();
    info!(
        "✅ Reconciliation engine ready (staleness {}s, batch {}, concurrency {})",
        sweep_config.staleness.num_seconds(),
        sweep_config.batch_size,
        sweep_config.concurrency
    );

    let cron_secret = config.cron_secret().map(Arc::<str>::from);
    if cron_secret.is_none() {
        warn!("⚠️  CRON_SECRET not set - sweep trigger endpoint will reject all requests");
    }

    if let Some(every) = config.sweep_interval() {
        SweepScheduler::new(engine.clone(), sweep_config.clone(), every).start();
        info!("✅ In-process sweep scheduler started (every {}s)", every.as_secs());
    }

    Ok(AppState {
        engine,
        sweep_config,
        cron_secret,
    })
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("✓ Database pool configured: 20 max connections");

    // Run migrations
    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
