// Sweep Scheduler - optional in-process trigger
//
// Production deployments call POST /api/v1/cron/sweep from an external
// cron. This loop exists for single-box deployments and local development,
// and is off unless SWEEP_INTERVAL_SECS is set.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use super::engine::ReconciliationEngine;
use super::models::SweepConfig;

/// Runs `run_sweep` on a fixed interval
pub struct SweepScheduler {
    engine: Arc<ReconciliationEngine>,
    config: SweepConfig,
    every: Duration,
}

impl SweepScheduler {
    pub fn new(engine: Arc<ReconciliationEngine>, config: SweepConfig, every: Duration) -> Self {
        Self {
            engine,
            config,
            every,
        }
    }

    /// Start the scheduler (runs in background)
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.every);
            // A slow sweep must not be followed by a burst of catch-up runs
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                match self.engine.run_sweep(&self.config).await {
                    Ok(summary) if summary.swept > 0 => {
                        info!(
                            "🧹 Scheduled sweep: {} swept, {} committed, {} rolled back, {} errors",
                            summary.swept, summary.committed, summary.rolled_back, summary.errors
                        );
                    }
                    Ok(_) => {}
                    Err(e) => error!("❌ Scheduled sweep failed: {}", e),
                }
            }
        })
    }
}
