// Stuck-transaction reconciliation
pub mod engine;
pub mod models;
pub mod scheduler;

pub use engine::ReconciliationEngine;
pub use models::{SweepConfig, SweepRunSummary};
pub use scheduler::SweepScheduler;
