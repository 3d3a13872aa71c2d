pub mod auth;

pub use auth::require_cron_secret;
