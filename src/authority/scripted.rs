// Scripted authority for engine and verifier tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::traits::{AuthorityClient, LastOrderStatus};
use crate::error::VerificationError;

#[derive(Default)]
pub struct ScriptedAuthority {
    listed: Mutex<HashSet<String>>,
    orders: Mutex<HashMap<String, LastOrderStatus>>,
    listing_failures: Mutex<HashSet<String>>,
    order_failures: Mutex<HashSet<String>>,
    listing_delay: Mutex<Option<Duration>>,
    listing_calls: AtomicUsize,
    order_calls: AtomicUsize,
}

impl ScriptedAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listed(self, subject: &str) -> Self {
        self.listed.lock().insert(subject.to_string());
        self
    }

    pub fn order(self, subject: &str, status: &str, issued: bool) -> Self {
        self.orders.lock().insert(
            subject.to_string(),
            LastOrderStatus::Found {
                issued,
                status: status.to_string(),
            },
        );
        self
    }

    pub fn listing_fails(self, subject: &str) -> Self {
        self.listing_failures.lock().insert(subject.to_string());
        self
    }

    pub fn order_fails(self, subject: &str) -> Self {
        self.order_failures.lock().insert(subject.to_string());
        self
    }

    pub fn slow_listing(self, delay: Duration) -> Self {
        *self.listing_delay.lock() = Some(delay);
        self
    }

    pub fn listing_call_count(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }

    pub fn order_call_count(&self) -> usize {
        self.order_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthorityClient for ScriptedAuthority {
    async fn verify_exists(
        &self,
        _account_ref: &str,
        subject_ref: &str,
    ) -> Result<bool, VerificationError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.listing_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.listing_failures.lock().contains(subject_ref) {
            return Err(VerificationError::Remote {
                status: 502,
                message: "bad gateway".to_string(),
            });
        }
        Ok(self.listed.lock().contains(subject_ref))
    }

    async fn get_last_status(
        &self,
        _account_ref: &str,
        subject_ref: &str,
    ) -> Result<LastOrderStatus, VerificationError> {
        self.order_calls.fetch_add(1, Ordering::SeqCst);

        if self.order_failures.lock().contains(subject_ref) {
            return Err(VerificationError::Transport("connection reset".to_string()));
        }
        Ok(self
            .orders
            .lock()
            .get(subject_ref)
            .cloned()
            .unwrap_or(LastOrderStatus::NotFound))
    }
}
