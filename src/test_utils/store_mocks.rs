//! In-memory subscription store.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::subscription::{Subscription, SubscriptionId},
    ports::subscription_store::{MutationReceipt, SubscriptionStore},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedMutation {
    ChangePlan(SubscriptionId, String),
    Cancel(SubscriptionId),
    Reactivate(SubscriptionId),
}

/// Rows are read when a fetch is issued; a queued delay then holds the response back.
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    pub rows: Mutex<Vec<Subscription>>,
    fetch_calls: AtomicUsize,
    fail_fetches: AtomicBool,
    fetch_delays: Mutex<VecDeque<Duration>>,
    mutations: Mutex<Vec<RecordedMutation>>,
    rejection: Mutex<Option<String>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Subscription>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    pub fn set_rows(&self, rows: Vec<Subscription>) {
        *self.rows.lock().unwrap() = rows;
    }

    pub fn set_fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    /// Delays the next not-yet-delayed fetch by `delay`.
    pub fn push_fetch_delay(&self, delay: Duration) {
        self.fetch_delays.lock().unwrap().push_back(delay);
    }

    /// Makes every following mutation answer `{success: false, error}`.
    pub fn reject_mutations(&self, error: &str) {
        *self.rejection.lock().unwrap() = Some(error.to_string());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn mutations(&self) -> Vec<RecordedMutation> {
        self.mutations.lock().unwrap().clone()
    }

    fn record(&self, mutation: RecordedMutation) -> AppResult<MutationReceipt> {
        if let Some(error) = self.rejection.lock().unwrap().clone() {
            return Err(AppError::Rejected(error));
        }
        self.mutations.lock().unwrap().push(mutation);
        Ok(MutationReceipt::default())
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn fetch_current(&self, user_id: Uuid) -> AppResult<Option<Subscription>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let result = if self.fail_fetches.load(Ordering::SeqCst) {
            Err(AppError::Database("connection reset".to_string()))
        } else {
            let rows = self.rows.lock().unwrap();
            Ok(Subscription::select_current(rows.iter().filter(|s| s.user_id == user_id)).cloned())
        };

        let delay = self.fetch_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay.filter(|d| !d.is_zero()) {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn change_plan(
        &self,
        subscription_id: &SubscriptionId,
        new_price_id: &str,
    ) -> AppResult<MutationReceipt> {
        self.record(RecordedMutation::ChangePlan(
            subscription_id.clone(),
            new_price_id.to_string(),
        ))
    }

    async fn cancel_at_period_end(
        &self,
        subscription_id: &SubscriptionId,
    ) -> AppResult<MutationReceipt> {
        self.record(RecordedMutation::Cancel(subscription_id.clone()))
    }

    async fn reactivate(&self, subscription_id: &SubscriptionId) -> AppResult<MutationReceipt> {
        self.record(RecordedMutation::Reactivate(subscription_id.clone()))
    }
}
