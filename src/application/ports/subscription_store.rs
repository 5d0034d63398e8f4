use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::subscription::{Subscription, SubscriptionId},
};

/// Backend acknowledgement of a mutation. The row itself changes asynchronously.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationReceipt {
    #[serde(default)]
    pub message: Option<String>,
}

/// Query layer over the subscriptions table.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Most recent active row for the user; `Ok(None)` when there is none.
    async fn fetch_current(&self, user_id: Uuid) -> AppResult<Option<Subscription>>;

    async fn change_plan(
        &self,
        subscription_id: &SubscriptionId,
        new_price_id: &str,
    ) -> AppResult<MutationReceipt>;

    async fn cancel_at_period_end(
        &self,
        subscription_id: &SubscriptionId,
    ) -> AppResult<MutationReceipt>;

    async fn reactivate(&self, subscription_id: &SubscriptionId) -> AppResult<MutationReceipt>;
}
