use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::{plan::PlanAction, subscription::SubscriptionId},
    ports::{
        auth::AuthProvider,
        checkout::{CheckoutGateway, CheckoutRequest, CheckoutUrls},
        subscription_store::{MutationReceipt, SubscriptionStore},
    },
    use_cases::subscription_tracker::SubscriptionTracker,
};

#[derive(Debug, Clone)]
pub struct ManagementConfig {
    pub checkout_urls: CheckoutUrls,
    pub plan_change_refresh_delay: Duration,
    pub cancel_refresh_delay: Duration,
}

impl ManagementConfig {
    pub fn new(checkout_urls: CheckoutUrls) -> Self {
        Self {
            checkout_urls,
            plan_change_refresh_delay: Duration::from_millis(2000),
            cancel_refresh_delay: Duration::from_millis(1000),
        }
    }
}

/// Result of a mutating operation. Failures never propagate as errors; they are
/// reported here as strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MutationOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
}

impl MutationOutcome {
    pub fn succeeded(message: Option<String>) -> Self {
        Self {
            success: true,
            message,
            ..Self::default()
        }
    }

    pub fn checkout(url: String) -> Self {
        Self {
            success: true,
            checkout_url: Some(url),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

impl From<AppError> for MutationOutcome {
    fn from(err: AppError) -> Self {
        MutationOutcome::failed(err.to_string())
    }
}

/// Plan mutations for the tracked user. Each successful mutation schedules one
/// delayed refresh on the tracker; the backend applies the change asynchronously.
pub struct SubscriptionManager {
    tracker: SubscriptionTracker,
    store: Arc<dyn SubscriptionStore>,
    checkout: Arc<dyn CheckoutGateway>,
    auth: Arc<dyn AuthProvider>,
    config: ManagementConfig,
}

impl SubscriptionManager {
    pub fn new(
        tracker: SubscriptionTracker,
        store: Arc<dyn SubscriptionStore>,
        checkout: Arc<dyn CheckoutGateway>,
        auth: Arc<dyn AuthProvider>,
        config: ManagementConfig,
    ) -> Self {
        Self {
            tracker,
            store,
            checkout,
            auth,
            config,
        }
    }

    pub fn tracker(&self) -> &SubscriptionTracker {
        &self.tracker
    }

    /// Opens a hosted checkout for `price_id` and returns its URL.
    #[instrument(skip(self))]
    pub async fn subscribe_to_plan(&self, price_id: &str) -> MutationOutcome {
        let _guard = self.tracker.begin_operation();
        match self.create_checkout(price_id).await {
            Ok(url) => {
                info!("checkout session created");
                MutationOutcome::checkout(url)
            }
            Err(err) => {
                warn!(error = %err, "checkout failed");
                err.into()
            }
        }
    }

    async fn create_checkout(&self, price_id: &str) -> AppResult<String> {
        let price_id = required("price id", price_id)?;
        let token = self
            .auth
            .access_token()
            .await?
            .ok_or(AppError::SessionMissing)?;

        let request = CheckoutRequest::subscription(price_id, &self.config.checkout_urls);
        let session = self
            .checkout
            .create_checkout_session(&request, &token)
            .await?;

        session
            .url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| AppError::Gateway("No checkout URL received from server".to_string()))
    }

    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    pub async fn change_plan(
        &self,
        subscription_id: &SubscriptionId,
        new_price_id: &str,
    ) -> MutationOutcome {
        let new_price_id = match required("price id", new_price_id) {
            Ok(id) => id,
            Err(err) => return err.into(),
        };

        let _guard = self.tracker.begin_operation();
        let result = self.store.change_plan(subscription_id, new_price_id).await;
        self.conclude("plan change", result, self.config.plan_change_refresh_delay)
    }

    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    pub async fn cancel_plan(&self, subscription_id: &SubscriptionId) -> MutationOutcome {
        let _guard = self.tracker.begin_operation();
        let result = self.store.cancel_at_period_end(subscription_id).await;
        self.conclude("cancellation", result, self.config.cancel_refresh_delay)
    }

    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    pub async fn reactivate_plan(&self, subscription_id: &SubscriptionId) -> MutationOutcome {
        let _guard = self.tracker.begin_operation();
        let result = self.store.reactivate(subscription_id).await;
        self.conclude("reactivation", result, self.config.cancel_refresh_delay)
    }

    /// Pricing-page action for `price_id` given the tracked subscription.
    #[instrument(skip(self))]
    pub async fn select_plan(&self, price_id: &str) -> MutationOutcome {
        let Some(plan) = self.tracker.catalog().by_price_id(price_id).cloned() else {
            return AppError::InvalidInput(format!("unknown plan price id {}", price_id)).into();
        };
        let current = self.tracker.current();

        match PlanAction::for_plan(&plan, current.as_ref()) {
            PlanAction::Start => self.subscribe_to_plan(&plan.price_id).await,
            PlanAction::Current => {
                MutationOutcome::succeeded(Some(format!("You are already on the {} plan.", plan.name)))
            }
            PlanAction::Reactivate => match current {
                Some(sub) => self.reactivate_plan(&sub.id).await,
                None => self.subscribe_to_plan(&plan.price_id).await,
            },
            PlanAction::Switch => match current {
                Some(sub) => self.change_plan(&sub.id, &plan.price_id).await,
                None => self.subscribe_to_plan(&plan.price_id).await,
            },
        }
    }

    fn conclude(
        &self,
        operation: &str,
        result: AppResult<MutationReceipt>,
        refresh_after: Duration,
    ) -> MutationOutcome {
        match result {
            Ok(receipt) => {
                info!(operation, "subscription mutation accepted");
                self.tracker.schedule_refresh(refresh_after);
                MutationOutcome::succeeded(receipt.message)
            }
            Err(err) => {
                warn!(operation, error = %err, "subscription mutation failed");
                err.into()
            }
        }
    }
}

fn required<'a>(field: &str, value: &'a str) -> AppResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::InvalidInput(format!("{} is required", field)));
    }
    Ok(value)
}
