use std::sync::Arc;

use crate::{
    infra::config::AppConfig,
    ports::auth::AuthProvider,
    use_cases::{subscription_management::SubscriptionManager, subscription_tracker::SubscriptionTracker},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: Arc<dyn AuthProvider>,
    pub tracker: SubscriptionTracker,
    pub manager: Arc<SubscriptionManager>,
}
