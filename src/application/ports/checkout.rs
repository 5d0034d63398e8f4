use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::app_error::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutMode {
    Subscription,
}

/// URLs for checkout redirects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutUrls {
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutRequest {
    pub price_id: String,
    pub mode: CheckoutMode,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutRequest {
    pub fn subscription(price_id: impl Into<String>, urls: &CheckoutUrls) -> Self {
        Self {
            price_id: price_id.into(),
            mode: CheckoutMode::Subscription,
            success_url: urls.success_url.clone(),
            cancel_url: urls.cancel_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutSession {
    #[serde(default)]
    pub url: Option<String>,
}

/// Creates hosted checkout sessions. Payment itself happens elsewhere; the
/// resulting subscription row shows up through the change feed.
#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
        access_token: &SecretString,
    ) -> AppResult<CheckoutSession>;
}
