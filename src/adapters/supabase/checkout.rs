use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::{debug, error};

use crate::{
    adapters::supabase::{SupabaseClient, error_message, read_body},
    app_error::{AppError, AppResult},
    ports::checkout::{CheckoutGateway, CheckoutRequest, CheckoutSession},
};

const CHECKOUT_FUNCTION: &str = "stripe-checkout";

pub struct SupabaseCheckoutGateway {
    client: Arc<SupabaseClient>,
}

impl SupabaseCheckoutGateway {
    pub fn new(client: Arc<SupabaseClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CheckoutGateway for SupabaseCheckoutGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
        access_token: &SecretString,
    ) -> AppResult<CheckoutSession> {
        debug!(price_id = %request.price_id, "sending checkout request");

        let response = self
            .client
            .post(self.client.function_url(CHECKOUT_FUNCTION)?, Some(access_token))
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("checkout request failed: {}", e)))?;

        let (status, body) = read_body(response).await?;
        if !status.is_success() {
            error!(%status, body = %body, "checkout session creation failed");
            return Err(AppError::Gateway(error_message(status, &body)));
        }

        serde_json::from_str(&body)
            .map_err(|e| AppError::InvalidPayload(format!("invalid checkout response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use crate::ports::checkout::{CheckoutMode, CheckoutRequest, CheckoutSession, CheckoutUrls};

    #[test]
    fn request_body_matches_function_contract() {
        let urls = CheckoutUrls {
            success_url: "https://app.test/success?session_id={CHECKOUT_SESSION_ID}".into(),
            cancel_url: "https://app.test/pricing".into(),
        };
        let request = CheckoutRequest::subscription("p2", &urls);

        assert_eq!(request.mode, CheckoutMode::Subscription);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "price_id": "p2",
                "mode": "subscription",
                "success_url": "https://app.test/success?session_id={CHECKOUT_SESSION_ID}",
                "cancel_url": "https://app.test/pricing",
            })
        );
    }

    #[test]
    fn response_without_url_decodes() {
        let session: CheckoutSession = serde_json::from_str(r#"{"sessionId": "cs_1"}"#).unwrap();
        assert_eq!(session.url, None);
    }
}
