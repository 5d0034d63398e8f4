use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

use crate::{
    adapters::supabase::{SupabaseClient, error_message, read_body},
    app_error::{AppError, AppResult},
    domain::entities::subscription::{Subscription, SubscriptionId},
    ports::{
        auth::AuthProvider,
        subscription_store::{MutationReceipt, SubscriptionStore},
    },
};

/// Reads the subscription view over PostgREST and mutates through edge functions,
/// authenticated as the signed-in user.
pub struct SupabaseRestStore {
    client: Arc<SupabaseClient>,
    auth: Arc<dyn AuthProvider>,
    view: String,
}

#[derive(Serialize)]
struct MutationBody<'a> {
    subscription_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_price_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct FunctionReply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl SupabaseRestStore {
    pub fn new(client: Arc<SupabaseClient>, auth: Arc<dyn AuthProvider>, view: String) -> Self {
        Self { client, auth, view }
    }

    async fn invoke(&self, function: &str, body: MutationBody<'_>) -> AppResult<MutationReceipt> {
        let token = self.auth.access_token().await?;
        let response = self
            .client
            .post(self.client.function_url(function)?, token.as_ref())
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("{} request failed: {}", function, e)))?;

        let (status, text) = read_body(response).await?;
        if !status.is_success() {
            error!(%status, function, "subscription function failed");
            return Err(AppError::Rejected(error_message(status, &text)));
        }
        parse_reply(&text)
    }
}

fn parse_reply(text: &str) -> AppResult<MutationReceipt> {
    let reply: FunctionReply = serde_json::from_str(text)
        .map_err(|e| AppError::InvalidPayload(format!("invalid function reply: {}", e)))?;

    if reply.success {
        Ok(MutationReceipt {
            message: reply.message,
        })
    } else {
        Err(AppError::Rejected(
            reply.error.unwrap_or_else(|| "Request failed".to_string()),
        ))
    }
}

#[async_trait]
impl SubscriptionStore for SupabaseRestStore {
    async fn fetch_current(&self, user_id: Uuid) -> AppResult<Option<Subscription>> {
        let token = self.auth.access_token().await?;
        let user_filter = format!("eq.{}", user_id);
        let response = self
            .client
            .get(self.client.rest_url(&self.view)?, token.as_ref())
            .query(&[
                ("select", "*"),
                ("user_id", user_filter.as_str()),
                ("is_active", "eq.true"),
                ("order", "created_at.desc"),
                ("limit", "1"),
            ])
            .send()
            .await?;

        let (status, text) = read_body(response).await?;
        if !status.is_success() {
            return Err(AppError::Database(error_message(status, &text)));
        }

        let rows: Vec<Subscription> = serde_json::from_str(&text)
            .map_err(|e| AppError::InvalidPayload(format!("invalid subscription row: {}", e)))?;
        debug!(%user_id, found = !rows.is_empty(), "fetched current subscription");
        Ok(rows.into_iter().next())
    }

    async fn change_plan(
        &self,
        subscription_id: &SubscriptionId,
        new_price_id: &str,
    ) -> AppResult<MutationReceipt> {
        self.invoke(
            "update-subscription",
            MutationBody {
                subscription_id: subscription_id.as_str(),
                new_price_id: Some(new_price_id),
            },
        )
        .await
    }

    async fn cancel_at_period_end(
        &self,
        subscription_id: &SubscriptionId,
    ) -> AppResult<MutationReceipt> {
        self.invoke(
            "cancel-subscription",
            MutationBody {
                subscription_id: subscription_id.as_str(),
                new_price_id: None,
            },
        )
        .await
    }

    async fn reactivate(&self, subscription_id: &SubscriptionId) -> AppResult<MutationReceipt> {
        self.invoke(
            "reactivate-subscription",
            MutationBody {
                subscription_id: subscription_id.as_str(),
                new_price_id: None,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_reply_keeps_message() {
        let receipt = parse_reply(r#"{"success": true, "message": "Plan updated"}"#).unwrap();
        assert_eq!(receipt.message.as_deref(), Some("Plan updated"));
    }

    #[test]
    fn unsuccessful_reply_is_rejected_verbatim() {
        assert_eq!(
            parse_reply(r#"{"success": false, "error": "Subscription not found"}"#),
            Err(AppError::Rejected("Subscription not found".to_string()))
        );
        assert!(matches!(
            parse_reply(r#"{"oops": 1}"#),
            Err(AppError::Rejected(_))
        ));
        assert!(matches!(
            parse_reply("not json"),
            Err(AppError::InvalidPayload(_))
        ));
    }

    #[test]
    fn mutation_body_omits_missing_price() {
        let body = MutationBody {
            subscription_id: "sub_1",
            new_price_id: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"subscription_id": "sub_1"})
        );
    }
}
