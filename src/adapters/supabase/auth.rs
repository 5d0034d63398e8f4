use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::{
    adapters::supabase::{SupabaseClient, error_message, read_body},
    app_error::{AppError, AppResult},
    ports::auth::{AuthProvider, AuthUser},
};

/// Session from a configured access token, resolved against `auth/v1/user`.
pub struct SupabaseAuth {
    client: Arc<SupabaseClient>,
    access_token: Option<SecretString>,
}

impl SupabaseAuth {
    pub fn new(client: Arc<SupabaseClient>, access_token: Option<SecretString>) -> Self {
        Self {
            client,
            access_token,
        }
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn current_user(&self) -> AppResult<Option<AuthUser>> {
        let Some(token) = self.access_token.as_ref() else {
            return Ok(None);
        };

        let response = self
            .client
            .get(self.client.endpoint("auth/v1/user")?, Some(token))
            .send()
            .await?;

        let (status, body) = read_body(response).await?;
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            debug!(%status, "access token rejected; treating as signed out");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AppError::Gateway(error_message(status, &body)));
        }

        let user = serde_json::from_str(&body)
            .map_err(|e| AppError::InvalidPayload(format!("invalid auth user: {}", e)))?;
        Ok(Some(user))
    }

    async fn access_token(&self) -> AppResult<Option<SecretString>> {
        Ok(self
            .access_token
            .as_ref()
            .map(|t| SecretString::from(t.expose_secret().to_string())))
    }
}
