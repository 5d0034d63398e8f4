use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_error::AppResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Source of the signed-in user. User presence is what starts and stops tracking.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn current_user(&self) -> AppResult<Option<AuthUser>>;

    /// Bearer token for the current session, if any.
    async fn access_token(&self) -> AppResult<Option<SecretString>>;
}
