//! Auth and checkout doubles.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Mutex;

use crate::{
    app_error::{AppError, AppResult},
    ports::{
        auth::{AuthProvider, AuthUser},
        checkout::{CheckoutGateway, CheckoutRequest, CheckoutSession},
    },
    test_utils::test_user_id,
};

pub struct StaticAuthProvider {
    pub user: Option<AuthUser>,
    pub token: Option<String>,
}

impl StaticAuthProvider {
    /// [`test_user_id`] with token `test-token`.
    pub fn signed_in() -> Self {
        Self {
            user: Some(AuthUser {
                id: test_user_id(),
                email: Some("user@example.com".to_string()),
            }),
            token: Some("test-token".to_string()),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            user: None,
            token: None,
        }
    }
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    async fn current_user(&self) -> AppResult<Option<AuthUser>> {
        Ok(self.user.clone())
    }

    async fn access_token(&self) -> AppResult<Option<SecretString>> {
        Ok(self.token.clone().map(SecretString::from))
    }
}

#[derive(Default)]
pub struct MockCheckoutGateway {
    url: Mutex<Option<String>>,
    failure: Mutex<Option<AppError>>,
    requests: Mutex<Vec<CheckoutRequest>>,
    tokens: Mutex<Vec<String>>,
}

impl MockCheckoutGateway {
    pub fn returning(url: Option<String>) -> Self {
        Self {
            url: Mutex::new(url),
            ..Self::default()
        }
    }

    pub fn set_url(&self, url: Option<String>) {
        *self.url.lock().unwrap() = url;
    }

    pub fn fail_with(&self, err: AppError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckoutGateway for MockCheckoutGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
        access_token: &SecretString,
    ) -> AppResult<CheckoutSession> {
        self.requests.lock().unwrap().push(request.clone());
        self.tokens
            .lock()
            .unwrap()
            .push(access_token.expose_secret().to_string());

        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(CheckoutSession {
            url: self.url.lock().unwrap().clone(),
        })
    }
}
