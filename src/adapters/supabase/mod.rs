//! Supabase implementations of the application ports.
//!
//! PostgREST for reads, edge functions for mutations and checkout, GoTrue for the
//! signed-in user and Realtime (Phoenix channels over WebSocket) for row changes.

pub mod auth;
pub mod checkout;
pub mod realtime;
pub mod rest_store;

use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

use crate::app_error::{AppError, AppResult};

/// Project URL, anon key and the shared HTTP client.
pub struct SupabaseClient {
    http: Client,
    base_url: Url,
    anon_key: SecretString,
}

impl SupabaseClient {
    pub fn new(http: Client, mut base_url: Url, anon_key: SecretString) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            http,
            base_url,
            anon_key,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn anon_key(&self) -> &SecretString {
        &self.anon_key
    }

    pub(crate) fn endpoint(&self, path: &str) -> AppResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::Internal(format!("invalid Supabase endpoint {}: {}", path, e)))
    }

    pub(crate) fn rest_url(&self, relation: &str) -> AppResult<Url> {
        self.endpoint(&format!("rest/v1/{}", relation))
    }

    pub(crate) fn function_url(&self, name: &str) -> AppResult<Url> {
        self.endpoint(&format!("functions/v1/{}", name))
    }

    /// Requests carry the anon key; `bearer` defaults to it when there is no session.
    pub(crate) fn get(&self, url: Url, bearer: Option<&SecretString>) -> RequestBuilder {
        self.authorize(self.http.get(url), bearer)
    }

    pub(crate) fn post(&self, url: Url, bearer: Option<&SecretString>) -> RequestBuilder {
        self.authorize(self.http.post(url), bearer)
    }

    fn authorize(&self, builder: RequestBuilder, bearer: Option<&SecretString>) -> RequestBuilder {
        let token = bearer.unwrap_or(&self.anon_key);
        builder
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(token.expose_secret())
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// Message for a failed response: `{error}` from a JSON body, else the raw text,
/// else `HTTP {status}: {reason}`.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    let message = match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) => Some(body.trim().to_string()),
    };

    message.filter(|m| !m.trim().is_empty()).unwrap_or_else(|| {
        format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        )
    })
}

pub(crate) async fn read_body(response: reqwest::Response) -> AppResult<(StatusCode, String)> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AppError::Transport(format!("failed to read response: {}", e)))?;
    Ok((status, body))
}
