use std::{path::PathBuf, time::Duration};

use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;
use url::Url;

use crate::{
    adapters::supabase::realtime::RealtimeConfig,
    domain::entities::reconnect_policy::ReconnectPolicy,
    ports::checkout::CheckoutUrls,
    use_cases::{subscription_management::ManagementConfig, subscription_tracker::TrackerConfig},
};

pub struct AppConfig {
    pub supabase_url: Url,
    pub supabase_anon_key: SecretString,
    /// Session token of the signed-in user. Without it nothing is tracked.
    pub supabase_access_token: Option<SecretString>,
    /// Origin the checkout redirects back to.
    pub app_origin: Url,
    pub subscriptions_view: String,
    pub subscriptions_table: String,
    pub poll_interval: Duration,
    pub always_poll: bool,
    pub reconnect_base_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub notification_ttl: Duration,
    pub plan_change_refresh_delay: Duration,
    pub cancel_refresh_delay: Duration,
    pub realtime_join_timeout: Duration,
    pub realtime_heartbeat: Duration,
    /// JSON list of plans; an empty catalog when unset.
    pub plan_catalog_path: Option<PathBuf>,
    pub log_json_path: Option<PathBuf>,
}

impl AppConfig {
    /// Panics when a required variable is missing or malformed.
    pub fn from_env() -> Self {
        let supabase_url: Url = get_env("SUPABASE_URL");
        let supabase_anon_key = SecretString::new(get_env::<String>("SUPABASE_ANON_KEY").into());
        let supabase_access_token = optional_env("SUPABASE_ACCESS_TOKEN")
            .map(|token| SecretString::new(token.into()));
        let app_origin: Url = get_env_default(
            "APP_ORIGIN",
            Url::parse("http://localhost:5173").expect("default origin is a valid url"),
        );

        let subscriptions_view: String =
            get_env_default("SUBSCRIPTIONS_VIEW", "user_subscriptions".to_string());
        let subscriptions_table: String =
            get_env_default("SUBSCRIPTIONS_TABLE", "subscriptions".to_string());

        let poll_interval_ms: u64 = get_env_default("POLL_INTERVAL_MS", 2000);
        let always_poll: bool = get_env_default("ALWAYS_POLL", true);
        let reconnect_base_delay_ms: u64 = get_env_default("RECONNECT_BASE_DELAY_MS", 5000);
        let max_reconnect_attempts: u32 = get_env_default("MAX_RECONNECT_ATTEMPTS", 3);
        let notification_ttl_ms: u64 = get_env_default("NOTIFICATION_TTL_MS", 5000);
        let plan_change_refresh_delay_ms: u64 =
            get_env_default("PLAN_CHANGE_REFRESH_DELAY_MS", 2000);
        let cancel_refresh_delay_ms: u64 = get_env_default("CANCEL_REFRESH_DELAY_MS", 1000);
        let realtime_join_timeout_secs: u64 = get_env_default("REALTIME_JOIN_TIMEOUT_SECS", 10);
        let realtime_heartbeat_secs: u64 = get_env_default("REALTIME_HEARTBEAT_SECS", 25);

        Self {
            supabase_url,
            supabase_anon_key,
            supabase_access_token,
            app_origin,
            subscriptions_view,
            subscriptions_table,
            poll_interval: Duration::from_millis(poll_interval_ms),
            always_poll,
            reconnect_base_delay: Duration::from_millis(reconnect_base_delay_ms),
            max_reconnect_attempts,
            notification_ttl: Duration::from_millis(notification_ttl_ms),
            plan_change_refresh_delay: Duration::from_millis(plan_change_refresh_delay_ms),
            cancel_refresh_delay: Duration::from_millis(cancel_refresh_delay_ms),
            realtime_join_timeout: Duration::from_secs(realtime_join_timeout_secs),
            realtime_heartbeat: Duration::from_secs(realtime_heartbeat_secs),
            plan_catalog_path: optional_env("PLAN_CATALOG_PATH").map(PathBuf::from),
            log_json_path: optional_env("LOG_JSON_PATH").map(PathBuf::from),
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            poll_interval: self.poll_interval,
            always_poll: self.always_poll,
            reconnect: ReconnectPolicy {
                base_delay: self.reconnect_base_delay,
                max_attempts: self.max_reconnect_attempts,
            },
            notification_ttl: self.notification_ttl,
            feed_table: self.subscriptions_table.clone(),
        }
    }

    pub fn management_config(&self) -> ManagementConfig {
        ManagementConfig {
            checkout_urls: checkout_urls(&self.app_origin),
            plan_change_refresh_delay: self.plan_change_refresh_delay,
            cancel_refresh_delay: self.cancel_refresh_delay,
        }
    }

    pub fn realtime_config(&self) -> RealtimeConfig {
        RealtimeConfig {
            join_timeout: self.realtime_join_timeout,
            heartbeat_interval: self.realtime_heartbeat,
        }
    }
}

/// Checkout returns to `/success` with the session id placeholder the provider fills
/// in, and to `/pricing` when abandoned.
pub fn checkout_urls(origin: &Url) -> CheckoutUrls {
    let origin = origin.as_str().trim_end_matches('/');
    CheckoutUrls {
        success_url: format!("{}/success?session_id={{CHECKOUT_SESSION_ID}}", origin),
        cancel_url: format!("{}/pricing", origin),
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
