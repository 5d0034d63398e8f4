use std::{fs::File, sync::Arc};

use anyhow::Context;
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    adapters::supabase::{
        SupabaseClient, auth::SupabaseAuth, checkout::SupabaseCheckoutGateway,
        realtime::SupabaseRealtimeFeed, rest_store::SupabaseRestStore,
    },
    domain::entities::plan::PlanCatalog,
    infra::{app_state::AppState, config::AppConfig, http_client::build_client},
    ports::{
        auth::AuthProvider, change_feed::ChangeFeed, checkout::CheckoutGateway,
        subscription_store::SubscriptionStore,
    },
    use_cases::{subscription_management::SubscriptionManager, subscription_tracker::SubscriptionTracker},
};

pub fn init_app_state(config: AppConfig) -> anyhow::Result<AppState> {
    let catalog = load_catalog(&config)?;

    let client = Arc::new(SupabaseClient::new(
        build_client(),
        config.supabase_url.clone(),
        SecretString::new(config.supabase_anon_key.expose_secret().into()),
    ));
    let auth: Arc<dyn AuthProvider> = Arc::new(SupabaseAuth::new(
        client.clone(),
        config
            .supabase_access_token
            .as_ref()
            .map(|t| SecretString::new(t.expose_secret().into())),
    ));
    let store: Arc<dyn SubscriptionStore> = Arc::new(SupabaseRestStore::new(
        client.clone(),
        auth.clone(),
        config.subscriptions_view.clone(),
    ));
    let feed: Arc<dyn ChangeFeed> = Arc::new(SupabaseRealtimeFeed::new(
        client.clone(),
        auth.clone(),
        config.realtime_config(),
    ));
    let checkout: Arc<dyn CheckoutGateway> = Arc::new(SupabaseCheckoutGateway::new(client));

    let tracker = SubscriptionTracker::new(
        store.clone(),
        feed,
        Arc::new(catalog),
        config.tracker_config(),
    );
    let manager = SubscriptionManager::new(
        tracker.clone(),
        store,
        checkout,
        auth.clone(),
        config.management_config(),
    );

    Ok(AppState {
        config: Arc::new(config),
        auth,
        tracker,
        manager: Arc::new(manager),
    })
}

fn load_catalog(config: &AppConfig) -> anyhow::Result<PlanCatalog> {
    let Some(path) = config.plan_catalog_path.as_ref() else {
        warn!("PLAN_CATALOG_PATH not set; plan names and amounts come from subscription rows only");
        return Ok(PlanCatalog::default());
    };

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read plan catalog {}", path.display()))?;
    let catalog = PlanCatalog::from_json(&json)?;
    if let Err(problems) = catalog.validate() {
        anyhow::bail!("invalid plan catalog: {}", problems.join("; "));
    }
    info!(plans = catalog.plans().len(), "plan catalog loaded");
    Ok(catalog)
}

pub fn init_tracing(log_json_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "ossideas_sync=info".into());

    // Console (pretty logs)
    let console_layer = fmt::layer().with_target(false).with_level(true).pretty();

    // File (structured JSON logs), only when asked for
    let json_layer = match log_json_path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot create log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .json()
                    .with_writer(file)
                    .with_current_span(true)
                    .with_span_list(true),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
    Ok(())
}
