use std::time::Duration;

use anyhow::bail;
use dotenvy::dotenv;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use ossideas_sync::{
    domain::entities::subscription::SubscriptionId,
    infra::{
        app_state::AppState,
        config::AppConfig,
        setup::{init_app_state, init_tracing},
    },
    use_cases::{subscription_management::MutationOutcome, subscription_tracker::SubscriptionTracker},
};

const USAGE: &str = "usage: ossideas-sync [watch | checkout <price_id> | change-plan <subscription_id> <price_id> | cancel <subscription_id> | reactivate <subscription_id>]";

enum Command {
    Watch,
    Checkout(String),
    ChangePlan(SubscriptionId, String),
    Cancel(SubscriptionId),
    Reactivate(SubscriptionId),
}

impl Command {
    fn parse(args: &[String]) -> anyhow::Result<Self> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let command = match args.as_slice() {
            [] | ["watch"] => Command::Watch,
            ["checkout", price] => Command::Checkout(price.to_string()),
            ["change-plan", sub, price] => {
                Command::ChangePlan(SubscriptionId::new(*sub), price.to_string())
            }
            ["cancel", sub] => Command::Cancel(SubscriptionId::new(*sub)),
            ["reactivate", sub] => Command::Reactivate(SubscriptionId::new(*sub)),
            _ => bail!(USAGE),
        };
        Ok(command)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = AppConfig::from_env();
    init_tracing(config.log_json_path.as_deref())?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;
    let state = init_app_state(config)?;

    let Some(user) = state.auth.current_user().await? else {
        bail!("No signed-in user; set SUPABASE_ACCESS_TOKEN to a valid session token");
    };
    info!(user_id = %user.id, email = ?user.email, "signed in");

    state.tracker.sync_user(Some(user.id));
    spawn_observers(&state.tracker);

    match run_command(&state, command).await {
        Some((outcome, settle_after)) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if outcome.success {
                // Long enough for the delayed refresh and one poll tick.
                tokio::time::sleep(settle_after + state.config.poll_interval).await;
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            info!("shutting down");
        }
    }

    state.tracker.stop();
    Ok(())
}

async fn run_command(state: &AppState, command: Command) -> Option<(MutationOutcome, Duration)> {
    let manager = &state.manager;
    let config = &state.config;

    let result = match command {
        Command::Watch => return None,
        Command::Checkout(price_id) => (
            manager.subscribe_to_plan(&price_id).await,
            Duration::ZERO,
        ),
        Command::ChangePlan(id, price_id) => (
            manager.change_plan(&id, &price_id).await,
            config.plan_change_refresh_delay,
        ),
        Command::Cancel(id) => (manager.cancel_plan(&id).await, config.cancel_refresh_delay),
        Command::Reactivate(id) => (
            manager.reactivate_plan(&id).await,
            config.cancel_refresh_delay,
        ),
    };
    Some(result)
}

fn spawn_observers(tracker: &SubscriptionTracker) {
    let mut current = tracker.watch_current();
    tokio::spawn(async move {
        while current.changed().await.is_ok() {
            let snapshot = current.borrow_and_update().clone();
            match snapshot {
                Some(sub) => info!(
                    plan = %sub.plan_name,
                    status = %sub.status,
                    cancel_at_period_end = sub.cancel_at_period_end,
                    "{}",
                    sub.status_text()
                ),
                None => info!("no active subscription"),
            }
        }
    });

    let mut notifications = tracker.notifications();
    tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => info!(kind = %notification.kind, "{}", notification.message),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "notification stream lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut health = tracker.watch_health();
    tokio::spawn(async move {
        while health.changed().await.is_ok() {
            let snapshot = *health.borrow_and_update();
            if snapshot.reconnects_exhausted {
                warn!("realtime unavailable; relying on polling");
            }
        }
    });
}
