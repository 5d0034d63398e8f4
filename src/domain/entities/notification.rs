use std::time::Duration;

use serde::Serialize;
use strum::{AsRefStr, Display};
use uuid::Uuid;

use crate::domain::entities::{plan::PlanCatalog, subscription::Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    Upgrade,
    Downgrade,
    Reactivate,
    ScheduledCancel,
}

/// User-facing notice about a subscription transition. Display and expiry are up to
/// the consumer; `display_for` is how long the banner should stay up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionNotification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub from_plan: Option<String>,
    pub to_plan: Option<String>,
    pub message: String,
    #[serde(skip)]
    pub display_for: Duration,
}

impl SubscriptionNotification {
    fn new(
        kind: NotificationKind,
        from_plan: Option<String>,
        to_plan: Option<String>,
        message: String,
        display_for: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            from_plan,
            to_plan,
            message,
            display_for,
        }
    }
}

/// Classifies an UPDATE of the subscription row.
///
/// A price change decides by amount (upgrade or downgrade). Only when it yields
/// nothing does a flip of `cancel_at_period_end` count (reactivate or scheduled
/// cancel). Anything else produces no notification.
pub fn classify_update(
    old: &Subscription,
    new: &Subscription,
    catalog: &PlanCatalog,
    display_for: Duration,
) -> Option<SubscriptionNotification> {
    if old.price_id != new.price_id {
        if let Some(notification) = classify_price_change(old, new, catalog, display_for) {
            return Some(notification);
        }
    }

    if old.cancel_at_period_end != new.cancel_at_period_end {
        let plan = plan_name(new, catalog);
        let (kind, message) = if new.cancel_at_period_end {
            (
                NotificationKind::ScheduledCancel,
                format!(
                    "Your {} subscription will be canceled at the end of the current billing period.",
                    plan
                ),
            )
        } else {
            (
                NotificationKind::Reactivate,
                format!("Your {} subscription has been reactivated!", plan),
            )
        };
        return Some(SubscriptionNotification::new(
            kind,
            None,
            Some(plan),
            message,
            display_for,
        ));
    }

    None
}

fn classify_price_change(
    old: &Subscription,
    new: &Subscription,
    catalog: &PlanCatalog,
    display_for: Duration,
) -> Option<SubscriptionNotification> {
    let old_amount = amount(old, catalog)?;
    let new_amount = amount(new, catalog)?;
    let from = plan_name(old, catalog);
    let to = plan_name(new, catalog);

    let (kind, message) = if new_amount > old_amount {
        (
            NotificationKind::Upgrade,
            format!("Successfully upgraded from {} to {} plan!", from, to),
        )
    } else if new_amount < old_amount {
        (
            NotificationKind::Downgrade,
            format!("Successfully switched from {} to {} plan!", from, to),
        )
    } else {
        return None;
    };

    Some(SubscriptionNotification::new(
        kind,
        Some(from),
        Some(to),
        message,
        display_for,
    ))
}

fn amount(sub: &Subscription, catalog: &PlanCatalog) -> Option<i64> {
    sub.amount_cents.or_else(|| {
        sub.price_id
            .as_deref()
            .and_then(|id| catalog.by_price_id(id))
            .map(|p| p.amount_cents)
    })
}

/// Row label, or the catalog name for the row's price id when the label is blank.
fn plan_name(sub: &Subscription, catalog: &PlanCatalog) -> String {
    if !sub.plan_name.trim().is_empty() {
        return sub.plan_name.clone();
    }
    sub.price_id
        .as_deref()
        .and_then(|id| catalog.by_price_id(id))
        .map(|p| p.name.clone())
        .unwrap_or_else(|| "current".to_string())
}
