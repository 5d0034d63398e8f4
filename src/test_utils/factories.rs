//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::domain::entities::{
    plan::{BillingInterval, Plan, PlanCatalog},
    subscription::{Subscription, SubscriptionId, SubscriptionStatus},
};

pub fn test_user_id() -> Uuid {
    Uuid::from_u128(0x7f0c1d9e_4d8b_4a57_9d8e_1f2a3b4c5d6e)
}

pub fn test_datetime() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

/// Active Basic subscription on price `p1` (500 cents) for [`test_user_id`].
pub fn create_test_subscription(overrides: impl FnOnce(&mut Subscription)) -> Subscription {
    let mut subscription = Subscription {
        id: SubscriptionId::new("sub_test"),
        user_id: test_user_id(),
        plan_name: "Basic".to_string(),
        status: SubscriptionStatus::Active,
        is_active: true,
        cancel_at_period_end: false,
        price_id: Some("p1".to_string()),
        amount_cents: Some(500),
        created_at: test_datetime(),
    };
    overrides(&mut subscription);
    subscription
}

pub fn create_test_plan(overrides: impl FnOnce(&mut Plan)) -> Plan {
    let mut plan = Plan {
        name: "Basic".to_string(),
        price_id: "p1".to_string(),
        amount_cents: 500,
        interval: BillingInterval::Month,
        popular: false,
    };
    overrides(&mut plan);
    plan
}

/// Basic (`p1`, 500), Pro (`p2`, 1000) and yearly Pro (`p2y`, 9600).
pub fn test_catalog() -> PlanCatalog {
    PlanCatalog::new(vec![
        create_test_plan(|_| {}),
        create_test_plan(|p| {
            p.name = "Pro".to_string();
            p.price_id = "p2".to_string();
            p.amount_cents = 1000;
            p.popular = true;
        }),
        create_test_plan(|p| {
            p.name = "Pro".to_string();
            p.price_id = "p2y".to_string();
            p.amount_cents = 9600;
            p.interval = BillingInterval::Year;
        }),
    ])
}
