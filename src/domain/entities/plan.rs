use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::subscription::{Subscription, SubscriptionStatus},
};

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BillingInterval {
    #[default]
    Month,
    Year,
}

/// A purchasable plan as configured for the checkout provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub name: String,
    pub price_id: String,
    pub amount_cents: i64,
    #[serde(default)]
    pub interval: BillingInterval,
    #[serde(default)]
    pub popular: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl PlanCatalog {
    pub fn new(plans: Vec<Plan>) -> Self {
        Self { plans }
    }

    pub fn from_json(json: &str) -> AppResult<Self> {
        let plans: Vec<Plan> = serde_json::from_str(json)
            .map_err(|e| AppError::InvalidInput(format!("invalid plan catalog: {}", e)))?;
        Ok(Self::new(plans))
    }

    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }

    pub fn by_price_id(&self, price_id: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.price_id == price_id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn for_interval(&self, interval: BillingInterval) -> impl Iterator<Item = &Plan> {
        self.plans.iter().filter(move |p| p.interval == interval)
    }

    /// Returns every configuration problem found, not only the first one.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for plan in &self.plans {
            if plan.name.trim().is_empty() {
                errors.push(format!("plan with price id '{}' has no name", plan.price_id));
            }
            if plan.price_id.trim().is_empty() {
                errors.push(format!("plan '{}' is missing a price id", plan.name));
            } else if !seen.insert(plan.price_id.as_str()) {
                errors.push(format!("duplicate price id '{}'", plan.price_id));
            }
            if plan.amount_cents < 0 {
                errors.push(format!("plan '{}' has a negative amount", plan.name));
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// What selecting a plan would do for the current subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PlanAction {
    Start,
    Current,
    Reactivate,
    Switch,
}

impl PlanAction {
    pub fn for_plan(plan: &Plan, current: Option<&Subscription>) -> Self {
        let Some(sub) = current.filter(|s| s.is_active) else {
            return PlanAction::Start;
        };

        let same_plan = match sub.price_id.as_deref() {
            Some(price_id) => price_id == plan.price_id,
            None => sub.plan_name.eq_ignore_ascii_case(&plan.name),
        };

        if !same_plan {
            return PlanAction::Switch;
        }

        if sub.cancel_at_period_end || sub.status == SubscriptionStatus::Canceled {
            PlanAction::Reactivate
        } else {
            PlanAction::Current
        }
    }

    pub fn label(&self, plan: &Plan) -> String {
        match self {
            PlanAction::Start => format!("Start {} Plan", plan.name),
            PlanAction::Current => "Current Plan".to_string(),
            PlanAction::Reactivate => "Reactivate Plan".to_string(),
            PlanAction::Switch => format!("Switch to {}", plan.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_subscription, test_catalog};

    #[test]
    fn parses_catalog_json() {
        let catalog = PlanCatalog::from_json(
            r#"[
                {"name": "Basic", "price_id": "p1", "amount_cents": 500},
                {"name": "Pro", "price_id": "p2", "amount_cents": 1000, "popular": true},
                {"name": "Pro", "price_id": "p2y", "amount_cents": 9600, "interval": "year"}
            ]"#,
        )
        .unwrap();

        assert_eq!(catalog.plans().len(), 3);
        assert_eq!(catalog.by_price_id("p2").unwrap().name, "Pro");
        assert_eq!(catalog.for_interval(BillingInterval::Year).count(), 1);
        assert_eq!(
            catalog.by_price_id("p2y").unwrap().interval,
            BillingInterval::Year
        );
        assert!(catalog.validate().is_ok());
    }

    #[test]
    fn rejects_malformed_catalog() {
        assert!(matches!(
            PlanCatalog::from_json("{\"name\": 1}"),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn validate_collects_all_problems() {
        let catalog = PlanCatalog::new(vec![
            Plan {
                name: "Basic".into(),
                price_id: "p1".into(),
                amount_cents: 500,
                interval: BillingInterval::Month,
                popular: false,
            },
            Plan {
                name: "".into(),
                price_id: "p1".into(),
                amount_cents: 700,
                interval: BillingInterval::Month,
                popular: false,
            },
            Plan {
                name: "Pro".into(),
                price_id: " ".into(),
                amount_cents: 1000,
                interval: BillingInterval::Month,
                popular: false,
            },
        ]);

        let errors = catalog.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("duplicate price id 'p1'")));
    }

    #[test]
    fn plan_action_without_subscription_starts() {
        let catalog = test_catalog();
        let pro = catalog.by_name("pro").unwrap();

        assert_eq!(PlanAction::for_plan(pro, None), PlanAction::Start);
        assert_eq!(PlanAction::Start.label(pro), "Start Pro Plan");
    }

    #[test]
    fn plan_action_for_current_and_other_plans() {
        let catalog = test_catalog();
        let basic = catalog.by_price_id("p1").unwrap();
        let pro = catalog.by_price_id("p2").unwrap();
        let sub = create_test_subscription(|_| {});

        assert_eq!(PlanAction::for_plan(basic, Some(&sub)), PlanAction::Current);
        assert_eq!(PlanAction::for_plan(pro, Some(&sub)), PlanAction::Switch);
        assert_eq!(PlanAction::Switch.label(pro), "Switch to Pro");
    }

    #[test]
    fn plan_action_reactivates_pending_cancellation() {
        let catalog = test_catalog();
        let basic = catalog.by_price_id("p1").unwrap();
        let sub = create_test_subscription(|s| s.cancel_at_period_end = true);

        assert_eq!(PlanAction::for_plan(basic, Some(&sub)), PlanAction::Reactivate);
    }

    #[test]
    fn plan_action_matches_by_name_without_price() {
        let catalog = test_catalog();
        let basic = catalog.by_price_id("p1").unwrap();
        let sub = create_test_subscription(|s| s.price_id = None);

        assert_eq!(PlanAction::for_plan(basic, Some(&sub)), PlanAction::Current);
    }

    #[test]
    fn inactive_subscription_is_ignored() {
        let catalog = test_catalog();
        let basic = catalog.by_price_id("p1").unwrap();
        let sub = create_test_subscription(|s| s.is_active = false);

        assert_eq!(PlanAction::for_plan(basic, Some(&sub)), PlanAction::Start);
    }
}
