use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of a subscription row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payment status of a subscription. Independent of whether the user still has access,
/// see [`Subscription::is_active`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    /// Anything the backend reports that we do not know about.
    Incomplete,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
        }
    }

    pub fn from_raw(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "active" => SubscriptionStatus::Active,
            "trialing" => SubscriptionStatus::Trialing,
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" | "cancelled" => SubscriptionStatus::Canceled,
            _ => SubscriptionStatus::Incomplete,
        }
    }

    /// Active or trialing.
    pub fn is_paying(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing
        )
    }
}

impl From<String> for SubscriptionStatus {
    fn from(s: String) -> Self {
        SubscriptionStatus::from_raw(&s)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: Uuid,
    pub plan_name: String,
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default, rename = "stripe_price_id", alias = "price_id")]
    pub price_id: Option<String>,
    #[serde(default)]
    pub amount_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Picks the record treated as current: the most recently created one with
    /// `is_active = true`.
    pub fn select_current<'a, I>(rows: I) -> Option<&'a Subscription>
    where
        I: IntoIterator<Item = &'a Subscription>,
    {
        rows.into_iter()
            .filter(|s| s.is_active)
            .max_by_key(|s| s.created_at)
    }

    /// Plan name shown in the header badge, only while the subscription is paying.
    pub fn header_label(&self) -> Option<&str> {
        self.status.is_paying().then_some(self.plan_name.as_str())
    }

    pub fn status_text(&self) -> String {
        match self.status {
            SubscriptionStatus::Active => "Active subscription".to_string(),
            SubscriptionStatus::Trialing => "Trial subscription".to_string(),
            SubscriptionStatus::PastDue => "Payment past due".to_string(),
            SubscriptionStatus::Canceled => "Subscription canceled".to_string(),
            other => other.as_str().to_string(),
        }
    }
}
