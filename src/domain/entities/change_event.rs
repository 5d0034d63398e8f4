use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::subscription::Subscription,
};

/// Lifecycle status reported by a change-feed channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ChannelStatus {
    Connecting,
    Subscribed,
    ChannelError,
    TimedOut,
    Closed,
}

impl ChannelStatus {
    /// Statuses after which a reconnect is attempted.
    pub fn is_failure(&self) -> bool {
        matches!(self, ChannelStatus::ChannelError | ChannelStatus::TimedOut)
    }
}

/// A row change on the subscriptions table, validated at the adapter boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Inserted {
        new: Subscription,
    },
    /// `old` is `None` when the feed only ships the primary key of the previous row.
    Updated {
        old: Option<Subscription>,
        new: Subscription,
    },
    Deleted {
        old: Option<Subscription>,
    },
    /// A change arrived for this user but its rows did not decode. Only triggers a refresh.
    Unparsed {
        event_type: String,
    },
}

impl ChangeEvent {
    pub fn kind(&self) -> &str {
        match self {
            ChangeEvent::Inserted { .. } => "INSERT",
            ChangeEvent::Updated { .. } => "UPDATE",
            ChangeEvent::Deleted { .. } => "DELETE",
            ChangeEvent::Unparsed { event_type } => event_type,
        }
    }

    /// Builds the refresh-only event for a `postgres_changes` payload whose rows are unusable.
    pub fn unparsed(data: &serde_json::Value) -> Self {
        let event_type = data["type"]
            .as_str()
            .or_else(|| data["eventType"].as_str())
            .unwrap_or("UNKNOWN")
            .to_ascii_uppercase();
        ChangeEvent::Unparsed { event_type }
    }
}

/// Untyped change payload as delivered by Supabase Realtime `postgres_changes`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawChange {
    #[serde(rename = "type", alias = "eventType")]
    pub event_type: String,
    #[serde(default, alias = "new")]
    pub record: Option<serde_json::Value>,
    #[serde(default, alias = "old")]
    pub old_record: Option<serde_json::Value>,
}

impl TryFrom<RawChange> for ChangeEvent {
    type Error = AppError;

    fn try_from(raw: RawChange) -> AppResult<Self> {
        match raw.event_type.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(ChangeEvent::Inserted {
                new: decode_required(raw.record, "record")?,
            }),
            "UPDATE" => Ok(ChangeEvent::Updated {
                old: decode_optional(raw.old_record),
                new: decode_required(raw.record, "record")?,
            }),
            "DELETE" => Ok(ChangeEvent::Deleted {
                old: decode_optional(raw.old_record),
            }),
            other => Err(AppError::InvalidPayload(format!(
                "unknown change type: {}",
                other
            ))),
        }
    }
}

fn decode_required(value: Option<serde_json::Value>, field: &str) -> AppResult<Subscription> {
    let value = value.ok_or_else(|| AppError::InvalidPayload(format!("missing {}", field)))?;
    serde_json::from_value(value)
        .map_err(|e| AppError::InvalidPayload(format!("invalid {}: {}", field, e)))
}

fn decode_optional(value: Option<serde_json::Value>) -> Option<Subscription> {
    value.and_then(|v| serde_json::from_value(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(price: &str, amount: i64) -> serde_json::Value {
        json!({
            "id": "sub_1",
            "user_id": "7f0c1d9e-4d8b-4a57-9d8e-1f2a3b4c5d6e",
            "plan_name": "Basic",
            "status": "active",
            "is_active": true,
            "cancel_at_period_end": false,
            "stripe_price_id": price,
            "amount_cents": amount,
            "created_at": "2024-05-01T10:00:00Z"
        })
    }

    #[test]
    fn update_with_full_old_record() {
        let raw: RawChange = serde_json::from_value(json!({
            "type": "UPDATE",
            "record": row("p2", 1000),
            "old_record": row("p1", 500),
        }))
        .unwrap();

        match ChangeEvent::try_from(raw).unwrap() {
            ChangeEvent::Updated { old: Some(old), new } => {
                assert_eq!(old.price_id.as_deref(), Some("p1"));
                assert_eq!(new.price_id.as_deref(), Some("p2"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn update_with_key_only_old_record() {
        let raw: RawChange = serde_json::from_value(json!({
            "type": "UPDATE",
            "record": row("p2", 1000),
            "old_record": { "id": "sub_1" },
        }))
        .unwrap();

        let event = ChangeEvent::try_from(raw).unwrap();
        assert!(matches!(event, ChangeEvent::Updated { old: None, .. }));
        assert_eq!(event.kind(), "UPDATE");
    }

    #[test]
    fn client_style_event_type_alias() {
        let raw: RawChange = serde_json::from_value(json!({
            "eventType": "INSERT",
            "new": row("p1", 500),
        }))
        .unwrap();

        assert!(matches!(
            ChangeEvent::try_from(raw).unwrap(),
            ChangeEvent::Inserted { .. }
        ));
    }

    #[test]
    fn delete_without_old_record() {
        let raw: RawChange = serde_json::from_value(json!({ "type": "DELETE" })).unwrap();
        assert_eq!(
            ChangeEvent::try_from(raw).unwrap(),
            ChangeEvent::Deleted { old: None }
        );
    }

    #[test]
    fn rejects_unknown_type_and_malformed_record() {
        let raw: RawChange = serde_json::from_value(json!({ "type": "TRUNCATE" })).unwrap();
        assert!(matches!(
            ChangeEvent::try_from(raw),
            Err(AppError::InvalidPayload(_))
        ));

        let raw: RawChange = serde_json::from_value(json!({
            "type": "UPDATE",
            "record": { "id": 5 },
        }))
        .unwrap();
        assert!(matches!(
            ChangeEvent::try_from(raw),
            Err(AppError::InvalidPayload(_))
        ));
    }

    #[test]
    fn unparsed_keeps_event_type() {
        let event = ChangeEvent::unparsed(&json!({ "eventType": "update", "new": { "id": 5 } }));
        assert_eq!(
            event,
            ChangeEvent::Unparsed {
                event_type: "UPDATE".to_string()
            }
        );
        assert_eq!(event.kind(), "UPDATE");
        assert_eq!(ChangeEvent::unparsed(&json!(null)).kind(), "UNKNOWN");
    }

    #[test]
    fn channel_status_strings() {
        assert_eq!(ChannelStatus::ChannelError.as_ref(), "CHANNEL_ERROR");
        assert_eq!(
            "timed_out".parse::<ChannelStatus>().unwrap(),
            ChannelStatus::TimedOut
        );
        assert!(ChannelStatus::TimedOut.is_failure());
        assert!(!ChannelStatus::Closed.is_failure());
    }
}
