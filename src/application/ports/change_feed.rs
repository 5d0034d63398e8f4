use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::change_event::{ChangeEvent, ChannelStatus},
};

/// Which rows a channel listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedScope {
    pub user_id: Uuid,
    pub channel: String,
    pub schema: String,
    pub table: String,
}

impl FeedScope {
    pub fn for_user(user_id: Uuid, table: impl Into<String>) -> Self {
        Self {
            user_id,
            channel: format!("subscription-changes-{}", user_id),
            schema: "public".to_string(),
            table: table.into(),
        }
    }

    /// Row filter in PostgREST syntax.
    pub fn filter(&self) -> String {
        format!("user_id=eq.{}", self.user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    Status(ChannelStatus),
    Change(ChangeEvent),
}

/// Handle to an open channel. Dropping it (or calling [`unsubscribe`]) tells the
/// adapter to leave the channel.
///
/// [`unsubscribe`]: FeedSubscription::unsubscribe
#[derive(Debug)]
pub struct FeedSubscription {
    messages: mpsc::Receiver<FeedMessage>,
    close: Option<oneshot::Sender<()>>,
}

impl FeedSubscription {
    pub fn new(messages: mpsc::Receiver<FeedMessage>, close: oneshot::Sender<()>) -> Self {
        Self {
            messages,
            close: Some(close),
        }
    }

    /// Next status change or row event; `None` once the adapter has gone away.
    pub async fn next(&mut self) -> Option<FeedMessage> {
        self.messages.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
        self.messages.close();
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Publish/subscribe change channel keyed by user.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Opens a channel. Errors mean the channel could not even be set up; later
    /// failures arrive as [`FeedMessage::Status`].
    async fn subscribe(&self, scope: &FeedScope) -> AppResult<FeedSubscription>;
}
