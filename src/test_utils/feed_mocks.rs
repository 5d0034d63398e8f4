//! Scripted change feed.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::change_event::ChannelStatus,
    ports::change_feed::{ChangeFeed, FeedMessage, FeedScope, FeedSubscription},
};

/// What one `subscribe` call does.
#[derive(Debug, Clone)]
pub enum FeedScript {
    Fail(AppError),
    /// Delivered right away; the channel then stays open for [`ScriptedChangeFeed::emit`].
    Messages(Vec<FeedMessage>),
}

impl FeedScript {
    pub fn subscribed() -> Self {
        FeedScript::Messages(vec![
            FeedMessage::Status(ChannelStatus::Connecting),
            FeedMessage::Status(ChannelStatus::Subscribed),
        ])
    }
}

struct OpenChannel {
    sender: mpsc::Sender<FeedMessage>,
    closed: oneshot::Receiver<()>,
}

impl OpenChannel {
    fn is_open(&mut self) -> bool {
        matches!(
            self.closed.try_recv(),
            Err(oneshot::error::TryRecvError::Empty)
        )
    }
}

/// Plays queued scripts in order, then `fallback` for every further call.
pub struct ScriptedChangeFeed {
    scripts: Mutex<VecDeque<FeedScript>>,
    fallback: FeedScript,
    scopes: Mutex<Vec<FeedScope>>,
    channels: Mutex<Vec<OpenChannel>>,
}

impl ScriptedChangeFeed {
    /// Every subscription succeeds.
    pub fn new() -> Self {
        Self::with_scripts(vec![], FeedScript::subscribed())
    }

    pub fn with_scripts(scripts: Vec<FeedScript>, fallback: FeedScript) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            fallback,
            scopes: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe_count(&self) -> usize {
        self.scopes.lock().unwrap().len()
    }

    pub fn scopes(&self) -> Vec<FeedScope> {
        self.scopes.lock().unwrap().clone()
    }

    /// Channels whose handle has not been released yet.
    pub fn active_subscriptions(&self) -> usize {
        self.channels
            .lock()
            .unwrap()
            .iter_mut()
            .filter_map(|c| c.is_open().then_some(()))
            .count()
    }

    /// Sends `message` on every open channel.
    pub async fn emit(&self, message: FeedMessage) {
        let senders: Vec<_> = self
            .channels
            .lock()
            .unwrap()
            .iter_mut()
            .filter_map(|c| c.is_open().then(|| c.sender.clone()))
            .collect();

        for sender in senders {
            let _ = sender.send(message.clone()).await;
        }
    }
}

impl Default for ScriptedChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeFeed for ScriptedChangeFeed {
    async fn subscribe(&self, scope: &FeedScope) -> AppResult<FeedSubscription> {
        self.scopes.lock().unwrap().push(scope.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        let messages = match script {
            FeedScript::Fail(err) => return Err(err),
            FeedScript::Messages(messages) => messages,
        };

        let (tx, rx) = mpsc::channel(64);
        let (close_tx, close_rx) = oneshot::channel();
        for message in messages {
            let _ = tx.try_send(message);
        }
        self.channels.lock().unwrap().push(OpenChannel {
            sender: tx,
            closed: close_rx,
        });

        Ok(FeedSubscription::new(rx, close_tx))
    }
}
