//! Local view of the signed-in user's current subscription.
//!
//! The tracker keeps one cached [`Subscription`] per user session and reconciles it
//! from three triggers: the change feed (push), the polling fallback (pull) and
//! explicit refreshes scheduled by mutations. Consumers observe it through `watch`
//! and `broadcast` receivers instead of running their own trackers.
//!
//! Fetch responses are applied in issue order: each fetch takes a sequence number
//! and a response older than the last applied one is dropped. Responses for a
//! stopped session are dropped as well.

use std::{
    ops::ControlFlow,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::{
        change_event::{ChangeEvent, ChannelStatus},
        notification::{SubscriptionNotification, classify_update},
        plan::PlanCatalog,
        reconnect_policy::ReconnectPolicy,
        subscription::Subscription,
    },
    ports::{
        change_feed::{ChangeFeed, FeedMessage, FeedScope, FeedSubscription},
        subscription_store::SubscriptionStore,
    },
    use_cases::polling_fallback::{self, OperationGuard, PollMode, PollingFallback},
};

const NOTIFICATION_BUFFER: usize = 16;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub poll_interval: Duration,
    /// Keep the standby poller running next to a healthy channel.
    pub always_poll: bool,
    pub reconnect: ReconnectPolicy,
    pub notification_ttl: Duration,
    /// Table the change feed listens on.
    pub feed_table: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2000),
            always_poll: true,
            reconnect: ReconnectPolicy::default(),
            notification_ttl: Duration::from_millis(5000),
            feed_table: "subscriptions".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// First load of a session; raises the loading flag while in flight.
    Initial,
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelHealth {
    /// `None` while no session is running.
    pub status: Option<ChannelStatus>,
    pub reconnect_attempts: u32,
    pub reconnects_exhausted: bool,
}

enum ChannelOutcome {
    Failed(ChannelStatus),
    Closed,
    Stopped,
}

struct Session {
    user_id: Uuid,
    generation: u64,
    tasks: Vec<JoinHandle<()>>,
}

#[derive(Default)]
struct CacheSlot {
    applied_seq: u64,
}

struct TrackerInner {
    store: Arc<dyn SubscriptionStore>,
    feed: Arc<dyn ChangeFeed>,
    catalog: Arc<PlanCatalog>,
    config: TrackerConfig,
    polling: PollingFallback,
    current: watch::Sender<Option<Subscription>>,
    loading: watch::Sender<bool>,
    banner: watch::Sender<Option<SubscriptionNotification>>,
    notifications: broadcast::Sender<SubscriptionNotification>,
    health: watch::Sender<ChannelHealth>,
    session: Mutex<Option<Session>>,
    cache: Mutex<CacheSlot>,
    generation: AtomicU64,
    fetch_seq: AtomicU64,
}

/// One instance per user session. Cloning shares the same tracker.
///
/// `start` spawns background tasks and must be called inside a Tokio runtime.
#[derive(Clone)]
pub struct SubscriptionTracker {
    inner: Arc<TrackerInner>,
}

impl SubscriptionTracker {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        feed: Arc<dyn ChangeFeed>,
        catalog: Arc<PlanCatalog>,
        config: TrackerConfig,
    ) -> Self {
        let polling = PollingFallback::new(config.poll_interval, config.always_poll);
        let (notifications, _) = broadcast::channel(NOTIFICATION_BUFFER);

        Self {
            inner: Arc::new(TrackerInner {
                store,
                feed,
                catalog,
                config,
                polling,
                current: watch::channel(None).0,
                loading: watch::channel(false).0,
                banner: watch::channel(None).0,
                notifications,
                health: watch::channel(ChannelHealth::default()).0,
                session: Mutex::new(None),
                cache: Mutex::new(CacheSlot::default()),
                generation: AtomicU64::new(0),
                fetch_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Starts tracking `user_id`. A no-op when already tracking that user; a different
    /// user replaces the running session.
    #[instrument(skip(self))]
    pub fn start(&self, user_id: Uuid) {
        let inner = &self.inner;
        let mut session = lock(&inner.session);

        if session.as_ref().is_some_and(|s| s.user_id == user_id) {
            debug!("tracker already running for user");
            return;
        }
        if let Some(previous) = session.take() {
            inner.shutdown(previous);
        }

        let generation = {
            let _slot = lock(&inner.cache);
            inner.current.send_replace(None);
            inner.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        inner.polling.reset();
        inner.health.send_replace(ChannelHealth {
            status: Some(ChannelStatus::Connecting),
            ..ChannelHealth::default()
        });

        let initial = Arc::clone(inner);
        let scope = FeedScope::for_user(user_id, inner.config.feed_table.clone());
        let tasks = vec![
            tokio::spawn(async move {
                let _ = initial
                    .fetch_for(generation, user_id, FetchMode::Initial)
                    .await;
            }),
            tokio::spawn(run_channel(Arc::downgrade(inner), generation, scope)),
            tokio::spawn(run_polling(Arc::downgrade(inner), generation, user_id)),
        ];

        *session = Some(Session {
            user_id,
            generation,
            tasks,
        });
        info!(%user_id, "subscription tracking started");
    }

    /// Releases the channel, halts all timers and discards the cached value. Safe to
    /// call any number of times.
    pub fn stop(&self) {
        let Some(session) = lock(&self.inner.session).take() else {
            return;
        };
        let user_id = session.user_id;
        self.inner.shutdown(session);
        info!(%user_id, "subscription tracking stopped");
    }

    /// Follows auth state: a user starts (or keeps) tracking, no user stops it.
    pub fn sync_user(&self, user_id: Option<Uuid>) {
        match user_id {
            Some(user_id) => self.start(user_id),
            None => self.stop(),
        }
    }

    /// Looks up the current subscription. A failed lookup leaves the cached value in
    /// place; the error is only reported to this caller.
    pub async fn fetch(&self, mode: FetchMode) -> AppResult<Option<Subscription>> {
        let Some((user_id, generation)) = self.inner.session_key() else {
            return Ok(None);
        };
        self.inner.fetch_for(generation, user_id, mode).await
    }

    pub async fn refresh(&self) -> AppResult<Option<Subscription>> {
        self.fetch(FetchMode::Refresh).await
    }

    /// Refreshes once after `delay`, unless the session ends first. Returns false when
    /// no session is running.
    pub fn schedule_refresh(&self, delay: Duration) -> bool {
        let mut session = lock(&self.inner.session);
        let Some(session) = session.as_mut() else {
            return false;
        };

        let (user_id, generation) = (session.user_id, session.generation);
        let weak = Arc::downgrade(&self.inner);
        session.tasks.retain(|task| !task.is_finished());
        session.tasks.push(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                debug!(?delay, "running scheduled subscription refresh");
                let _ = inner
                    .fetch_for(generation, user_id, FetchMode::Refresh)
                    .await;
            }
        }));
        true
    }

    /// Marks a mutating operation as in flight; standby polling fetches meanwhile.
    pub fn begin_operation(&self) -> OperationGuard {
        self.inner.polling.begin_operation()
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.inner.session_key().map(|(user_id, _)| user_id)
    }

    pub fn current(&self) -> Option<Subscription> {
        self.inner.current.borrow().clone()
    }

    pub fn watch_current(&self) -> watch::Receiver<Option<Subscription>> {
        self.inner.current.subscribe()
    }

    pub fn header_label(&self) -> Option<String> {
        self.inner
            .current
            .borrow()
            .as_ref()
            .and_then(|s| s.header_label().map(str::to_string))
    }

    pub fn is_loading(&self) -> bool {
        *self.inner.loading.borrow()
    }

    pub fn watch_loading(&self) -> watch::Receiver<bool> {
        self.inner.loading.subscribe()
    }

    /// The notification banner currently on display, cleared after its display time.
    pub fn notification(&self) -> Option<SubscriptionNotification> {
        self.inner.banner.borrow().clone()
    }

    pub fn watch_notification(&self) -> watch::Receiver<Option<SubscriptionNotification>> {
        self.inner.banner.subscribe()
    }

    pub fn dismiss_notification(&self) {
        self.inner.banner.send_replace(None);
    }

    /// Every notification as it is raised.
    pub fn notifications(&self) -> broadcast::Receiver<SubscriptionNotification> {
        self.inner.notifications.subscribe()
    }

    pub fn health(&self) -> ChannelHealth {
        *self.inner.health.borrow()
    }

    pub fn watch_health(&self) -> watch::Receiver<ChannelHealth> {
        self.inner.health.subscribe()
    }

    pub fn poll_mode(&self) -> PollMode {
        self.inner.polling.mode()
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.inner.catalog
    }
}

impl TrackerInner {
    fn session_key(&self) -> Option<(Uuid, u64)> {
        lock(&self.session)
            .as_ref()
            .map(|s| (s.user_id, s.generation))
    }

    fn is_live(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn shutdown(&self, session: Session) {
        {
            let _slot = lock(&self.cache);
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.current.send_replace(None);
        }
        for task in session.tasks {
            task.abort();
        }
        self.polling.halt();
        self.loading.send_replace(false);
        self.banner.send_replace(None);
        self.health.send_replace(ChannelHealth::default());
    }

    async fn fetch_for(
        &self,
        generation: u64,
        user_id: Uuid,
        mode: FetchMode,
    ) -> AppResult<Option<Subscription>> {
        let seq = self.fetch_seq.fetch_add(1, Ordering::SeqCst) + 1;
        if mode == FetchMode::Initial {
            self.loading.send_replace(true);
        }

        let result = self.store.fetch_current(user_id).await;

        if mode == FetchMode::Initial && self.is_live(generation) {
            self.loading.send_replace(false);
        }

        match result {
            Ok(row) => {
                self.apply(generation, seq, row);
                Ok(self.current.borrow().clone())
            }
            Err(err) => {
                warn!(
                    %user_id,
                    error = %err,
                    code = err.code().as_str(),
                    recoverable = err.is_recoverable(),
                    "subscription fetch failed; keeping cached value"
                );
                Err(err)
            }
        }
    }

    fn apply(&self, generation: u64, seq: u64, row: Option<Subscription>) -> bool {
        let mut slot = lock(&self.cache);
        if !self.is_live(generation) {
            debug!(seq, "discarding subscription response for a stopped session");
            return false;
        }
        if seq <= slot.applied_seq {
            debug!(
                seq,
                applied = slot.applied_seq,
                "discarding out-of-order subscription response"
            );
            return false;
        }

        slot.applied_seq = seq;
        self.current.send_if_modified(|current| {
            if *current != row {
                *current = row;
                true
            } else {
                false
            }
        });
        true
    }

    fn record_status(&self, status: ChannelStatus, attempts: u32, exhausted: bool) {
        self.health.send_replace(ChannelHealth {
            status: Some(status),
            reconnect_attempts: attempts,
            reconnects_exhausted: exhausted,
        });
    }

    async fn reconcile(self: &Arc<Self>, event: ChangeEvent, generation: u64, user_id: Uuid) {
        debug!(kind = event.kind(), "realtime subscription change");

        let notification = match &event {
            ChangeEvent::Updated { old, new } => {
                let cached = self.current.borrow().clone();
                old.as_ref().or(cached.as_ref()).and_then(|before| {
                    classify_update(before, new, &self.catalog, self.config.notification_ttl)
                })
            }
            ChangeEvent::Inserted { .. }
            | ChangeEvent::Deleted { .. }
            | ChangeEvent::Unparsed { .. } => None,
        };

        let _ = self
            .fetch_for(generation, user_id, FetchMode::Refresh)
            .await;

        if let Some(notification) = notification {
            if self.is_live(generation) {
                self.publish(notification);
            }
        }
    }

    fn publish(self: &Arc<Self>, notification: SubscriptionNotification) {
        info!(kind = %notification.kind, message = %notification.message, "subscription notification");

        let id = notification.id;
        let ttl = notification.display_for;
        self.banner.send_replace(Some(notification.clone()));
        let _ = self.notifications.send(notification);

        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(inner) = weak.upgrade() {
                inner.banner.send_if_modified(|slot| {
                    if slot.as_ref().is_some_and(|n| n.id == id) {
                        *slot = None;
                        true
                    } else {
                        false
                    }
                });
            }
        });
    }
}

impl Drop for TrackerInner {
    fn drop(&mut self) {
        let session = self
            .session
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(session) = session {
            debug!(user_id = %session.user_id, "tracker dropped; aborting session tasks");
            for task in session.tasks {
                task.abort();
            }
        }
    }
}

/// Pumps one feed subscription. Upgrades to the tracker per message only, so an open
/// channel never keeps a dropped tracker alive.
async fn drive(
    inner: &Weak<TrackerInner>,
    mut subscription: FeedSubscription,
    generation: u64,
    user_id: Uuid,
    attempt: &mut u32,
) -> ChannelOutcome {
    while let Some(message) = subscription.next().await {
        let Some(this) = inner.upgrade() else {
            return ChannelOutcome::Stopped;
        };
        if !this.is_live(generation) {
            return ChannelOutcome::Stopped;
        }

        match message {
            FeedMessage::Status(ChannelStatus::Subscribed) => {
                info!(%user_id, "subscribed to realtime subscription updates");
                *attempt = 0;
                this.polling.reset();
                this.record_status(ChannelStatus::Subscribed, 0, false);
            }
            FeedMessage::Status(ChannelStatus::Connecting) => {
                this.record_status(ChannelStatus::Connecting, *attempt, false);
            }
            FeedMessage::Status(status) if status.is_failure() => {
                return ChannelOutcome::Failed(status);
            }
            FeedMessage::Status(_) => return ChannelOutcome::Closed,
            FeedMessage::Change(event) => this.reconcile(event, generation, user_id).await,
        }
    }

    match inner.upgrade() {
        Some(this) if this.is_live(generation) => ChannelOutcome::Closed,
        _ => ChannelOutcome::Stopped,
    }
}

async fn run_channel(inner: Weak<TrackerInner>, generation: u64, scope: FeedScope) {
    let user_id = scope.user_id;
    let mut attempt: u32 = 0;

    loop {
        let feed = {
            let Some(this) = inner.upgrade() else {
                return;
            };
            if !this.is_live(generation) {
                return;
            }
            this.record_status(ChannelStatus::Connecting, attempt, false);
            Arc::clone(&this.feed)
        };

        let outcome = match feed.subscribe(&scope).await {
            Ok(subscription) => drive(&inner, subscription, generation, user_id, &mut attempt).await,
            Err(err) => {
                warn!(%user_id, error = %err, "change feed setup failed");
                ChannelOutcome::Failed(ChannelStatus::ChannelError)
            }
        };

        let Some(this) = inner.upgrade() else {
            return;
        };
        if !this.is_live(generation) {
            return;
        }
        match outcome {
            ChannelOutcome::Stopped => return,
            ChannelOutcome::Closed => {
                info!(%user_id, "realtime subscription closed; polling for updates");
                this.polling.degrade();
                this.record_status(ChannelStatus::Closed, attempt, false);
                return;
            }
            ChannelOutcome::Failed(status) => {
                warn!(%user_id, %status, "realtime subscription failed; falling back to polling");
                this.polling.degrade();

                let Some(delay) = this.config.reconnect.delay_for(attempt) else {
                    warn!(%user_id, attempts = attempt, "realtime reconnect attempts exhausted");
                    this.record_status(status, attempt, true);
                    return;
                };
                this.record_status(status, attempt, false);
                drop(this);

                tokio::time::sleep(delay).await;
                attempt += 1;
                info!(%user_id, attempt, "retrying realtime connection");
            }
        }
    }
}

async fn run_polling(inner: Weak<TrackerInner>, generation: u64, user_id: Uuid) {
    let Some(period) = inner.upgrade().map(|i| i.polling.interval()) else {
        return;
    };

    polling_fallback::run(period, move || {
        let inner = inner.clone();
        async move {
            let Some(this) = inner.upgrade() else {
                return ControlFlow::Break(());
            };
            if !this.is_live(generation) {
                return ControlFlow::Break(());
            }
            if this.polling.should_fetch() {
                debug!(%user_id, mode = %this.polling.mode(), "polling for subscription updates");
                let _ = this
                    .fetch_for(generation, user_id, FetchMode::Refresh)
                    .await;
            }
            ControlFlow::Continue(())
        }
    })
    .await;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
