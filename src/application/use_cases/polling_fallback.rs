use std::{
    future::Future,
    ops::ControlFlow,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use strum::{AsRefStr, Display};
use tokio::{
    sync::watch,
    time::{Instant, MissedTickBehavior, interval_at},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PollMode {
    /// No polling at all.
    Off,
    /// Safety net next to a healthy channel: fetch only while a mutation is in flight.
    Standby,
    /// Channel is down: fetch on every tick.
    Degraded,
}

/// Timer-driven re-fetch policy used next to (or instead of) the change feed.
#[derive(Debug)]
pub struct PollingFallback {
    interval: Duration,
    baseline: PollMode,
    mode: watch::Sender<PollMode>,
    in_flight: Arc<AtomicUsize>,
}

impl PollingFallback {
    /// `always_poll` keeps a standby poller running while the channel is healthy.
    pub fn new(interval: Duration, always_poll: bool) -> Self {
        let baseline = if always_poll {
            PollMode::Standby
        } else {
            PollMode::Off
        };
        Self {
            interval,
            baseline,
            mode: watch::channel(PollMode::Off).0,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn mode(&self) -> PollMode {
        *self.mode.borrow()
    }

    /// Back to the configured baseline, on session start and when the channel recovers.
    pub fn reset(&self) {
        self.mode.send_replace(self.baseline);
    }

    pub fn degrade(&self) {
        self.mode.send_replace(PollMode::Degraded);
    }

    pub fn halt(&self) {
        self.mode.send_replace(PollMode::Off);
    }

    /// Marks a mutating operation as in flight until the guard is dropped.
    pub fn begin_operation(&self) -> OperationGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        OperationGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    pub fn operations_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn should_fetch(&self) -> bool {
        match self.mode() {
            PollMode::Off => false,
            PollMode::Standby => self.operations_in_flight() > 0,
            PollMode::Degraded => true,
        }
    }
}

#[derive(Debug)]
pub struct OperationGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Calls `on_tick` every `period`, first one period from now, until it breaks.
pub(crate) async fn run<F, Fut>(period: Duration, mut on_tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ControlFlow<()>>,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if on_tick().await.is_break() {
            return;
        }
    }
}
