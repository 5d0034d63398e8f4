use std::time::Duration;

/// Bounded reconnect schedule for the change-feed channel.
///
/// Attempt `n` (zero based) waits `base_delay * (n + 1)`; once `max_attempts`
/// reconnects have been made no further delay is offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_attempts: 3,
        }
    }
}

impl ReconnectPolicy {
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts).then(|| self.base_delay * (attempt + 1))
    }
}
