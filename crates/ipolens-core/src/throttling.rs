use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};

type KeyedRateLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Per-host minimum spacing between requests, shared by every category.
///
/// A zero delay disables the gate.
#[derive(Clone)]
pub struct HostGate {
    limiter: Option<Arc<KeyedRateLimiter>>,
    delay: Duration,
}

impl HostGate {
    pub fn new(delay: Duration) -> Self {
        let limiter = Quota::with_period(delay).map(|quota| Arc::new(RateLimiter::keyed(quota)));
        Self { limiter, delay }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Waits until `host` may be contacted again.
    pub async fn until_ready(&self, host: &str) {
        if let Some(limiter) = &self.limiter {
            limiter.until_key_ready(&host.to_owned()).await;
        }
    }
}

impl std::fmt::Debug for HostGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostGate")
            .field("delay", &self.delay)
            .field("enabled", &self.limiter.is_some())
            .finish()
    }
}
