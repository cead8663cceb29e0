//! Retry policy with capped exponential backoff and additive jitter.

use std::time::Duration;

/// Backoff schedule between failed fetch attempts.
///
/// After failed attempt `i` (1-indexed) the wait is
/// `min(base * 2^(i-1), max) + jitter`, with jitter drawn uniformly from
/// `[0, base)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(8),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Deterministic part of the delay after failed attempt `attempt` (1-indexed).
    pub fn capped(self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let scaled = self.base.saturating_mul(1_u32 << exponent);
        scaled.min(self.max)
    }

    pub fn delay(self, attempt: u32) -> Duration {
        let capped = self.capped(attempt);
        if !self.jitter {
            return capped;
        }

        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        if base_ms == 0 {
            return capped;
        }
        capped + Duration::from_millis(fastrand::u64(0..base_ms))
    }
}

/// Attempt budget and backoff for one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self {
            max_retries: max_retries.max(1),
            backoff,
        }
    }

    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 1,
            backoff: Backoff {
                base: Duration::ZERO,
                max: Duration::ZERO,
                jitter: false,
            },
        }
    }

    /// Status codes that end the retry loop without another attempt.
    pub fn is_terminal_status(status: u16) -> bool {
        (400..500).contains(&status) && !matches!(status, 403 | 408 | 429)
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_is_capped() {
        let backoff = Backoff {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
            jitter: false,
        };

        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
        assert_eq!(backoff.delay(4), Duration::from_millis(800));
        assert_eq!(backoff.delay(5), Duration::from_secs(1));
        assert_eq!(backoff.delay(64), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_below_one_base_delay() {
        let backoff = Backoff {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
            jitter: true,
        };

        for _ in 0..50 {
            for attempt in 1..6 {
                let delay = backoff.delay(attempt);
                let capped = backoff.capped(attempt);
                assert!(delay >= capped, "attempt={attempt}, delay={delay:?}");
                assert!(
                    delay < capped + Duration::from_millis(100),
                    "attempt={attempt}, delay={delay:?}"
                );
            }
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(RetryConfig::is_terminal_status(404));
        assert!(RetryConfig::is_terminal_status(401));
        assert!(!RetryConfig::is_terminal_status(403));
        assert!(!RetryConfig::is_terminal_status(408));
        assert!(!RetryConfig::is_terminal_status(429));
        assert!(!RetryConfig::is_terminal_status(503));
    }

    #[test]
    fn test_retry_config_never_drops_below_one_attempt() {
        assert_eq!(RetryConfig::new(0, Backoff::default()).max_retries, 1);
        assert_eq!(RetryConfig::no_retry().delay_for_attempt(1), Duration::ZERO);
    }
}
