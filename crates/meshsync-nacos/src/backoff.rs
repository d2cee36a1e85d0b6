//! Reconnect backoff for the discovery stream
//!
//! Exponential growth with jitter, capped, and reset once the server
//! delivers a response on a fresh stream.

use std::time::Duration;

use rand::Rng;

#[derive(Clone, Debug)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

#[derive(Debug)]
pub struct ExponentialBackoff {
    config: BackoffConfig,
    current: Duration,
}

impl ExponentialBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        let current = config.initial_delay;
        Self { config, current }
    }

    /// Delay before the next attempt; grows the base delay for the one after.
    pub fn next_backoff(&mut self) -> Duration {
        let base = self.current;
        let next = base.as_secs_f64() * self.config.multiplier;
        self.current = Duration::from_secs_f64(next.min(self.config.max_delay.as_secs_f64()));

        // 0.5x to 1.5x, never above the cap
        let jitter = rand::rng().random_range(0.5..1.5);
        Duration::from_secs_f64(base.as_secs_f64() * jitter).min(self.config.max_delay)
    }

    pub fn reset(&mut self) {
        self.current = self.config.initial_delay;
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_growth_is_capped() {
        let mut backoff = ExponentialBackoff::new(BackoffConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            multiplier: 2.0,
        });

        let delays: Vec<Duration> = (0..6).map(|_| backoff.next_backoff()).collect();
        assert!(delays[0] >= Duration::from_millis(500));
        assert!(delays[0] <= Duration::from_millis(1500));
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(4)));
        assert_eq!(backoff.current, Duration::from_secs(4));
    }

    #[test]
    fn test_reset() {
        let mut backoff = ExponentialBackoff::default();
        backoff.next_backoff();
        backoff.next_backoff();
        assert_eq!(backoff.current, Duration::from_secs(4));

        backoff.reset();
        assert_eq!(backoff.current, Duration::from_secs(1));
        assert!(backoff.next_backoff() <= Duration::from_millis(1500));
    }
}
