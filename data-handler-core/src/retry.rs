//! Backoff strategies for retry loops and pacing delays.
//!
//! Two strategies are used by the runtimes:
//! - **Fixed**: the broker reconnect delay
//! - **Jittered**: a uniformly random delay in `[min, max]`, used for producer batch
//!   spacing and for backing off after a storage error

use crate::{HandlerError, HandlerResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long to wait before the next attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Always wait the same amount of time
    Fixed { delay_ms: u64 },
    /// Wait a uniformly random amount of time between `min_ms` and `max_ms` (inclusive)
    Jittered { min_ms: u64, max_ms: u64 },
}

impl BackoffStrategy {
    /// Fixed delay
    pub fn fixed(delay: Duration) -> Self {
        Self::Fixed {
            delay_ms: delay.as_millis() as u64,
        }
    }

    /// Random delay in `[min, max]`
    pub fn jittered(min: Duration, max: Duration) -> Self {
        Self::Jittered {
            min_ms: min.as_millis() as u64,
            max_ms: max.as_millis() as u64,
        }
    }

    /// Compute the next delay
    pub fn next_delay(&self) -> Duration {
        match *self {
            Self::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Self::Jittered { min_ms, max_ms } if min_ms >= max_ms => Duration::from_millis(min_ms),
            Self::Jittered { min_ms, max_ms } => {
                Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
            }
        }
    }

    /// Validate the strategy bounds
    pub fn validate(&self) -> HandlerResult<()> {
        if let Self::Jittered { min_ms, max_ms } = *self {
            if min_ms > max_ms {
                return Err(HandlerError::config(format!(
                    "jittered backoff min ({}ms) exceeds max ({}ms)",
                    min_ms, max_ms
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay() {
        let strategy = BackoffStrategy::fixed(Duration::from_secs(2));
        assert_eq!(strategy.next_delay(), Duration::from_secs(2));
        assert_eq!(strategy.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_jittered_delay_within_bounds() {
        let strategy =
            BackoffStrategy::jittered(Duration::from_millis(150), Duration::from_millis(350));
        for _ in 0..200 {
            let delay = strategy.next_delay();
            assert!(delay >= Duration::from_millis(150));
            assert!(delay <= Duration::from_millis(350));
        }
    }

    #[test]
    fn test_degenerate_jitter() {
        let strategy = BackoffStrategy::jittered(Duration::from_secs(1), Duration::from_secs(1));
        assert_eq!(strategy.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_validate() {
        assert!(BackoffStrategy::fixed(Duration::ZERO).validate().is_ok());
        assert!(BackoffStrategy::Jittered {
            min_ms: 3000,
            max_ms: 1000
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_deserialize() {
        let strategy: BackoffStrategy =
            serde_json::from_str(r#"{"kind":"jittered","min_ms":1000,"max_ms":3000}"#).unwrap();
        assert_eq!(
            strategy,
            BackoffStrategy::jittered(Duration::from_secs(1), Duration::from_secs(3))
        );
    }
}
