//! Retry classification and exponential backoff
//!
//! Retries are never performed inside the clients. The harvester asks an error
//! whether it [`IsRetryable`], and if so re-appends the work item to the back
//! of its queue after [`backoff_delay`] has elapsed.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use warc_harvest::config::RetryConfig;
//! use warc_harvest::retry::backoff_delay;
//!
//! let config = RetryConfig {
//!     initial_delay: Duration::from_secs(1),
//!     max_delay: Duration::from_secs(10),
//!     backoff_multiplier: 2.0,
//!     jitter: false,
//!     ..Default::default()
//! };
//!
//! assert_eq!(backoff_delay(&config, 1), Duration::from_secs(1));
//! assert_eq!(backoff_delay(&config, 3), Duration::from_secs(4));
//! assert_eq!(backoff_delay(&config, 8), Duration::from_secs(10));
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, ErrorKind};
use rand::Rng;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, server busy, connection reset) should return `true`.
/// Permanent failures (malformed records, undecodable payloads, disk errors) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientNetwork
    }
}

/// Delay before the given retry attempt (1-based)
///
/// Grows as `initial_delay * backoff_multiplier^(attempt - 1)`. With jitter
/// enabled the value is spread uniformly between that and twice that. The
/// result never exceeds `max_delay`.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(63) as i32;
    let mut secs = config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    if config.jitter {
        secs *= 1.0 + jitter_factor();
    }

    let max_secs = config.max_delay.as_secs_f64();
    let capped = if secs.is_finite() {
        secs.min(max_secs)
    } else {
        max_secs
    };

    Duration::try_from_secs_f64(capped)
        .unwrap_or(config.max_delay)
        .min(config.max_delay)
}

/// Random jitter factor to prevent thundering herd
///
/// Uniformly distributed between 0.0 and 1.0, so the jittered delay lands
/// between `delay` and `2 * delay`.
fn jitter_factor() -> f64 {
    let mut rng = rand::thread_rng();
    rng.gen_range(0.0..=1.0)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SkipReason;

    fn no_jitter() -> RetryConfig {
        RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_exponential_growth() {
        let config = no_jitter();
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(&config, 3), Duration::from_millis(400));
        assert_eq!(backoff_delay(&config, 4), Duration::from_millis(800));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = no_jitter();
        assert_eq!(backoff_delay(&config, 5), Duration::from_secs(1));
        assert_eq!(backoff_delay(&config, 40), Duration::from_secs(1));
        assert_eq!(backoff_delay(&config, u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_huge_delays_saturate_at_max() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_secs(u64::MAX),
            max_delay: Duration::from_secs(u64::MAX),
            backoff_multiplier: 2.0,
            jitter: true,
        };
        for attempt in [1, 2, 64] {
            assert!(backoff_delay(&config, attempt) <= config.max_delay);
        }

        let config = RetryConfig {
            initial_delay: Duration::MAX,
            max_delay: Duration::MAX,
            jitter: false,
            ..config
        };
        assert_eq!(backoff_delay(&config, 1), Duration::MAX);
    }

    #[test]
    fn test_attempt_zero_behaves_like_first() {
        let config = no_jitter();
        assert_eq!(backoff_delay(&config, 0), backoff_delay(&config, 1));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let config = RetryConfig {
            jitter: true,
            ..no_jitter()
        };
        for _ in 0..100 {
            let delay = backoff_delay(&config, 2);
            assert!(delay >= Duration::from_millis(200), "delay {:?}", delay);
            assert!(delay <= Duration::from_millis(400), "delay {:?}", delay);
        }
        for _ in 0..100 {
            assert!(backoff_delay(&config, 10) <= Duration::from_secs(1));
        }
    }

    #[test]
    fn test_error_retryability() {
        let status = Error::HttpStatus {
            url: "https://archive.example/seg".to_string(),
            status: 500,
        };
        assert!(status.is_retryable());

        let not_found = Error::HttpStatus {
            url: "https://index.example/idx".to_string(),
            status: 404,
        };
        assert!(!not_found.is_retryable());

        let malformed = Error::MalformedRecord {
            filename: "seg".to_string(),
            reason: SkipReason::Unsplittable,
        };
        assert!(!malformed.is_retryable());

        let io = Error::PathIo {
            path: "/data/commoncrawl".into(),
            source: std::io::Error::other("disk full"),
        };
        assert!(!io.is_retryable());
    }
}
