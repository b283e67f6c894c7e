//! Upload tuning: chunk size, strategy threshold and retry policy.

use std::num::NonZeroU64;
use std::time::Duration;

use dbxup_protocol::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_DIRECT_UPLOAD_THRESHOLD, MAX_REQUEST_BODY,
};

use crate::error::UploadError;

/// Retry schedule for chunk appends.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per chunk, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Backoff cap.
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Retries `max_attempts - 1` times without waiting.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_factor: 1.0,
        }
    }

    /// Delay after failed attempt number `attempt` (1-based), with ±25%
    /// jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped <= 0.0 {
            return Duration::ZERO;
        }
        let jitter = capped * 0.25;
        let offset = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as f64
            / u32::MAX as f64)
            * 2.0
            - 1.0; // [-1.0, 1.0)
        Duration::from_secs_f64((capped + jitter * offset).max(0.0))
    }

    /// Backoff delay, raised to the remote's `Retry-After` when it asked
    /// for longer.
    pub fn delay_with_hint(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        match retry_after {
            Some(hint) if hint > delay => hint,
            _ => delay,
        }
    }
}

/// Settings for an [`UploadOrchestrator`](crate::UploadOrchestrator).
#[derive(Debug, Clone, PartialEq)]
pub struct UploadConfig {
    /// Bytes per append.
    pub chunk_size: NonZeroU64,
    /// Files up to this size go through a single direct upload.
    pub direct_upload_threshold: u64,
    pub retry: RetryPolicy,
    /// Upper bound on the finish call that releases a failed session.
    pub cleanup_timeout: Duration,
    /// Compare the local content hash with the one the remote reports.
    pub verify_content_hash: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: NonZeroU64::new(DEFAULT_CHUNK_SIZE).unwrap_or(NonZeroU64::MIN),
            direct_upload_threshold: DEFAULT_DIRECT_UPLOAD_THRESHOLD,
            retry: RetryPolicy::default(),
            cleanup_timeout: Duration::from_secs(30),
            verify_content_hash: true,
        }
    }
}

impl UploadConfig {
    /// Checks the limits the remote enforces on a single request body.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.chunk_size.get() > MAX_REQUEST_BODY {
            return Err(UploadError::InvalidConfig(format!(
                "chunk size {} exceeds the {MAX_REQUEST_BODY}-byte request limit",
                self.chunk_size
            )));
        }
        if self.direct_upload_threshold > MAX_REQUEST_BODY {
            return Err(UploadError::InvalidConfig(format!(
                "direct upload threshold {} exceeds the {MAX_REQUEST_BODY}-byte request limit",
                self.direct_upload_threshold
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(UploadError::InvalidConfig(
                "max_attempts must be at least 1".into(),
            ));
        }
        if self.retry.backoff_factor.is_nan() || self.retry.backoff_factor < 1.0 {
            return Err(UploadError::InvalidConfig(format!(
                "backoff factor must be >= 1.0, got {}",
                self.retry.backoff_factor
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert!((policy.backoff_factor - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn retry_delay_backoff() {
        let policy = RetryPolicy::default();
        // 500ms, 1s, 2s, 4s, 8s, 10s (capped), 10s
        let expected_base = [0.5, 1.0, 2.0, 4.0, 8.0, 10.0, 10.0];
        for (i, &base) in expected_base.iter().enumerate() {
            let secs = policy.delay_for_attempt((i + 1) as u32).as_secs_f64();
            let lo = base * 0.74;
            let hi = base * 1.26;
            assert!(
                secs >= lo && secs <= hi,
                "attempt {}: {secs:.3}s not in [{lo:.3}, {hi:.3}]",
                i + 1
            );
        }
    }

    #[test]
    fn immediate_policy_never_waits() {
        let policy = RetryPolicy::immediate(5);
        assert_eq!(policy.max_attempts, 5);
        for attempt in 1..10 {
            assert_eq!(policy.delay_for_attempt(attempt), Duration::ZERO);
        }
    }

    #[test]
    fn retry_after_hint_wins_when_longer() {
        let policy = RetryPolicy::immediate(3);
        assert_eq!(
            policy.delay_with_hint(1, Some(Duration::from_secs(4))),
            Duration::from_secs(4)
        );
        assert_eq!(policy.delay_with_hint(1, None), Duration::ZERO);

        let policy = RetryPolicy::default();
        let delay = policy.delay_with_hint(1, Some(Duration::from_millis(1)));
        assert!(delay >= Duration::from_millis(370));
    }

    #[test]
    fn default_config_is_valid() {
        let config = UploadConfig::default();
        assert_eq!(config.chunk_size.get(), 50 * 1024 * 1024);
        assert_eq!(config.direct_upload_threshold, 150 * 1024 * 1024);
        assert_eq!(config.cleanup_timeout, Duration::from_secs(30));
        assert!(config.verify_content_hash);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_oversized_chunks() {
        let config = UploadConfig {
            chunk_size: NonZeroU64::new(MAX_REQUEST_BODY + 1).unwrap(),
            ..UploadConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(UploadError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_oversized_threshold() {
        let config = UploadConfig {
            direct_upload_threshold: MAX_REQUEST_BODY + 1,
            ..UploadConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_attempts() {
        let config = UploadConfig {
            retry: RetryPolicy::immediate(0),
            ..UploadConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
