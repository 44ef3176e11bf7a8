//! Exponential backoff for failed chunk attempts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::duration_ms;

/// Backoff policy applied between failed attempts at the same offset.
///
/// The attempt counter resets whenever the server confirms progress, so
/// `max_attempts` bounds consecutive failures at one offset, not the whole
/// transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first retry.
    #[serde(with = "duration_ms", rename = "initial_delay_ms")]
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    #[serde(with = "duration_ms", rename = "max_delay_ms")]
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
    /// Attempts allowed at one offset before giving up (including the first).
    pub max_attempts: u32,
    /// Jitter as a fraction of the delay, in `[0.0, 1.0]`. `0.0` disables it.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(32),
            backoff_factor: 2.0,
            max_attempts: 8,
            jitter: 0.25,
        }
    }
}

impl RetryConfig {
    /// Calculates the delay after the given failed attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if self.jitter <= 0.0 {
            return Duration::from_secs_f64(capped.max(0.0));
        }
        let jitter = capped * self.jitter.min(1.0);
        let offset = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as f64
            / u32::MAX as f64)
            * 2.0
            - 1.0; // [-1.0, 1.0)
        Duration::from_secs_f64((capped + jitter * offset).max(0.0))
    }

    /// Returns `true` once `attempts` failures leave no budget for another try.
    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".into());
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(format!(
                "backoff_factor must be >= 1.0, got {}",
                self.backoff_factor
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(format!("jitter must be within [0, 1], got {}", self.jitter));
        }
        if self.max_delay < self.initial_delay {
            return Err("max_delay must not be shorter than initial_delay".into());
        }
        Ok(())
    }
}
