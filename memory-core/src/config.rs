//! Runtime configuration recognized by the core (spec §6).

use crate::constants::defaults;
use std::time::Duration;

/// Exponential backoff schedule used for provider retries and the
/// pending-vector reconciler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryBackoff {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub multiplier: f64,
    /// Upper bound on the delay, regardless of attempt count.
    pub cap: Duration,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(defaults::RETRY_BACKOFF_INITIAL_MS),
            multiplier: defaults::RETRY_BACKOFF_MULTIPLIER,
            cap: Duration::from_millis(defaults::RETRY_BACKOFF_CAP_MS),
        }
    }
}

impl RetryBackoff {
    /// Delay before the `attempt`-th retry (0-indexed), capped.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.initial.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled).min(self.cap)
    }
}

/// Top-level configuration for a [`crate::service`] instance.
///
/// # Examples
///
/// ```
/// use salience_memory_core::config::MemoryConfig;
///
/// let config = MemoryConfig::default();
/// assert_eq!(config.pattern_min_count, 5);
/// assert!((config.min_confidence_surface - 0.5).abs() < f64::EPSILON);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Process-wide fallback identity when a caller doesn't supply one.
    pub default_user_id: String,
    /// Days since last interaction before a relationship goes cold.
    pub cold_threshold_days: i64,
    /// Floor below which an `AnticipatedContext` is not surfaced.
    pub min_confidence_surface: f64,
    /// Minimum observation-window span (days) for pattern formation.
    pub pattern_formation_days: i64,
    /// Minimum observation count for a candidate pattern.
    pub pattern_min_count: u32,
    /// Confidence threshold for a positive behavioral identification.
    pub identification_threshold: f64,
    /// Sample count after which a fingerprint is identification-ready.
    pub fingerprint_ready_samples: u64,
    /// Deadline for `LLMProvider` calls.
    pub llm_timeout: Duration,
    /// Deadline for `Embedder` calls.
    pub embedder_timeout: Duration,
    /// Deadline for `VectorStore` calls.
    pub vector_store_timeout: Duration,
    /// Backoff schedule for provider/vector retries.
    pub retry_backoff: RetryBackoff,
    /// Maximum registered devices per user before oldest-inactive eviction.
    pub max_devices_per_user: usize,
    /// Active-device window (minutes) used by unified context fusion.
    pub unified_fusion_window_min: i64,
    /// Days after `forgottenAt` before a `PendingDelete` memory is hard-deleted.
    pub hard_delete_after_days: i64,
    /// Default deadline applied to any suspension point without an
    /// explicit caller-supplied one (§5).
    pub default_deadline: Duration,
    /// Per-provider semaphore width for backpressure gating.
    pub provider_concurrency: usize,
    /// Bounded queue depth per provider before requests degrade.
    pub provider_queue_depth: usize,
    /// Whether the `audit` trail (provider downgrades, forget/restore,
    /// behavioral-feedback corrections) is recorded. Disabled by default,
    /// matching the teacher's own audit module's development-time default.
    pub audit_enabled: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            default_user_id: "default".to_string(),
            cold_threshold_days: defaults::COLD_THRESHOLD_DAYS,
            min_confidence_surface: defaults::MIN_CONFIDENCE_SURFACE,
            pattern_formation_days: defaults::PATTERN_FORMATION_DAYS,
            pattern_min_count: defaults::PATTERN_MIN_COUNT,
            identification_threshold: defaults::IDENTIFICATION_THRESHOLD,
            fingerprint_ready_samples: defaults::FINGERPRINT_READY_SAMPLES,
            llm_timeout: Duration::from_millis(defaults::LLM_TIMEOUT_MS),
            embedder_timeout: Duration::from_millis(defaults::EMBEDDER_TIMEOUT_MS),
            vector_store_timeout: Duration::from_millis(defaults::VECTOR_STORE_TIMEOUT_MS),
            retry_backoff: RetryBackoff::default(),
            max_devices_per_user: defaults::MAX_DEVICES_PER_USER,
            unified_fusion_window_min: defaults::UNIFIED_FUSION_WINDOW_MIN,
            hard_delete_after_days: defaults::HARD_DELETE_AFTER_DAYS,
            default_deadline: Duration::from_secs(defaults::DEFAULT_DEADLINE_SECS),
            provider_concurrency: defaults::DEFAULT_PROVIDER_CONCURRENCY,
            provider_queue_depth: defaults::DEFAULT_PROVIDER_QUEUE_DEPTH,
            audit_enabled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_caps() {
        let backoff = RetryBackoff::default();
        assert_eq!(backoff.delay_for(0), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(1), Duration::from_millis(200));
        // Should be capped well before attempt 10.
        assert_eq!(backoff.delay_for(20), Duration::from_millis(2000));
    }
}
