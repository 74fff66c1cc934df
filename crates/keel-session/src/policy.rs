//! Storage policy: decides which sessions survive as storage limits approach.
//!
//! [`apply_policy`] is pure. It takes a full snapshot of the session
//! collection and returns the retained subset; writing the result back is
//! the caller's job.
//!
//! Stages, applied in order:
//! 1. sort newest first ([`newest_first`], stable for equal timestamps)
//! 2. hard ceiling of `max_sessions`
//! 3. soft-limit cleanup down to the cleanup target
//! 4. byte-threshold cleanup from the oldest end

use crate::types::Session;
use keel_types::ConfigError;
use std::cmp::Ordering;

/// The default hard ceiling on stored sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 100;

/// The default fraction of `max_sessions` that triggers proactive cleanup.
pub const DEFAULT_SOFT_LIMIT_RATIO: f64 = 0.9;

/// The default fraction of `max_sessions` kept after proactive cleanup.
pub const DEFAULT_CLEANUP_TARGET_RATIO: f64 = 0.85;

/// Storage quota enforced by the host environment.
pub const STORAGE_QUOTA_BYTES: u64 = 10 * 1024 * 1024;

/// The default byte threshold: 80% of the host quota.
pub const DEFAULT_STORAGE_THRESHOLD_BYTES: u64 = STORAGE_QUOTA_BYTES / 5 * 4;

/// Limits applied by [`apply_policy`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyConfig {
    /// Hard ceiling on retained sessions. Zero retains nothing.
    pub max_sessions: usize,
    /// Fraction of `max_sessions` above which proactive cleanup fires.
    pub soft_limit_ratio: f64,
    /// Fraction of `max_sessions` retained after proactive cleanup.
    pub cleanup_target_ratio: f64,
    /// Cumulative byte ceiling. `None` disables byte-threshold cleanup.
    pub storage_threshold_bytes: Option<u64>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            soft_limit_ratio: DEFAULT_SOFT_LIMIT_RATIO,
            cleanup_target_ratio: DEFAULT_CLEANUP_TARGET_RATIO,
            storage_threshold_bytes: Some(DEFAULT_STORAGE_THRESHOLD_BYTES),
        }
    }
}

impl PolicyConfig {
    /// Check `0 < cleanup_target_ratio <= soft_limit_ratio <= 1` and a
    /// positive byte threshold.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_ratio("soft_limit_ratio", self.soft_limit_ratio)?;
        check_ratio("cleanup_target_ratio", self.cleanup_target_ratio)?;
        if self.cleanup_target_ratio > self.soft_limit_ratio {
            return Err(ConfigError::invalid(
                "cleanup_target_ratio",
                format!(
                    "{} exceeds soft_limit_ratio {}",
                    self.cleanup_target_ratio, self.soft_limit_ratio
                ),
            ));
        }
        if self.storage_threshold_bytes == Some(0) {
            return Err(ConfigError::invalid(
                "storage_threshold_bytes",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Session count above which proactive cleanup fires.
    pub fn soft_limit(&self) -> usize {
        scaled(self.max_sessions, self.soft_limit_ratio)
    }

    /// Session count retained after proactive cleanup.
    pub fn cleanup_target(&self) -> usize {
        scaled(self.max_sessions, self.cleanup_target_ratio)
    }
}

fn check_ratio(key: &str, ratio: f64) -> Result<(), ConfigError> {
    // Written so that NaN fails too.
    if ratio > 0.0 && ratio <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(key, format!("{ratio} is outside (0, 1]")))
    }
}

fn scaled(max_sessions: usize, ratio: f64) -> usize {
    (max_sessions as f64 * ratio).floor() as usize
}

/// Recency order used for every truncation: higher timestamp first.
///
/// Used with a stable sort, so sessions with equal timestamps keep their
/// original relative order.
pub fn newest_first(a: &Session, b: &Session) -> Ordering {
    b.timestamp.cmp(&a.timestamp)
}

/// Result of [`apply_policy`].
#[derive(Debug, Clone, Default)]
pub struct PolicyOutcome {
    /// Retained sessions, newest first.
    pub sessions: Vec<Session>,
    /// IDs of evicted sessions, in eviction order.
    pub evicted: Vec<String>,
    /// Cumulative byte size of the retained sessions.
    pub retained_bytes: u64,
}

impl PolicyOutcome {
    pub fn evicted_count(&self) -> usize {
        self.evicted.len()
    }
}

/// Decide which sessions to keep.
///
/// Fails only when `config` is invalid; every well-formed snapshot,
/// including an empty one, produces an outcome.
pub fn apply_policy(
    mut sessions: Vec<Session>,
    config: &PolicyConfig,
) -> Result<PolicyOutcome, ConfigError> {
    config.validate()?;

    sessions.sort_by(newest_first);
    let mut evicted = Vec::new();

    if sessions.len() > config.max_sessions {
        tracing::debug!(
            "Session count {} exceeds hard ceiling {}",
            sessions.len(),
            config.max_sessions
        );
        evict_tail(&mut sessions, config.max_sessions, &mut evicted);
    }

    let soft_limit = config.soft_limit();
    if sessions.len() > soft_limit {
        let target = config.cleanup_target();
        tracing::debug!(
            "Session count {} exceeds soft limit {}, cleaning up to {}",
            sessions.len(),
            soft_limit,
            target
        );
        evict_tail(&mut sessions, target, &mut evicted);
    }

    let sizes: Vec<u64> = sessions.iter().map(Session::byte_size).collect();
    let mut retained_bytes: u64 = sizes.iter().sum();

    if let Some(threshold) = config.storage_threshold_bytes {
        if retained_bytes > threshold {
            let keep = fitting_prefix(&sizes, threshold);
            retained_bytes = sizes[..keep].iter().sum();
            tracing::debug!(
                "Storage usage exceeds {} bytes, keeping {} of {} sessions ({} bytes)",
                threshold,
                keep,
                sessions.len(),
                retained_bytes
            );
            evict_tail(&mut sessions, keep, &mut evicted);
        }
    }

    if !evicted.is_empty() {
        tracing::info!(
            "Storage policy evicted {} sessions, {} retained",
            evicted.len(),
            sessions.len()
        );
    }

    Ok(PolicyOutcome {
        sessions,
        evicted,
        retained_bytes,
    })
}

/// Length of the longest prefix whose cumulative size stays within `threshold`.
fn fitting_prefix(sizes: &[u64], threshold: u64) -> usize {
    let mut total = 0u64;
    sizes
        .iter()
        .take_while(|&&size| {
            total = total.saturating_add(size);
            total <= threshold
        })
        .count()
}

fn evict_tail(sessions: &mut Vec<Session>, keep: usize, evicted: &mut Vec<String>) {
    if sessions.len() > keep {
        evicted.extend(sessions.drain(keep..).map(|s| s.id));
    }
}
