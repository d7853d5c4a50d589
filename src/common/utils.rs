//! Utility functions for volmgr

use std::time::Duration;
use tokio::time::Instant;

/// Get current Unix timestamp (seconds)
pub fn timestamp_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Number of block groups needed to hold `quota` capacity units.
///
/// A quota smaller than one block still gets one group.
pub fn groups_for_quota(quota: u64, block_size: u64) -> u64 {
    quota.div_ceil(block_size).max(1)
}

/// Caller-supplied bound on how long an operation may run.
///
/// Checked before every store interaction; an expired deadline aborts the
/// operation before anything is committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline
    pub fn none() -> Self {
        Self(None)
    }

    pub fn after(timeout: Duration) -> Self {
        Self(Some(Instant::now() + timeout))
    }

    /// The earlier of `limit` and an optional caller timeout in milliseconds
    pub fn bounded(limit: Duration, caller_ms: Option<u64>) -> Self {
        let timeout = match caller_ms {
            Some(ms) => limit.min(Duration::from_millis(ms)),
            None => limit,
        };
        Self::after(timeout)
    }

    pub fn instant(&self) -> Option<Instant> {
        self.0
    }

    pub fn is_expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }

    /// Fail with `Timeout` if the deadline has passed
    pub fn check(&self, what: &str) -> crate::Result<()> {
        if self.is_expired() {
            return Err(crate::Error::Timeout(what.to_string()));
        }
        Ok(())
    }
}

/// Validate a volume name (non-empty, reasonable length, no control chars)
pub fn validate_name(name: &str) -> crate::Result<()> {
    if name.trim().is_empty() {
        return Err(crate::Error::Validation("volume name cannot be empty".into()));
    }

    if name.len() > 256 {
        return Err(crate::Error::Validation(
            "volume name too long (max 256 bytes)".into(),
        ));
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(crate::Error::Validation(
            "volume name contains invalid characters".into(),
        ));
    }

    Ok(())
}

/// Convert a signed wire quantity into an unsigned one
pub fn non_negative(field: &str, value: i64) -> crate::Result<u64> {
    u64::try_from(value)
        .map_err(|_| crate::Error::Validation(format!("{} must be >= 0, got {}", field, value)))
}
