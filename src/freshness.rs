//! Staleness policy for the stored join credential.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

use crate::services::StoredParameter;

/// Outcome of evaluating the stored credential. Recomputed on every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessVerdict {
    /// The credential has never been written.
    Absent,
    /// The credential exists but must be rotated.
    Stale,
    /// The credential is young enough to keep.
    Fresh,
}

impl FreshnessVerdict {
    pub fn needs_refresh(self) -> bool {
        !matches!(self, FreshnessVerdict::Fresh)
    }
}

impl fmt::Display for FreshnessVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FreshnessVerdict::Absent => "absent",
            FreshnessVerdict::Stale => "stale",
            FreshnessVerdict::Fresh => "fresh",
        };
        f.write_str(s)
    }
}

/// Decides whether a stored credential is still usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    /// Maximum age before a credential is stale.
    pub threshold: Duration,
    /// Treat every stored credential as stale, ignoring its age.
    pub always_rotate: bool,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            threshold: Duration::hours(23),
            always_rotate: false,
        }
    }
}

impl FreshnessPolicy {
    /// Classifies `stored` as of `now`.
    ///
    /// A `last_modified` in the future counts as zero elapsed time.
    pub fn evaluate(&self, stored: Option<&StoredParameter>, now: DateTime<Utc>) -> FreshnessVerdict {
        let Some(stored) = stored else {
            return FreshnessVerdict::Absent;
        };

        if self.always_rotate {
            return FreshnessVerdict::Stale;
        }

        let elapsed = (now - stored.last_modified).max(Duration::zero());
        if elapsed >= self.threshold {
            FreshnessVerdict::Stale
        } else {
            FreshnessVerdict::Fresh
        }
    }
}
