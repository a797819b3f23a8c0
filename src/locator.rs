//! Resolves the control-plane role to a single running instance.

use anyhow::anyhow;
use serde::Deserialize;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::services::{InstanceId, InstanceInventory, InstanceRecord};

/// How to pick one instance when several match the role tag, e.g. while a
/// control plane is being replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    /// Latest launch time wins; ties go to the smallest instance id.
    #[default]
    MostRecentlyLaunched,
    /// Whatever the inventory lists first.
    FirstReported,
}

impl FromStr for TieBreak {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "most-recently-launched" => Ok(TieBreak::MostRecentlyLaunched),
            "first-reported" => Ok(TieBreak::FirstReported),
            other => Err(anyhow!(
                "unknown tie-break '{other}' (expected most-recently-launched or first-reported)"
            )),
        }
    }
}

impl TieBreak {
    /// Picks one record out of `candidates`, or `None` if there are none.
    pub fn choose(self, candidates: &[InstanceRecord]) -> Option<&InstanceRecord> {
        match self {
            TieBreak::FirstReported => candidates.first(),
            // `None` launch times compare lowest, so they only win when
            // nothing has a launch time.
            TieBreak::MostRecentlyLaunched => candidates.iter().max_by(|a, b| {
                a.launch_time
                    .cmp(&b.launch_time)
                    .then_with(|| b.id.cmp(&a.id))
            }),
        }
    }
}

/// Result of a locate call. Not finding a host is an expected outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    Found(InstanceId),
    NotFound,
}

/// Maps a role tag value to one running instance.
pub struct InstanceLocator<I> {
    inventory: I,
    tag_key: String,
    tie_break: TieBreak,
}

impl<I: InstanceInventory> InstanceLocator<I> {
    pub fn new(inventory: I, tag_key: impl Into<String>, tie_break: TieBreak) -> Self {
        Self {
            inventory,
            tag_key: tag_key.into(),
            tie_break,
        }
    }

    /// Finds the running instance tagged `role_tag`.
    ///
    /// Inventory errors are logged and reported as [`Located::NotFound`].
    #[tracing::instrument(skip(self), fields(tag_key = %self.tag_key))]
    pub async fn locate(&self, role_tag: &str) -> Located {
        let candidates = match self.inventory.running_instances(&self.tag_key, role_tag).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "Instance inventory query failed");
                return Located::NotFound;
            }
        };

        debug!(candidates = candidates.len(), "Inventory query returned");
        if candidates.len() > 1 {
            info!(
                candidates = candidates.len(),
                tie_break = ?self.tie_break,
                "Multiple running instances match role, applying tie-break"
            );
        }

        match self.tie_break.choose(&candidates) {
            Some(record) => Located::Found(record.id.clone()),
            None => Located::NotFound,
        }
    }
}
