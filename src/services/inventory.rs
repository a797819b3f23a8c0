//! Trait and types for querying the running-instance inventory.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::fmt;

/// Opaque identity of a compute instance (e.g. `i-0abc123`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One running instance as reported by the inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    pub id: InstanceId,
    pub launch_time: Option<DateTime<Utc>>,
}

/// Read-only query over running instances.
#[async_trait::async_trait]
pub trait InstanceInventory: Send + Sync {
    /// Returns every instance in the `running` state whose tag `tag_key`
    /// equals `tag_value`, in the order the provider reports them.
    async fn running_instances(&self, tag_key: &str, tag_value: &str)
    -> Result<Vec<InstanceRecord>>;
}
