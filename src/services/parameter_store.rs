//! Trait and types for a durable key-value parameter store.

use anyhow::Result;
use chrono::{DateTime, Utc};

/// A parameter value as read back from the store, decrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredParameter {
    pub value: String,
    pub last_modified: DateTime<Utc>,
}

/// Typed get/put against a parameter store such as AWS SSM Parameter Store.
#[async_trait::async_trait]
pub trait ParameterStore: Send + Sync {
    /// Reads `name` with decryption enabled.
    ///
    /// Returns `Ok(None)` when the parameter has never been written. Any other
    /// failure is an error.
    async fn get(&self, name: &str) -> Result<Option<StoredParameter>>;

    /// Writes `value` under `name`, overwriting any existing value.
    /// `encrypted` selects an encrypted value type.
    async fn put(&self, name: &str, value: &str, encrypted: bool) -> Result<()>;
}
