//! Trait for a named-secret store with create-or-update semantics.

use anyhow::Result;

/// Result of attempting to create a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateResult {
    Created,
    AlreadyExists,
}

/// A secret store such as AWS Secrets Manager.
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    /// Creates `name` with `secret_string`. An existing secret is reported as
    /// [`CreateResult::AlreadyExists`], not as an error.
    async fn create(&self, name: &str, secret_string: &str) -> Result<CreateResult>;

    /// Stores a new current value for an existing secret.
    async fn put_value(&self, name: &str, secret_string: &str) -> Result<()>;

    /// Returns the current value, or `None` if the secret does not exist.
    async fn get(&self, name: &str) -> Result<Option<String>>;
}
