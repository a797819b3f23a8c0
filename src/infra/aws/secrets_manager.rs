use anyhow::{Context, Result};
use kube_join_rotator::services::{CreateResult, SecretStore};

/// Stores environment secret bundles in AWS Secrets Manager.
pub struct SecretsManagerStore {
    client: aws_sdk_secretsmanager::Client,
}

impl SecretsManagerStore {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_secretsmanager::Client::new(config),
        }
    }
}

#[async_trait::async_trait]
impl SecretStore for SecretsManagerStore {
    async fn create(&self, name: &str, secret_string: &str) -> Result<CreateResult> {
        match self
            .client
            .create_secret()
            .name(name)
            .secret_string(secret_string)
            .send()
            .await
        {
            Ok(_) => Ok(CreateResult::Created),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_resource_exists_exception()) => {
                Ok(CreateResult::AlreadyExists)
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Secrets Manager CreateSecret failed for '{name}'"))),
        }
    }

    async fn put_value(&self, name: &str, secret_string: &str) -> Result<()> {
        self.client
            .put_secret_value()
            .secret_id(name)
            .secret_string(secret_string)
            .send()
            .await
            .with_context(|| format!("Secrets Manager PutSecretValue failed for '{name}'"))?;
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<String>> {
        match self.client.get_secret_value().secret_id(name).send().await {
            Ok(resp) => Ok(resp.secret_string),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception()) =>
            {
                Ok(None)
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Secrets Manager GetSecretValue failed for '{name}'"))),
        }
    }
}
