//! Environment-scoped secret bundles.
//!
//! A bundle is a flat string map stored as one JSON secret per environment,
//! e.g. `k8s/dev` and `k8s/prod`.

use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use tracing::info;

use crate::services::{CreateResult, SecretStore};

/// Key/value pairs published together as a single JSON secret.
pub type SecretBundle = BTreeMap<String, String>;

/// Template used to derive a secret name from a prefix and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNaming {
    template: String,
}

impl KeyNaming {
    pub const DEFAULT_TEMPLATE: &'static str = "{prefix}/{env}";

    /// Builds a naming scheme. The template must contain `{env}` so that
    /// environments never share a secret.
    pub fn new(template: &str) -> Result<Self> {
        if !template.contains("{env}") {
            bail!("secret naming template '{template}' must contain {{env}}");
        }
        Ok(Self {
            template: template.to_string(),
        })
    }

    pub fn name_for(&self, prefix: &str, env: &str) -> String {
        self.template
            .replace("{prefix}", prefix)
            .replace("{env}", env)
    }
}

impl Default for KeyNaming {
    fn default() -> Self {
        Self {
            template: Self::DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// Whether publishing created a new secret or replaced an existing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Created,
    Updated,
}

/// Parses `key=value` pairs into a bundle. Later duplicates win.
pub fn parse_entries<'a>(entries: impl IntoIterator<Item = &'a str>) -> Result<SecretBundle> {
    let mut bundle = SecretBundle::new();
    for entry in entries {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("secret entry '{entry}' is not in key=value form");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("secret entry has an empty key");
        }
        bundle.insert(key.to_string(), value.to_string());
    }
    Ok(bundle)
}

/// Creates `name` with `bundle`, or replaces its value if it already exists.
#[tracing::instrument(skip(store, bundle), fields(keys = ?bundle.keys().collect::<Vec<_>>()))]
pub async fn publish_bundle<S: SecretStore>(
    store: &S,
    name: &str,
    bundle: &SecretBundle,
) -> Result<PublishOutcome> {
    let body = serde_json::to_string(bundle)?;

    match store
        .create(name, &body)
        .await
        .with_context(|| format!("failed to create secret '{name}'"))?
    {
        CreateResult::Created => {
            info!("Created secret");
            Ok(PublishOutcome::Created)
        }
        CreateResult::AlreadyExists => {
            store
                .put_value(name, &body)
                .await
                .with_context(|| format!("failed to update secret '{name}'"))?;
            info!("Updated secret");
            Ok(PublishOutcome::Updated)
        }
    }
}

/// Reads and decodes the bundle stored under `name`.
pub async fn fetch_bundle<S: SecretStore>(store: &S, name: &str) -> Result<Option<SecretBundle>> {
    let Some(raw) = store.get(name).await? else {
        return Ok(None);
    };
    let bundle = serde_json::from_str(&raw)
        .with_context(|| format!("secret '{name}' is not a JSON object of strings"))?;
    Ok(Some(bundle))
}
