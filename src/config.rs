//! Runtime configuration for the rotator and its helper commands.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::time::Duration;

use crate::freshness::FreshnessPolicy;
use crate::locator::TieBreak;
use crate::secrets::KeyNaming;

/// All deployment-specific settings.
///
/// Loaded from an optional JSON file and then overridden by `ROTATOR_*`
/// environment variables. Every field has a default, so an empty object
/// `{}` is a valid file:
/// ```json
/// {
///   "region": "eu-west-1",
///   "parameter_name": "/k8s/worker/join-command",
///   "role_tag_value": "k8s-cp",
///   "always_rotate": false
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RotatorConfig {
    pub region: String,
    /// Parameter Store key holding the join command.
    pub parameter_name: String,
    pub role_tag_key: String,
    pub role_tag_value: String,
    /// Shell command run on the control plane to mint a new join command.
    pub join_command: String,
    pub document_name: String,
    pub freshness_hours: i64,
    /// Rotate on every run regardless of the stored credential's age.
    pub always_rotate: bool,
    pub tie_break: TieBreak,
    pub wait_delay_secs: u64,
    pub wait_max_attempts: u32,
    pub secret_prefix: String,
    pub secret_naming: String,
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self {
            region: "eu-west-1".to_string(),
            parameter_name: "/k8s/worker/join-command".to_string(),
            role_tag_key: "Name".to_string(),
            role_tag_value: "k8s-cp".to_string(),
            join_command: "kubeadm token create --print-join-command".to_string(),
            document_name: "AWS-RunShellScript".to_string(),
            freshness_hours: 23,
            always_rotate: false,
            tie_break: TieBreak::MostRecentlyLaunched,
            wait_delay_secs: 5,
            wait_max_attempts: 20,
            secret_prefix: "k8s".to_string(),
            secret_naming: KeyNaming::DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// How long the remote-execution channel waits for a command to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_attempts: 20,
        }
    }
}

/// The subset of [`RotatorConfig`] the orchestrator needs for one run.
#[derive(Debug, Clone)]
pub struct RotationSettings {
    pub parameter_name: String,
    pub role_tag_value: String,
    pub join_command: String,
    pub policy: FreshnessPolicy,
}

impl RotatorConfig {
    /// Loads the JSON file at `path` if given, then applies environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// Like [`RotatorConfig::load`], resolving overrides through `lookup`.
    pub fn load_with<F>(path: Option<&str>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file '{path}'"))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("invalid config file '{path}'"))?
            }
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `ROTATOR_*` overrides using `lookup` to resolve variable names.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string_vars: [(&str, &mut String); 8] = [
            ("ROTATOR_REGION", &mut self.region),
            ("ROTATOR_PARAMETER_NAME", &mut self.parameter_name),
            ("ROTATOR_ROLE_TAG_KEY", &mut self.role_tag_key),
            ("ROTATOR_ROLE_TAG_VALUE", &mut self.role_tag_value),
            ("ROTATOR_JOIN_COMMAND", &mut self.join_command),
            ("ROTATOR_DOCUMENT_NAME", &mut self.document_name),
            ("ROTATOR_SECRET_PREFIX", &mut self.secret_prefix),
            ("ROTATOR_SECRET_NAMING", &mut self.secret_naming),
        ];
        for (name, field) in string_vars {
            if let Some(value) = lookup(name) {
                *field = value;
            }
        }

        if let Some(v) = lookup("ROTATOR_FRESHNESS_HOURS") {
            self.freshness_hours = parse_var("ROTATOR_FRESHNESS_HOURS", &v)?;
        }
        if let Some(v) = lookup("ROTATOR_ALWAYS_ROTATE") {
            self.always_rotate = parse_var("ROTATOR_ALWAYS_ROTATE", &v)?;
        }
        if let Some(v) = lookup("ROTATOR_TIE_BREAK") {
            self.tie_break = v.parse()?;
        }
        if let Some(v) = lookup("ROTATOR_WAIT_DELAY_SECS") {
            self.wait_delay_secs = parse_var("ROTATOR_WAIT_DELAY_SECS", &v)?;
        }
        if let Some(v) = lookup("ROTATOR_WAIT_MAX_ATTEMPTS") {
            self.wait_max_attempts = parse_var("ROTATOR_WAIT_MAX_ATTEMPTS", &v)?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.parameter_name.trim().is_empty() {
            bail!("parameter_name must not be empty");
        }
        if self.role_tag_key.trim().is_empty() || self.role_tag_value.trim().is_empty() {
            bail!("role tag key and value must not be empty");
        }
        if self.join_command.trim().is_empty() {
            bail!("join_command must not be empty");
        }
        if self.freshness_hours <= 0 {
            bail!("freshness_hours must be positive, got {}", self.freshness_hours);
        }
        if chrono::Duration::try_hours(self.freshness_hours).is_none() {
            bail!("freshness_hours is out of range, got {}", self.freshness_hours);
        }
        if self.wait_max_attempts == 0 {
            bail!("wait_max_attempts must be at least 1");
        }
        KeyNaming::new(&self.secret_naming)?;
        Ok(())
    }

    pub fn freshness_policy(&self) -> FreshnessPolicy {
        FreshnessPolicy {
            threshold: chrono::Duration::try_hours(self.freshness_hours)
                .unwrap_or(chrono::Duration::MAX),
            always_rotate: self.always_rotate,
        }
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            delay: Duration::from_secs(self.wait_delay_secs),
            max_attempts: self.wait_max_attempts,
        }
    }

    pub fn rotation_settings(&self) -> RotationSettings {
        RotationSettings {
            parameter_name: self.parameter_name.clone(),
            role_tag_value: self.role_tag_value.clone(),
            join_command: self.join_command.clone(),
            policy: self.freshness_policy(),
        }
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid value '{value}' for {name}"))
}
