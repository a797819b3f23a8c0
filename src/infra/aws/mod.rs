//! AWS-backed implementations of the service traits.
//!
//! [`SsmParameterStore`] and [`SsmRemoteExecutor`] use Systems Manager,
//! [`Ec2Inventory`] queries EC2, and [`SecretsManagerStore`] wraps Secrets Manager.

mod ec2;
mod secrets_manager;
mod ssm;

pub use ec2::Ec2Inventory;
pub use secrets_manager::SecretsManagerStore;
pub use ssm::{SsmParameterStore, SsmRemoteExecutor};

use aws_config::{BehaviorVersion, Region};
use chrono::{DateTime, Utc};

/// Loads the ambient AWS configuration (env vars, profile, instance or
/// function role) pinned to `region`.
pub async fn load_sdk_config(region: &str) -> aws_config::SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

/// Converts an SDK timestamp, given as seconds and sub-second nanos, to UTC.
fn to_utc(secs: i64, subsec_nanos: u32) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, subsec_nanos)
}
