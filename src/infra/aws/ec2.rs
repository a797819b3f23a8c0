use anyhow::{Context, Result};
use aws_sdk_ec2::types::Filter;
use kube_join_rotator::services::{InstanceId, InstanceInventory, InstanceRecord};

use super::to_utc;

/// Lists running EC2 instances by tag.
pub struct Ec2Inventory {
    client: aws_sdk_ec2::Client,
}

impl Ec2Inventory {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_ec2::Client::new(config),
        }
    }
}

#[async_trait::async_trait]
impl InstanceInventory for Ec2Inventory {
    async fn running_instances(
        &self,
        tag_key: &str,
        tag_value: &str,
    ) -> Result<Vec<InstanceRecord>> {
        let mut records = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let resp = self
                .client
                .describe_instances()
                .filters(
                    Filter::builder()
                        .name(format!("tag:{tag_key}"))
                        .values(tag_value)
                        .build(),
                )
                .filters(
                    Filter::builder()
                        .name("instance-state-name")
                        .values("running")
                        .build(),
                )
                .set_next_token(next_token.take())
                .send()
                .await
                .with_context(|| format!("EC2 DescribeInstances failed for tag:{tag_key}={tag_value}"))?;

            for reservation in resp.reservations() {
                for instance in reservation.instances() {
                    let Some(id) = instance.instance_id() else {
                        continue;
                    };
                    records.push(InstanceRecord {
                        id: InstanceId::from(id),
                        launch_time: instance
                            .launch_time()
                            .and_then(|t| to_utc(t.secs(), t.subsec_nanos())),
                    });
                }
            }

            match resp.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(records)
    }
}
