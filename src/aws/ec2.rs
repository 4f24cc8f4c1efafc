//! EC2-backed instance inventory and termination

use crate::aws::context::AwsContext;
use crate::classify::InstanceRecord;
use crate::reaper::{InstancePage, InstanceSource};
use anyhow::{Context, Result};
use aws_sdk_ec2::types::{AttributeBooleanValue, Filter, Tag};
use aws_sdk_ec2::Client;
use chrono::DateTime;
use std::collections::HashMap;
use tracing::debug;

/// EC2 client wrapping the SDK for the operations the reaper needs.
pub struct Ec2Client {
    client: Client,
}

impl Ec2Client {
    /// Create a new EC2 client (loads AWS config from environment)
    pub async fn new(region: &str) -> Self {
        Self::from_context(&AwsContext::new(region, None).await)
    }

    /// Create an EC2 client from a pre-loaded AWS context
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.ec2_client(),
        }
    }

    /// Fetch one page of running instances.
    ///
    /// Applies the server-side `instance-state-name = running` filter and
    /// flattens reservation groups into a single sequence, preserving
    /// encounter order. Instances without an id or launch time cannot be
    /// evaluated and are skipped.
    pub async fn describe_running_page(&self, continuation: Option<&str>) -> Result<InstancePage> {
        let mut request = self.client.describe_instances().filters(
            Filter::builder()
                .name("instance-state-name")
                .values("running")
                .build(),
        );

        if let Some(token) = continuation {
            request = request.next_token(token);
        }

        let response = request
            .send()
            .await
            .context("Failed to describe instances")?;

        let mut instances = Vec::new();
        for reservation in response.reservations() {
            for instance in reservation.instances() {
                let Some(id) = instance.instance_id() else {
                    continue;
                };
                let launch_time = instance
                    .launch_time()
                    .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()));
                let Some(launch_time) = launch_time else {
                    debug!(instance_id = %id, "Instance has no launch time, skipping");
                    continue;
                };

                instances.push(InstanceRecord {
                    id: id.to_string(),
                    launch_time,
                    tags: extract_tags(instance.tags()),
                });
            }
        }

        debug!(
            count = instances.len(),
            more = response.next_token().is_some(),
            "Fetched instance page"
        );

        Ok(InstancePage {
            instances,
            next_token: response.next_token().map(|s| s.to_string()),
        })
    }

    /// Terminate all given instances with a single batched call.
    pub async fn terminate_instances(&self, instance_ids: &[String]) -> Result<()> {
        self.client
            .terminate_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await
            .context("Failed to terminate instances")?;

        Ok(())
    }

    /// Clear the `disableApiTermination` attribute on one instance.
    pub async fn disable_termination_protection(&self, instance_id: &str) -> Result<()> {
        self.client
            .modify_instance_attribute()
            .instance_id(instance_id)
            .disable_api_termination(AttributeBooleanValue::builder().value(false).build())
            .send()
            .await
            .with_context(|| {
                format!("Failed to disable termination protection for {instance_id}")
            })?;

        Ok(())
    }
}

impl InstanceSource for Ec2Client {
    async fn list_running_instances(&self, continuation: Option<String>) -> Result<InstancePage> {
        Ec2Client::describe_running_page(self, continuation.as_deref()).await
    }

    async fn terminate_instances(&self, instance_ids: &[String]) -> Result<()> {
        Ec2Client::terminate_instances(self, instance_ids).await
    }

    async fn disable_termination_protection(&self, instance_id: &str) -> Result<()> {
        Ec2Client::disable_termination_protection(self, instance_id).await
    }
}

/// Extract EC2 tags into a map, keeping key casing as received.
///
/// A tag with a missing value still grants key presence, so it maps to an
/// empty string rather than being dropped.
fn extract_tags(tags: &[Tag]) -> HashMap<String, String> {
    tags.iter()
        .filter_map(|t| {
            t.key()
                .map(|k| (k.to_string(), t.value().unwrap_or_default().to_string()))
        })
        .collect()
}
