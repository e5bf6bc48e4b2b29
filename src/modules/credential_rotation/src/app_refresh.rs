/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/modules/credential_rotation/src/app_refresh.rs
*
* Application refresh contract: force the container service to roll its
* tasks and block until the rollout is stable.
*
* OpenEMR containers need several minutes to start (certificate downloads,
* database connectivity checks, initial setup) and old tasks have to drain,
* so a full rolling deployment takes 15-25 minutes. The wait is a bounded
* poll; exhausting it is reported as `RefreshError::TimedOut`, distinct from
* `RefreshError::CallFailed`.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::error::RefreshError;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// Rolls the application's running instances onto the current config.
#[async_trait]
pub trait AppRefresher: Send + Sync {
    async fn refresh(&self) -> Result<(), RefreshError>;
}

/// Bounds of the stabilization wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        // Same bounds as the ECS `services-stable` waiter configuration the
        // deployment was tuned with: 120 polls, 15 seconds apart.
        Self {
            poll_interval: Duration::from_secs(15),
            max_attempts: 120,
        }
    }
}

impl RefreshPolicy {
    /// Upper bound of the time spent waiting.
    pub fn budget(&self) -> Duration {
        self.poll_interval * self.max_attempts
    }
}

/// Snapshot of an ECS service as returned by `describe-services`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceStatus {
    pub status: String,
    pub desired_count: i64,
    pub running_count: i64,
    pub deployments: usize,
}

impl ServiceStatus {
    /// A single deployment with every desired task running.
    pub fn is_stable(&self) -> bool {
        self.deployments == 1 && self.running_count == self.desired_count
    }
}

/// Extracts the status of `service` from a `describe-services` response.
///
/// Failures reported by the API, or a service in any state but `ACTIVE`
/// (missing, draining, inactive), are `CallFailed`: no amount of waiting
/// will make them stable.
pub fn parse_service_status(
    response: &Value,
    cluster: &str,
    service: &str,
) -> Result<ServiceStatus, RefreshError> {
    let call_failed = |reason: String| RefreshError::CallFailed {
        cluster: cluster.to_string(),
        service: service.to_string(),
        reason,
    };

    if let Some(failure) = response
        .get("failures")
        .and_then(Value::as_array)
        .and_then(|f| f.first())
    {
        let reason = failure.get("reason").and_then(Value::as_str).unwrap_or("unknown");
        return Err(call_failed(format!("describe-services reported failure: {}", reason)));
    }

    let entry = response
        .get("services")
        .and_then(Value::as_array)
        .and_then(|services| services.first())
        .ok_or_else(|| call_failed("describe-services returned no service".to_string()))?;

    let status = entry
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("UNKNOWN")
        .to_string();
    if status != "ACTIVE" {
        return Err(call_failed(format!("service status is {}", status)));
    }

    Ok(ServiceStatus {
        status,
        desired_count: entry.get("desiredCount").and_then(Value::as_i64).unwrap_or(0),
        running_count: entry.get("runningCount").and_then(Value::as_i64).unwrap_or(0),
        deployments: entry
            .get("deployments")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0),
    })
}

/// Polls `probe` until it reports stable or the policy is exhausted.
///
/// The first poll happens after one interval, giving the scheduler time to
/// register the new deployment. Returns the number of polls performed.
pub async fn wait_until_stable<F, Fut>(
    policy: RefreshPolicy,
    cluster: &str,
    service: &str,
    mut probe: F,
) -> Result<u32, RefreshError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ServiceStatus, RefreshError>>,
{
    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.poll_interval).await;
        let status = probe().await?;
        debug!(
            attempt,
            running = status.running_count,
            desired = status.desired_count,
            deployments = status.deployments,
            "polled service status"
        );
        if status.is_stable() {
            info!(cluster, service, attempt, "service reached a stable state");
            return Ok(attempt);
        }
    }

    Err(RefreshError::TimedOut {
        cluster: cluster.to_string(),
        service: service.to_string(),
        waited: policy.budget(),
    })
}
