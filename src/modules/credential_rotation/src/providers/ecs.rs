/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/modules/credential_rotation/src/providers/ecs.rs
* Implements `AppRefresher` for an ECS service: `update-service
* --force-new-deployment` followed by bounded `describe-services` polling.
* SPDX-License-Identifier: Apache-2.0 */

use super::aws_cli::AwsCli;
use crate::app_refresh::{parse_service_status, wait_until_stable, AppRefresher, RefreshPolicy};
use crate::error::RefreshError;
use async_trait::async_trait;
use tracing::info;

pub struct EcsServiceRefresher {
    cli: AwsCli,
    cluster: String,
    service: String,
    policy: RefreshPolicy,
}

impl EcsServiceRefresher {
    pub fn new(cli: AwsCli, cluster: impl Into<String>, service: impl Into<String>, policy: RefreshPolicy) -> Self {
        Self {
            cli,
            cluster: cluster.into(),
            service: service.into(),
            policy,
        }
    }

    fn call_failed(&self, reason: String) -> RefreshError {
        RefreshError::CallFailed {
            cluster: self.cluster.clone(),
            service: self.service.clone(),
            reason,
        }
    }
}

#[async_trait]
impl AppRefresher for EcsServiceRefresher {
    async fn refresh(&self) -> Result<(), RefreshError> {
        info!(
            cluster = %self.cluster,
            service = %self.service,
            budget_secs = self.policy.budget().as_secs(),
            "forcing a new ECS deployment"
        );

        self.cli
            .run(
                "ecs",
                "update-service",
                &["--cluster", &self.cluster, "--service", &self.service, "--force-new-deployment"],
            )
            .await
            .map_err(|e| self.call_failed(e.to_string()))?;

        wait_until_stable(self.policy, &self.cluster, &self.service, || async move {
            let response = self
                .cli
                .run(
                    "ecs",
                    "describe-services",
                    &["--cluster", &self.cluster, "--services", &self.service],
                )
                .await
                .map_err(|e| self.call_failed(e.to_string()))?;
            parse_service_status(&response, &self.cluster, &self.service)
        })
        .await?;

        Ok(())
    }
}
