/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/modules/credential_rotation/src/health.rs
*
* HTTP probe of the OpenEMR health endpoint. After the ECS rollout reports
* stable the load balancer may still be registering the new targets, so the
* probe retries a few times before calling the application unhealthy.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::error::HealthError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Succeeds when `url` answers a GET with a 2xx status.
    async fn probe(&self, url: &str) -> Result<(), HealthError>;
}

pub struct HttpHealthProbe {
    client: reqwest::Client,
    attempts: u32,
    retry_delay: Duration,
}

impl HttpHealthProbe {
    pub fn new(timeout: Duration) -> Result<Self, HealthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("credential-rotation/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(HealthError::Client)?;
        Ok(Self {
            client,
            attempts: 3,
            retry_delay: Duration::from_secs(5),
        })
    }

    pub fn with_retries(mut self, attempts: u32, retry_delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    async fn probe_once(&self, url: &str) -> Result<(), HealthError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| HealthError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(HealthError::Unhealthy {
                url: url.to_string(),
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, url: &str) -> Result<(), HealthError> {
        let mut attempt = 1;
        loop {
            match self.probe_once(url).await {
                Ok(()) => {
                    info!(url, attempt, "application health check passed");
                    return Ok(());
                }
                Err(e) if attempt < self.attempts => {
                    warn!(url, attempt, error = %e, "application health check failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
