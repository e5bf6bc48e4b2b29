/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/modules/credential_rotation/src/context.rs
*
* Input of one rotation run. `RotationContext` identifies what to rotate and
* where; `RuntimeSettings` carries the timing knobs of the collaborators.
* Both are built once at startup and never change during the run.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::app_refresh::RefreshPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RotationContext {
    /// AWS region of the secrets and the ECS cluster.
    pub region: String,
    /// Dual-slot application credential secret.
    pub rds_slots_secret_id: String,
    /// Admin credential secret used to manage the application user.
    pub rds_admin_secret_id: String,
    /// Mount point of the OpenEMR `sites/` directory.
    pub sites_mount_root: PathBuf,
    pub ecs_cluster_name: String,
    pub ecs_service_name: String,
    /// Optional URL probed after the refresh; skipped when absent.
    #[serde(default)]
    pub openemr_health_url: Option<String>,
    /// Discover and reconcile only, without any mutation.
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub refresh: RefreshPolicy,
    pub db_connect_timeout: Duration,
    pub health_timeout: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            refresh: RefreshPolicy::default(),
            db_connect_timeout: Duration::from_secs(10),
            health_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_deserializes_with_optional_fields_defaulted() {
        let ctx: RotationContext = serde_json::from_str(
            r#"{
                "region": "us-east-1",
                "rds_slots_secret_id": "openemr/rds-slots",
                "rds_admin_secret_id": "openemr/rds-admin",
                "sites_mount_root": "/mnt/openemr-sites",
                "ecs_cluster_name": "openemr",
                "ecs_service_name": "openemr-service"
            }"#,
        )
        .unwrap();
        assert_eq!(ctx.openemr_health_url, None);
        assert!(!ctx.dry_run);
        assert_eq!(ctx.sites_mount_root, PathBuf::from("/mnt/openemr-sites"));
    }
}
