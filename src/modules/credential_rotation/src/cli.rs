/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/modules/credential_rotation/src/cli.rs
* Command-line interface of the `credential-rotation` binary. The scheduled
* ECS task configures it through environment variables, so every option can
* also be given as a flag for manual runs.
* SPDX-License-Identifier: Apache-2.0 */

use clap::{Parser, ValueEnum};
use credential_rotation::app_refresh::RefreshPolicy;
use credential_rotation::{RotationContext, RuntimeSettings};
use std::path::PathBuf;
use std::time::Duration;
use tracing_layer::LogFormat;

/// Rotates the OpenEMR database credentials between the A and B slots.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// AWS region of the secrets and the ECS cluster.
    #[arg(long, env = "AWS_REGION")]
    pub region: String,

    /// Secret holding the dual-slot application credentials.
    #[arg(long, env = "RDS_SLOTS_SECRET_ID")]
    pub rds_slots_secret_id: String,

    /// Secret holding the database admin credentials.
    #[arg(long, env = "RDS_ADMIN_SECRET_ID")]
    pub rds_admin_secret_id: String,

    /// Mount point of the OpenEMR `sites/` directory.
    #[arg(long, env = "SITES_MOUNT_ROOT", default_value = "/mnt/openemr-sites")]
    pub sites_mount_root: PathBuf,

    #[arg(long, env = "ECS_CLUSTER_NAME")]
    pub ecs_cluster_name: String,

    #[arg(long, env = "ECS_SERVICE_NAME")]
    pub ecs_service_name: String,

    /// URL probed after the refresh. Skipped when unset.
    #[arg(long, env = "OPENEMR_HEALTH_URL")]
    pub openemr_health_url: Option<String>,

    /// Discover and reconcile only; change nothing.
    #[arg(long, env = "DRY_RUN", default_value_t = false)]
    pub dry_run: bool,

    /// Log output: `json` or `pretty` (alias `text`).
    #[arg(long, env = "LOG_FORMAT", default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Format of the final report on stdout.
    #[arg(long, env = "OUTPUT", value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Seconds between ECS stability polls.
    #[arg(long, env = "REFRESH_POLL_INTERVAL_SECS", default_value_t = 15)]
    pub refresh_poll_interval_secs: u64,

    /// Stability polls before the refresh is declared timed out.
    #[arg(long, env = "REFRESH_MAX_ATTEMPTS", default_value_t = 120)]
    pub refresh_max_attempts: u32,

    #[arg(long, env = "DB_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub db_connect_timeout_secs: u64,

    #[arg(long, env = "HEALTH_TIMEOUT_SECS", default_value_t = 10)]
    pub health_timeout_secs: u64,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    pub fn context(&self) -> RotationContext {
        RotationContext {
            region: self.region.clone(),
            rds_slots_secret_id: self.rds_slots_secret_id.clone(),
            rds_admin_secret_id: self.rds_admin_secret_id.clone(),
            sites_mount_root: self.sites_mount_root.clone(),
            ecs_cluster_name: self.ecs_cluster_name.clone(),
            ecs_service_name: self.ecs_service_name.clone(),
            openemr_health_url: self.openemr_health_url.clone().filter(|url| !url.trim().is_empty()),
            dry_run: self.dry_run,
        }
    }

    pub fn settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            refresh: RefreshPolicy {
                poll_interval: Duration::from_secs(self.refresh_poll_interval_secs),
                max_attempts: self.refresh_max_attempts.max(1),
            },
            db_connect_timeout: Duration::from_secs(self.db_connect_timeout_secs),
            health_timeout: Duration::from_secs(self.health_timeout_secs),
        }
    }
}
