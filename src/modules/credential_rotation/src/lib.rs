/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/modules/credential_rotation/src/lib.rs
*
* Dual-slot rotation of the OpenEMR database credentials.
*
* The library exposes the orchestrator (`rotation`), the collaborator traits
* it is written against and their AWS/MySQL/HTTP implementations. `run` wires
* the production collaborators together for the `credential-rotation` binary;
* tests build `RotationOrchestrator` directly with fakes.
*
* SPDX-License-Identifier: Apache-2.0 */

pub mod app_refresh;
pub mod atomic_file;
pub mod config_discovery;
pub mod context;
pub mod database;
pub mod error;
pub mod health;
pub mod password;
pub mod providers;
pub mod rotation;
pub mod secrets;
pub mod sqlconf;

use std::sync::Arc;

pub use context::{RotationContext, RuntimeSettings};
pub use error::{Result, RotationError};
pub use rotation::{Collaborators, Reconciliation, RotationOrchestrator, RotationReport};
pub use secrets::Slot;

use atomic_file::AtomicConfigWriter;
use database::MySqlAdmin;
use health::HttpHealthProbe;
use providers::{AwsCli, EcsServiceRefresher, SecretsManagerStore};

/// Builds the production collaborators for `ctx` and runs one rotation.
pub async fn run(ctx: RotationContext, settings: RuntimeSettings) -> Result<RotationReport> {
    let cli = AwsCli::new(ctx.region.clone())?;
    let services = Collaborators {
        secrets: Arc::new(SecretsManagerStore::new(cli.clone())),
        database: Arc::new(MySqlAdmin::new(settings.db_connect_timeout)),
        refresher: Arc::new(EcsServiceRefresher::new(
            cli,
            ctx.ecs_cluster_name.clone(),
            ctx.ecs_service_name.clone(),
            settings.refresh,
        )),
        health: Arc::new(HttpHealthProbe::new(settings.health_timeout)?),
        writer: Arc::new(AtomicConfigWriter),
    };

    RotationOrchestrator::new(ctx, services).rotate().await
}
