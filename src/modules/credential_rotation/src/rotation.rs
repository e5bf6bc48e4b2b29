/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/modules/credential_rotation/src/rotation.rs
*
* The rotation orchestrator. One run walks through:
*
* 1. Discover: locate `sqlconf.php`, parse the credentials OpenEMR is
*    using right now, read the slot secret and the admin secret.
* 2. Reconcile: find which slot the file actually matches. The file is what
*    the running application uses, so it wins over the secret's bookkeeping:
*    - matches the active slot: steady state;
*    - matches the standby slot: a previous run flipped the file but never
*      recorded it, so `active_slot` is moved to the file's slot;
*    - matches neither (first run, manual edit): the file's credentials are
*      captured into the active slot.
* 3. Provision the standby user with a fresh password (admin credential).
* 4. Validate that the standby credentials can log in.
* 5. Stage the new standby password in the secret (active slot unchanged),
*    then atomically flip `sqlconf.php` to the standby slot.
* 6. Force an ECS rollout and wait for it to stabilize.
* 7. Validate database connectivity and, if configured, the HTTP endpoint.
* 8. Commit `active_slot`, or restore the original file, refresh again and
*    validate the previous slot.
*
* Before anything is written, the standby user is checked against the admin
* account and the live login; rotating either would lock out the admin
* credential or the running application.
*
* Dry runs stop after step 2 without writing anything.
*
* A failure of the commit write in step 8 leaves the application correctly
* running on the new slot with stale bookkeeping. This is tolerated: the
* staged password from step 5 makes the next run see "file matches standby"
* and adopt it.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::app_refresh::AppRefresher;
use crate::atomic_file::ConfigWriter;
use crate::config_discovery::discover_runtime_paths;
use crate::context::RotationContext;
use crate::database::DatabaseAdmin;
use crate::error::{Result, RotationError, Step};
use crate::health::HealthProbe;
use crate::password::generate_password;
use crate::secrets::{decode, AdminCredentials, SecretStore, Slot, SlotCredentials, SlotSecret};
use crate::sqlconf::{self, SqlConf};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Which reconciliation branch a run took.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Reconciliation {
    /// The file matches the recorded active slot.
    InSync,
    /// The file matches the recorded standby slot, which became active.
    AdoptedStandby,
    /// The file matched neither slot and was captured into the active slot.
    Bootstrapped,
}

impl fmt::Display for Reconciliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reconciliation::InSync => f.write_str("in sync"),
            Reconciliation::AdoptedStandby => f.write_str("adopted standby"),
            Reconciliation::Bootstrapped => f.write_str("bootstrapped"),
        }
    }
}

/// Resolves disagreement between the file and the slot secret in place.
///
/// The active slot is tested first, so a secret holding identical
/// credentials in both slots counts as in sync.
pub fn reconcile(disk: &SqlConf, slots: &mut SlotSecret) -> Reconciliation {
    let active = slots.active_slot;
    if disk.matches(slots.slot(active)) {
        return Reconciliation::InSync;
    }

    let standby = active.other();
    if disk.matches(slots.slot(standby)) {
        slots.active_slot = standby;
        return Reconciliation::AdoptedStandby;
    }

    *slots.slot_mut(active) = disk.to_slot_credentials();
    Reconciliation::Bootstrapped
}

fn account_conflict(username: &str, role: &'static str) -> RotationError {
    error!(username, role, "standby rotation would alter a protected database user");
    RotationError::AccountConflict {
        username: username.to_string(),
        role,
    }
}

/// Summary of a successful (or dry) run.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RotationReport {
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
    pub reconciliation: Reconciliation,
    /// Active slot after reconciliation, i.e. the one the file was left on
    /// before the rotation itself.
    pub previous_active: Slot,
    /// Standby slot that was (or would be) rotated and activated.
    pub rotated_slot: Slot,
    pub rotated_username: String,
    /// Whether `rotated_slot` is now recorded as active.
    pub activated: bool,
}

impl fmt::Display for RotationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            write!(
                f,
                "dry run ({}): would rotate slot {} ('{}') and switch from slot {}",
                self.reconciliation, self.rotated_slot, self.rotated_username, self.previous_active
            )
        } else {
            write!(
                f,
                "rotation complete ({}): slot {} ('{}') is active, slot {} is standby",
                self.reconciliation, self.rotated_slot, self.rotated_username, self.previous_active
            )
        }
    }
}

/// The external services a rotation talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub secrets: Arc<dyn SecretStore>,
    pub database: Arc<dyn DatabaseAdmin>,
    pub refresher: Arc<dyn AppRefresher>,
    pub health: Arc<dyn HealthProbe>,
    pub writer: Arc<dyn ConfigWriter>,
}

pub struct RotationOrchestrator {
    context: RotationContext,
    services: Collaborators,
}

impl RotationOrchestrator {
    pub fn new(context: RotationContext, services: Collaborators) -> Self {
        Self { context, services }
    }

    /// Runs one rotation. See the module documentation for the sequence.
    pub async fn rotate(&self) -> Result<RotationReport> {
        let started_at = Utc::now();
        let ctx = &self.context;
        info!(
            dry_run = ctx.dry_run,
            cluster = %ctx.ecs_cluster_name,
            service = %ctx.ecs_service_name,
            "starting credential rotation"
        );

        // 1. Discover.
        let paths = discover_runtime_paths(&ctx.sites_mount_root)?;
        let sqlconf_path = paths.sqlconf_path;
        let original = std::fs::read_to_string(&sqlconf_path).map_err(|source| RotationError::ConfigRead {
            path: sqlconf_path.clone(),
            source,
        })?;
        let on_disk = SqlConf::parse(&original).map_err(|source| RotationError::ConfigMalformed {
            path: sqlconf_path.clone(),
            source,
        })?;
        let mut slots: SlotSecret = self.read_secret(&ctx.rds_slots_secret_id).await?;
        let admin: AdminCredentials = self.read_secret(&ctx.rds_admin_secret_id).await?;

        // 2. Reconcile.
        let recorded_active = slots.active_slot;
        let reconciliation = reconcile(&on_disk, &mut slots);
        if reconciliation == Reconciliation::Bootstrapped && on_disk.login == admin.username {
            return Err(account_conflict(&on_disk.login, "the admin account"));
        }
        match reconciliation {
            Reconciliation::InSync => {
                info!(active_slot = %recorded_active, "runtime config matches the active slot");
            }
            Reconciliation::AdoptedStandby => {
                warn!(
                    recorded = %recorded_active,
                    observed = %slots.active_slot,
                    "runtime config points at the standby slot; adopting it as active"
                );
            }
            Reconciliation::Bootstrapped => {
                warn!(
                    active_slot = %slots.active_slot,
                    login = %on_disk.login,
                    "runtime config matches neither slot; capturing it into the active slot"
                );
            }
        }

        // The standby user gets ALTERed below; it must be neither the admin
        // nor the login OpenEMR is connected with.
        let active = slots.active_slot;
        let standby = self.services.secrets.standby_slot(active);
        let previous = slots.slot(active).clone();
        let standby_user = &slots.slot(standby).username;
        if *standby_user == admin.username {
            return Err(account_conflict(standby_user, "the admin account"));
        }
        if *standby_user == previous.username {
            return Err(account_conflict(standby_user, "the login the application is running on"));
        }

        if reconciliation != Reconciliation::InSync && !ctx.dry_run {
            self.write_slots(&slots, "recording the reconciled slot state").await?;
        }
        let mut report = RotationReport {
            started_at,
            dry_run: ctx.dry_run,
            reconciliation,
            previous_active: active,
            rotated_slot: standby,
            rotated_username: slots.slot(standby).username.clone(),
            activated: false,
        };

        if ctx.dry_run {
            info!(
                active_slot = %active,
                standby_slot = %standby,
                standby_user = %report.rotated_username,
                path = %sqlconf_path.display(),
                "dry run: would provision the standby user, flip the runtime config, refresh and validate"
            );
            return Ok(report);
        }

        // 3. Provision the standby user.
        let mut next = slots.slot(standby).clone();
        next.password = generate_password();
        self.services
            .database
            .upsert_user(&admin, &next)
            .await
            .map_err(|source| RotationError::Provision {
                username: next.username.clone(),
                source,
            })?;

        // 4. Validate it before anything visible changes.
        self.services
            .database
            .check_connection(&next)
            .await
            .map_err(|source| RotationError::StandbyUnreachable { slot: standby, source })?;
        info!(slot = %standby, username = %next.username, "standby credentials validated");

        // 5. Stage the password, then flip the file.
        *slots.slot_mut(standby) = next.clone();
        self.write_slots(&slots, "staging the standby password").await?;

        let rendered = sqlconf::render(&original, &next).map_err(|source| RotationError::ConfigMalformed {
            path: sqlconf_path.clone(),
            source,
        })?;
        self.services.writer.replace(&sqlconf_path, &rendered)?;
        info!(slot = %standby, path = %sqlconf_path.display(), "runtime config now points at the standby slot");

        // 6-7. Refresh and validate.
        if let Err((step, cause)) = self.refresh_and_validate(standby, &next).await {
            return Err(self.rollback(&sqlconf_path, &original, active, &previous, step, cause).await);
        }

        // 8. Commit.
        slots.active_slot = standby;
        self.services
            .secrets
            .put_payload(&ctx.rds_slots_secret_id, &slots.to_payload())
            .await
            .map_err(|source| {
                error!(
                    alert = "secret_commit_failed",
                    secret_id = %ctx.rds_slots_secret_id,
                    activated = %standby,
                    error = %source,
                    "application runs on the new slot but active_slot was not recorded; the next run will reconcile"
                );
                RotationError::CommitWrite {
                    secret_id: ctx.rds_slots_secret_id.clone(),
                    activated: standby,
                    source,
                }
            })?;

        report.activated = true;
        info!(active_slot = %standby, username = %next.username, "credential rotation complete");
        Ok(report)
    }

    async fn read_secret<T: DeserializeOwned>(&self, secret_id: &str) -> Result<T> {
        self.services
            .secrets
            .get_secret(secret_id)
            .await
            .and_then(|payload| decode(secret_id, payload))
            .map_err(|source| {
                error!(secret_id, error = %source, "failed to read secret");
                RotationError::SecretRead {
                    secret_id: secret_id.to_string(),
                    source,
                }
            })
    }

    async fn write_slots(&self, slots: &SlotSecret, stage: &'static str) -> Result<()> {
        let secret_id = &self.context.rds_slots_secret_id;
        self.services
            .secrets
            .put_payload(secret_id, &slots.to_payload())
            .await
            .map_err(|source| {
                error!(secret_id = %secret_id, stage, error = %source, "failed to write slot secret");
                RotationError::SecretWrite {
                    secret_id: secret_id.clone(),
                    stage,
                    source,
                }
            })
    }

    async fn refresh_and_validate(
        &self,
        slot: Slot,
        creds: &SlotCredentials,
    ) -> std::result::Result<(), (Step, RotationError)> {
        self.services
            .refresher
            .refresh()
            .await
            .map_err(|e| (Step::Refresh, RotationError::from(e)))?;
        self.validate_runtime(slot, creds)
            .await
            .map_err(|e| (Step::Validation, e))
    }

    async fn validate_runtime(&self, slot: Slot, creds: &SlotCredentials) -> Result<()> {
        self.services
            .database
            .check_connection(creds)
            .await
            .map_err(|source| RotationError::DatabaseHealth { slot, source })?;

        if let Some(url) = &self.context.openemr_health_url {
            self.services.health.probe(url).await?;
        }
        Ok(())
    }

    /// Puts back the original file, rolls the service again and checks the
    /// previous slot. Exactly one attempt; a failure here needs an operator.
    async fn rollback(
        &self,
        path: &Path,
        original: &str,
        restored: Slot,
        previous: &SlotCredentials,
        step: Step,
        cause: RotationError,
    ) -> RotationError {
        warn!(step = %step, error = %cause, restore_slot = %restored, "rotation failed; rolling back the runtime config");

        match self.restore_previous(path, original, restored, previous).await {
            Ok(()) => {
                error!(step = %step, error = %cause, restored_slot = %restored, "rotation rolled back; active slot unchanged");
                RotationError::RolledBack {
                    step,
                    restored,
                    cause: Box::new(cause),
                }
            }
            Err(rollback) => {
                error!(
                    alert = "rollback_failed",
                    step = %step,
                    error = %cause,
                    rollback_error = %rollback,
                    path = %path.display(),
                    "rollback did not complete; manual intervention required"
                );
                RotationError::RollbackFailed {
                    step,
                    restored,
                    cause: Box::new(cause),
                    rollback: Box::new(rollback),
                }
            }
        }
    }

    async fn restore_previous(
        &self,
        path: &Path,
        original: &str,
        restored: Slot,
        previous: &SlotCredentials,
    ) -> Result<()> {
        self.services.writer.replace(path, original)?;
        self.services.refresher.refresh().await?;
        self.validate_runtime(restored, previous).await
    }
}
