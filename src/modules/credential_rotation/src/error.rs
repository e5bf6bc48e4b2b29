/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/modules/credential_rotation/src/error.rs
*
* Error taxonomy of the rotation tool. Collaborator errors (secret store,
* database, ECS refresh, health probe, file editor) are separate enums so the
* orchestrator can tell "the call failed" apart from "the wait timed out" and
* reads apart from writes. `RotationError` is what the orchestrator surfaces;
* its variants line up with the recovery that was (or was not) performed and
* each one maps to a process exit code.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::secrets::Slot;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AwsCliError {
    #[error("the 'aws' CLI was not found in PATH: {0}")]
    NotInstalled(#[from] which::Error),

    #[error("failed to launch '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("'{command}' returned output that is not valid JSON: {source}")]
    InvalidJson {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to stage the request payload for '{command}': {source}")]
    Payload {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl AwsCliError {
    /// The captured stderr, when the CLI ran and failed.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            AwsCliError::Failed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("secret '{0}' does not exist")]
    NotFound(String),

    #[error("access to secret '{0}' was denied")]
    AccessDenied(String),

    #[error("secret '{secret_id}' does not have the expected shape: {reason}")]
    Malformed { secret_id: String, reason: String },

    #[error(transparent)]
    Cli(#[from] AwsCliError),
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("'{value}' is not an acceptable {kind} name")]
    InvalidIdentifier { kind: &'static str, value: String },

    #[error("connecting to {host}:{port} as '{username}' timed out after {timeout:?}")]
    ConnectTimeout {
        host: String,
        port: u16,
        username: String,
        timeout: Duration,
    },

    #[error("connecting to {host}:{port} as '{username}' failed: {source}")]
    Connect {
        host: String,
        port: u16,
        username: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("statement failed while {action}: {source}")]
    Statement {
        action: String,
        #[source]
        source: sqlx::Error,
    },
}

#[derive(Debug, Error)]
pub enum RefreshError {
    /// The redeploy request or one of the status polls could not be completed.
    #[error("ECS call failed for service '{service}' in cluster '{cluster}': {reason}")]
    CallFailed {
        cluster: String,
        service: String,
        reason: String,
    },

    /// The deployment was requested but never reported stable within the bound.
    #[error("service '{service}' in cluster '{cluster}' did not stabilize within {waited:?}")]
    TimedOut {
        cluster: String,
        service: String,
        waited: Duration,
    },
}

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("failed to build the health probe HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("health probe to '{url}' failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("health probe to '{url}' returned status {status}")]
    Unhealthy { url: String, status: u16 },
}

#[derive(Debug, Error)]
pub enum SqlConfError {
    #[error("'${0}' assignment not found in sqlconf.php")]
    MissingField(&'static str),

    #[error("'${field}' is assigned more than once in sqlconf.php")]
    DuplicateField { field: &'static str },

    #[error("'$port' value '{0}' is not a valid port number")]
    InvalidPort(String),
}

#[derive(Debug, Error)]
pub enum AtomicWriteError {
    #[error("'{0}' has no parent directory")]
    NoParent(PathBuf),

    #[error("failed to {action} '{path}': {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The externally visible phase in which a post-flip failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Refresh,
    Validation,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Refresh => f.write_str("application refresh"),
            Step::Validation => f.write_str("post-refresh validation"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RotationError {
    #[error("OpenEMR sqlconf.php not found at discovered path: {0}")]
    ConfigNotFound(PathBuf),

    #[error("failed to read '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("runtime config '{path}' is malformed: {source}")]
    ConfigMalformed {
        path: PathBuf,
        #[source]
        source: SqlConfError,
    },

    #[error("failed to read secret '{secret_id}': {source}")]
    SecretRead {
        secret_id: String,
        #[source]
        source: SecretStoreError,
    },

    /// A bookkeeping write made before the on-disk flip.
    #[error("failed to write secret '{secret_id}' while {stage}: {source}")]
    SecretWrite {
        secret_id: String,
        stage: &'static str,
        #[source]
        source: SecretStoreError,
    },

    /// The final `active_slot` write after a successful rotation. The
    /// application already runs on `activated`; the next run reconciles.
    #[error("slot {activated} is live but recording it in secret '{secret_id}' failed: {source}")]
    CommitWrite {
        secret_id: String,
        activated: Slot,
        #[source]
        source: SecretStoreError,
    },

    /// The account about to be captured or re-passworded is one the rotation
    /// must never touch: the admin account or the login in live use.
    #[error("refusing to rotate database user '{username}': it is {role}")]
    AccountConflict { username: String, role: &'static str },

    #[error("failed to provision database user '{username}': {source}")]
    Provision {
        username: String,
        #[source]
        source: DatabaseError,
    },

    #[error("standby slot {slot} is not reachable with its new credentials: {source}")]
    StandbyUnreachable {
        slot: Slot,
        #[source]
        source: DatabaseError,
    },

    #[error("failed to rewrite the runtime config: {0}")]
    FileWrite(#[from] AtomicWriteError),

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error("database connectivity check for slot {slot} failed: {source}")]
    DatabaseHealth {
        slot: Slot,
        #[source]
        source: DatabaseError,
    },

    #[error(transparent)]
    Health(#[from] HealthError),

    #[error("rotation failed during {step} and was rolled back to slot {restored}")]
    RolledBack {
        step: Step,
        restored: Slot,
        #[source]
        cause: Box<RotationError>,
    },

    #[error(
        "rotation failed during {step} ({cause}) and the rollback to slot {restored} did not \
         complete; manual intervention required"
    )]
    RollbackFailed {
        step: Step,
        restored: Slot,
        cause: Box<RotationError>,
        #[source]
        rollback: Box<RotationError>,
    },

    #[error(transparent)]
    Setup(#[from] AwsCliError),
}

impl RotationError {
    /// Process exit code reported by the binary for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            RotationError::Setup(_) => 1,
            RotationError::RolledBack { .. } => 3,
            RotationError::RollbackFailed { .. } => 4,
            RotationError::CommitWrite { .. } => 5,
            _ => 2,
        }
    }

    /// True when an operator has to look at the deployment by hand.
    pub fn requires_operator(&self) -> bool {
        matches!(self, RotationError::RollbackFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, RotationError>;
