/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/modules/credential_rotation/src/providers/aws_cli.rs
*
* Thin async wrapper around the AWS CLI. Every call is pinned to the
* configured region and forced to JSON output, and the result is parsed into
* a `serde_json::Value` for the provider modules to pick apart.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::error::AwsCliError;
use serde_json::Value;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

/// Handle on the `aws` binary bound to one region.
#[derive(Clone, Debug)]
pub struct AwsCli {
    binary: PathBuf,
    region: String,
}

impl AwsCli {
    /// Locates `aws` in PATH.
    pub fn new(region: impl Into<String>) -> Result<Self, AwsCliError> {
        let binary = which::which("aws")?;
        Ok(Self::with_binary(binary, region))
    }

    /// Uses an explicit binary, bypassing the PATH lookup.
    pub fn with_binary(binary: impl Into<PathBuf>, region: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            region: region.into(),
        }
    }

    /// Runs `aws <service> <operation> <args...> --region <r> --output json`.
    ///
    /// Empty stdout (some write operations print nothing) yields `Value::Null`.
    pub async fn run(&self, service: &str, operation: &str, args: &[&str]) -> Result<Value, AwsCliError> {
        let command = format!("aws {} {}", service, operation);
        debug!(command = %command, region = %self.region, "invoking AWS CLI");

        let output = Command::new(&self.binary)
            .arg(service)
            .arg(operation)
            .args(args)
            .arg("--region")
            .arg(&self.region)
            .arg("--output")
            .arg("json")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| AwsCliError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(AwsCliError::Failed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&stdout).map_err(|source| AwsCliError::InvalidJson { command, source })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Writes an executable shell script standing in for `aws`.
    fn fake_aws(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("aws");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh\n{}", body).unwrap();
        drop(file);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_run_passes_region_and_parses_json() {
        let dir = TempDir::new().unwrap();
        // Echo the arguments back as a JSON array.
        let binary = fake_aws(
            &dir,
            r#"printf '['; sep=''; for a in "$@"; do printf '%s"%s"' "$sep" "$a"; sep=','; done; printf ']'"#,
        );
        let cli = AwsCli::with_binary(binary, "us-east-1");

        let value = cli.run("ecs", "describe-services", &["--cluster", "c1"]).await.unwrap();
        let args: Vec<&str> = value.as_array().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
        assert_eq!(
            args,
            vec!["ecs", "describe-services", "--cluster", "c1", "--region", "us-east-1", "--output", "json"]
        );
    }

    #[tokio::test]
    async fn test_run_reports_stderr_on_failure() {
        let dir = TempDir::new().unwrap();
        let binary = fake_aws(&dir, "echo 'An error occurred (AccessDeniedException)' >&2; exit 254");
        let cli = AwsCli::with_binary(binary, "us-east-1");

        let err = cli.run("secretsmanager", "get-secret-value", &[]).await.unwrap_err();
        assert!(err.stderr().unwrap().contains("AccessDeniedException"));
    }

    #[tokio::test]
    async fn test_run_treats_empty_output_as_null() {
        let dir = TempDir::new().unwrap();
        let binary = fake_aws(&dir, "exit 0");
        let cli = AwsCli::with_binary(binary, "eu-west-1");

        assert_eq!(cli.run("ecs", "update-service", &[]).await.unwrap(), Value::Null);
    }
}
