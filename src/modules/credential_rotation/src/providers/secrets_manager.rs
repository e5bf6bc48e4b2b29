/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/modules/credential_rotation/src/providers/secrets_manager.rs
*
* `SecretStore` backed by AWS Secrets Manager.
*
* Reads go through `get-secret-value` and decode the `SecretString` field as
* JSON. Writes go through `put-secret-value`; the payload is handed to the
* CLI as a `file://` parameter pointing at a private temporary file so the
* credentials never show up in the process table.
*
* SPDX-License-Identifier: Apache-2.0 */

use super::aws_cli::AwsCli;
use crate::error::{AwsCliError, SecretStoreError};
use crate::secrets::SecretStore;
use async_trait::async_trait;
use serde_json::Value;
use std::io::Write;
use tracing::{debug, info};

pub struct SecretsManagerStore {
    cli: AwsCli,
}

impl SecretsManagerStore {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }
}

/// Maps a CLI failure onto the secret store error taxonomy.
fn classify(secret_id: &str, err: AwsCliError) -> SecretStoreError {
    match err.stderr() {
        Some(stderr) if stderr.contains("ResourceNotFoundException") => {
            SecretStoreError::NotFound(secret_id.to_string())
        }
        Some(stderr) if stderr.contains("AccessDeniedException") => {
            SecretStoreError::AccessDenied(secret_id.to_string())
        }
        _ => SecretStoreError::Cli(err),
    }
}

/// Extracts and parses `SecretString` from a `get-secret-value` response.
fn parse_secret_string(secret_id: &str, response: &Value) -> Result<Value, SecretStoreError> {
    let raw = response
        .get("SecretString")
        .and_then(Value::as_str)
        .ok_or_else(|| SecretStoreError::Malformed {
            secret_id: secret_id.to_string(),
            reason: "response has no SecretString (binary secrets are not supported)".to_string(),
        })?;

    serde_json::from_str(raw).map_err(|e| SecretStoreError::Malformed {
        secret_id: secret_id.to_string(),
        reason: format!("SecretString is not JSON: {}", e),
    })
}

#[async_trait]
impl SecretStore for SecretsManagerStore {
    async fn get_secret(&self, secret_id: &str) -> Result<Value, SecretStoreError> {
        debug!(secret_id, "reading secret");
        let response = self
            .cli
            .run("secretsmanager", "get-secret-value", &["--secret-id", secret_id])
            .await
            .map_err(|e| classify(secret_id, e))?;
        parse_secret_string(secret_id, &response)
    }

    async fn put_payload(&self, secret_id: &str, payload: &Value) -> Result<(), SecretStoreError> {
        let command = "aws secretsmanager put-secret-value".to_string();
        let payload_error = |source| {
            SecretStoreError::Cli(AwsCliError::Payload {
                command: command.clone(),
                source,
            })
        };

        // NamedTempFile is created with 0600 permissions and removed on drop.
        let mut file = tempfile::Builder::new()
            .prefix("secret-payload-")
            .suffix(".json")
            .tempfile()
            .map_err(payload_error)?;
        file.write_all(payload.to_string().as_bytes()).map_err(payload_error)?;
        file.flush().map_err(payload_error)?;

        let file_arg = format!("file://{}", file.path().display());
        self.cli
            .run(
                "secretsmanager",
                "put-secret-value",
                &["--secret-id", secret_id, "--secret-string", &file_arg],
            )
            .await
            .map_err(|e| classify(secret_id, e))?;

        info!(secret_id, "secret payload updated");
        Ok(())
    }
}
