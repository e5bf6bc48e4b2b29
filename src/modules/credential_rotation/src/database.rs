/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/modules/credential_rotation/src/database.rs
*
* Database-side half of the rotation: provisioning the standby slot's user
* with the admin credential, and validating that a slot's credentials can
* actually open a session.
*
* User provisioning is create-or-alter, so running it again with the same
* inputs (a retried rotation) is harmless:
*
*   CREATE USER IF NOT EXISTS 'u'@'%' IDENTIFIED BY 'p';
*   ALTER USER 'u'@'%' IDENTIFIED BY 'p';
*   GRANT SELECT, INSERT, UPDATE, DELETE ON `db`.* TO 'u'@'%';
*
* MySQL does not accept placeholders for account names or the password in
* these statements, so names are validated against a strict alphabet and the
* password is quoted as a string literal.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::error::DatabaseError;
use crate::secrets::{AdminCredentials, SlotCredentials};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{Connection, Executor};
use std::time::Duration;
use tracing::{debug, info};

/// Privileges granted to the application user on its schema.
pub const APPLICATION_PRIVILEGES: &str = "SELECT, INSERT, UPDATE, DELETE";

/// Database operations the orchestrator needs.
#[async_trait]
pub trait DatabaseAdmin: Send + Sync {
    /// Ensures `target.username` exists with exactly `target.password`.
    async fn upsert_user(&self, admin: &AdminCredentials, target: &SlotCredentials) -> Result<(), DatabaseError>;

    /// Opens a session with `creds` and runs a trivial query.
    async fn check_connection(&self, creds: &SlotCredentials) -> Result<(), DatabaseError>;
}

fn validate_identifier(kind: &'static str, value: &str, max_len: usize) -> Result<(), DatabaseError> {
    let valid = !value.is_empty()
        && value.len() <= max_len
        && value.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(DatabaseError::InvalidIdentifier {
            kind,
            value: value.to_string(),
        })
    }
}

/// Quotes `value` as a MySQL single-quoted string literal.
fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        match c {
            '\'' => quoted.push_str("''"),
            '\\' => quoted.push_str("\\\\"),
            '\0' => quoted.push_str("\\0"),
            _ => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

/// Statements that create or update the application user.
pub fn upsert_user_statements(target: &SlotCredentials) -> Result<Vec<String>, DatabaseError> {
    validate_identifier("user", &target.username, 32)?;
    validate_identifier("schema", &target.dbname, 64)?;

    let account = format!("'{}'@'%'", target.username);
    let password = quote_literal(&target.password);
    Ok(vec![
        format!("CREATE USER IF NOT EXISTS {} IDENTIFIED BY {}", account, password),
        format!("ALTER USER {} IDENTIFIED BY {}", account, password),
        format!(
            "GRANT {} ON `{}`.* TO {}",
            APPLICATION_PRIVILEGES, target.dbname, account
        ),
    ])
}

/// `DatabaseAdmin` for Aurora MySQL through `sqlx`.
pub struct MySqlAdmin {
    connect_timeout: Duration,
}

impl MySqlAdmin {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn connect(
        &self,
        options: MySqlConnectOptions,
        host: &str,
        port: u16,
        username: &str,
    ) -> Result<MySqlConnection, DatabaseError> {
        match tokio::time::timeout(self.connect_timeout, MySqlConnection::connect_with(&options)).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(source)) => Err(DatabaseError::Connect {
                host: host.to_string(),
                port,
                username: username.to_string(),
                source,
            }),
            Err(_) => Err(DatabaseError::ConnectTimeout {
                host: host.to_string(),
                port,
                username: username.to_string(),
                timeout: self.connect_timeout,
            }),
        }
    }
}

#[async_trait]
impl DatabaseAdmin for MySqlAdmin {
    async fn upsert_user(&self, admin: &AdminCredentials, target: &SlotCredentials) -> Result<(), DatabaseError> {
        let statements = upsert_user_statements(target)?;

        let options = MySqlConnectOptions::new()
            .host(&admin.host)
            .port(admin.port)
            .username(&admin.username)
            .password(&admin.password);
        let mut conn = self.connect(options, &admin.host, admin.port, &admin.username).await?;

        for (statement, action) in statements.iter().zip(["creating the user", "setting the password", "granting privileges"]) {
            debug!(username = %target.username, action, "executing account statement");
            conn.execute(statement.as_str())
                .await
                .map_err(|source| DatabaseError::Statement {
                    action: format!("{} for '{}'", action, target.username),
                    source,
                })?;
        }

        // Closing is best effort; the server drops the session either way.
        let _ = conn.close().await;
        info!(username = %target.username, schema = %target.dbname, "database user provisioned");
        Ok(())
    }

    async fn check_connection(&self, creds: &SlotCredentials) -> Result<(), DatabaseError> {
        let options = MySqlConnectOptions::new()
            .host(&creds.host)
            .port(creds.port)
            .username(&creds.username)
            .password(&creds.password)
            .database(&creds.dbname);
        let mut conn = self.connect(options, &creds.host, creds.port, &creds.username).await?;

        conn.execute("SELECT 1")
            .await
            .map_err(|source| DatabaseError::Statement {
                action: format!("validating the session of '{}'", creds.username),
                source,
            })?;

        let _ = conn.close().await;
        debug!(username = %creds.username, host = %creds.host, "database connectivity confirmed");
        Ok(())
    }
}
