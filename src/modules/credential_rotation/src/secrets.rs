/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/modules/credential_rotation/src/secrets.rs
*
* Secret store abstraction and the records kept in it.
*
* The application database role is stored as a dual-slot record:
*
*   {"active_slot": "A", "A": {...credentials...}, "B": {...credentials...}}
*
* Exactly one slot is active; the other one (the standby) is always the
* target of the next rotation. The privileged admin credential lives in a
* separate secret and is only ever used to create/alter the application user.
*
* `SecretStore` is the seam towards the cloud backend. It deals in raw JSON
* payloads; the typed views below are decoded by the orchestrator so a
* malformed secret is reported as such instead of as a transport error.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::error::SecretStoreError;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// One of the two credential slots.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    /// The other slot.
    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Slot::A => "A",
            Slot::B => "B",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps the active slot to the standby slot (`A -> B`, `B -> A`).
pub fn standby_slot(active: Slot) -> Slot {
    active.other()
}

/// Credentials of one slot, as stored in the slot secret.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SlotCredentials {
    pub username: String,
    pub password: String,
    pub host: String,
    #[serde(serialize_with = "port_as_string", deserialize_with = "port_from_any")]
    pub port: u16,
    pub dbname: String,
}

impl fmt::Debug for SlotCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .finish()
    }
}

/// Privileged credentials used to manage the application user.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
    pub host: String,
    #[serde(serialize_with = "port_as_string", deserialize_with = "port_from_any")]
    pub port: u16,
}

impl fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

/// The dual-slot record. Unknown top-level keys are carried through writes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SlotSecret {
    pub active_slot: Slot,
    #[serde(rename = "A")]
    pub a: SlotCredentials,
    #[serde(rename = "B")]
    pub b: SlotCredentials,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SlotSecret {
    pub fn slot(&self, slot: Slot) -> &SlotCredentials {
        match slot {
            Slot::A => &self.a,
            Slot::B => &self.b,
        }
    }

    pub fn slot_mut(&mut self, slot: Slot) -> &mut SlotCredentials {
        match slot {
            Slot::A => &mut self.a,
            Slot::B => &mut self.b,
        }
    }

    pub fn to_payload(&self) -> Value {
        // Serializing plain structs and string maps into a `Value` cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Reads and writes secret payloads in the cloud secret store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Returns the secret's JSON payload.
    async fn get_secret(&self, secret_id: &str) -> Result<Value, SecretStoreError>;

    /// Stores `payload` as the new current value of the secret.
    async fn put_payload(&self, secret_id: &str, payload: &Value) -> Result<(), SecretStoreError>;

    /// Maps the active slot to the standby slot.
    fn standby_slot(&self, active: Slot) -> Slot {
        standby_slot(active)
    }
}

/// Decodes a raw payload into one of the typed records.
pub fn decode<T: serde::de::DeserializeOwned>(
    secret_id: &str,
    payload: Value,
) -> Result<T, SecretStoreError> {
    serde_json::from_value(payload).map_err(|e| SecretStoreError::Malformed {
        secret_id: secret_id.to_string(),
        reason: e.to_string(),
    })
}

fn port_as_string<S: Serializer>(port: &u16, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&port.to_string())
}

fn port_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(n) => Ok(n),
        Port::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid port '{}'", s))),
    }
}
