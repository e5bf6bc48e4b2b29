/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/modules/credential_rotation/src/providers/mod.rs
* AWS-backed implementations of the collaborator traits, all driven through
* the AWS CLI.
* SPDX-License-Identifier: Apache-2.0 */

pub mod aws_cli;
pub mod ecs;
pub mod secrets_manager;

pub use aws_cli::AwsCli;
pub use ecs::EcsServiceRefresher;
pub use secrets_manager::SecretsManagerStore;
