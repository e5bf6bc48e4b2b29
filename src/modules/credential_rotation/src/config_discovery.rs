/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/modules/credential_rotation/src/config_discovery.rs
*
* Locates the live OpenEMR runtime configuration on the shared mount.
*
* The deployment stores OpenEMR sites under
* `/var/www/localhost/htdocs/openemr/sites/` on EFS and the rotation task
* mounts that directory at an explicit mount point, so the path is fixed:
* `<mount_root>/default/sqlconf.php`. A missing file means the mount is not
* what we expect, which is fatal rather than retryable.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::error::{Result, RotationError};
use std::path::{Path, PathBuf};

/// Site directory holding the runtime configuration.
pub const DEFAULT_SITE: &str = "default";
pub const SQLCONF_FILE: &str = "sqlconf.php";

/// Resolved runtime paths used by one rotation run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfigPaths {
    pub sqlconf_path: PathBuf,
    /// The cache (Valkey) endpoint and TLS settings are injected through
    /// environment variables, so nothing cache-related is persisted on EFS.
    pub cache_config_path: Option<PathBuf>,
}

pub fn discover_runtime_paths(sites_mount_root: &Path) -> Result<RuntimeConfigPaths> {
    let sqlconf_path = sites_mount_root.join(DEFAULT_SITE).join(SQLCONF_FILE);
    if !sqlconf_path.is_file() {
        return Err(RotationError::ConfigNotFound(sqlconf_path));
    }

    Ok(RuntimeConfigPaths {
        sqlconf_path,
        cache_config_path: None,
    })
}
