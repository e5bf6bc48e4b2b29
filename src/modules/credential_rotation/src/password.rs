/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/modules/credential_rotation/src/password.rs
* Generation of standby slot passwords.
* SPDX-License-Identifier: Apache-2.0 */

use rand::distributions::Alphanumeric;
use rand::Rng;

pub const PASSWORD_LENGTH: usize = 32;

/// Random alphanumeric password. Alphanumerics need no quoting in
/// `sqlconf.php`, SQL literals or JSON.
pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}
