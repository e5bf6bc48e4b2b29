/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/modules/credential_rotation/src/atomic_file.rs
*
* Atomic in-place replacement of the runtime config file.
*
* The new content is written to a temporary file in the target's own
* directory, given the target's permission bits and owner, synced, and then
* renamed over the target. The rename is the only step that changes what a
* reader sees, so a reader (OpenEMR starting up on another task) observes
* either the old file or the new one. A failure or crash before the rename
* leaves the target untouched and the temporary file is removed on drop.
*
* Ownership is applied to the temporary file before the rename: OpenEMR runs
* as a fixed non-root user and must never see a file it cannot read.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::error::AtomicWriteError;
use std::fs::{self, File, Permissions};
use std::io::Write;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Replaces the full contents of a config file.
pub trait ConfigWriter: Send + Sync {
    fn replace(&self, path: &Path, contents: &str) -> Result<(), AtomicWriteError>;
}

/// `ConfigWriter` using write-temp, sync, rename.
#[derive(Clone, Copy, Debug, Default)]
pub struct AtomicConfigWriter;

impl ConfigWriter for AtomicConfigWriter {
    fn replace(&self, path: &Path, contents: &str) -> Result<(), AtomicWriteError> {
        atomic_write(path, contents.as_bytes())
    }
}

/// New content fully written and synced next to its target, not yet visible.
#[derive(Debug)]
pub struct StagedWrite {
    temp: NamedTempFile,
    target: PathBuf,
}

fn io_error<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(std::io::Error) -> AtomicWriteError + 'a {
    move |source| AtomicWriteError::Io {
        action,
        path: path.to_path_buf(),
        source,
    }
}

/// Writes `contents` into a temporary sibling of `target` carrying the
/// target's mode and owner.
pub fn stage(target: &Path, contents: &[u8]) -> Result<StagedWrite, AtomicWriteError> {
    let metadata = fs::metadata(target).map_err(io_error("inspect", target))?;
    let parent = match target.parent() {
        Some(p) if p.as_os_str().is_empty() => Path::new("."),
        Some(p) => p,
        None => return Err(AtomicWriteError::NoParent(target.to_path_buf())),
    };
    let file_name = target
        .file_name()
        .ok_or_else(|| AtomicWriteError::NoParent(target.to_path_buf()))?
        .to_string_lossy();

    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name))
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(io_error("create a temporary file in", parent))?;

    temp.write_all(contents).map_err(io_error("write", temp.path()))?;
    temp.flush().map_err(io_error("flush", temp.path()))?;

    let mode = metadata.mode() & 0o7777;
    fs::set_permissions(temp.path(), Permissions::from_mode(mode))
        .map_err(io_error("set permissions on", temp.path()))?;

    let staged_meta = fs::metadata(temp.path()).map_err(io_error("inspect", temp.path()))?;
    if staged_meta.uid() != metadata.uid() || staged_meta.gid() != metadata.gid() {
        std::os::unix::fs::chown(temp.path(), Some(metadata.uid()), Some(metadata.gid()))
            .map_err(io_error("change ownership of", temp.path()))?;
    }

    temp.as_file()
        .sync_all()
        .map_err(io_error("sync", temp.path()))?;

    debug!(path = %target.display(), staged = %temp.path().display(), mode = %format!("{:o}", mode), "staged replacement");
    Ok(StagedWrite {
        temp,
        target: target.to_path_buf(),
    })
}

impl StagedWrite {
    pub fn staged_path(&self) -> &Path {
        self.temp.path()
    }

    /// Renames the staged file over the target.
    pub fn commit(self) -> Result<(), AtomicWriteError> {
        let target = self.target;
        self.temp
            .persist(&target)
            .map_err(|e| AtomicWriteError::Io {
                action: "rename over",
                path: target.clone(),
                source: e.error,
            })?;

        // The rename is done; a failed directory sync only weakens durability
        // across a power loss, it does not make the new content invisible.
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
                warn!(directory = %parent.display(), error = %e, "failed to sync directory after rename");
            }
        }
        Ok(())
    }
}

/// Atomically replaces `target`'s contents, keeping its mode and owner.
pub fn atomic_write(target: &Path, contents: &[u8]) -> Result<(), AtomicWriteError> {
    stage(target, contents)?.commit()
}
