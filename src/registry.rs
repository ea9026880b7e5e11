// CLASSIFICATION: COMMUNITY
// Filename: registry.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Handle registry for directories and files opened before capability mode.
//!
//! Handles are owned here from a successful preopen until process exit and
//! are never closed once registered.

use std::collections::{BTreeMap, HashMap};
use std::os::unix::io::RawFd;

use log::{info, warn};

use crate::error::{CapshimError, CapshimResult};
use crate::rights::{apply_rights, ResourceClass};
use crate::sys::{BaseDir, SystemCalls};

/// Flags every directory preopen uses.
pub const DIR_OPEN_FLAGS: i32 = libc::O_RDONLY | libc::O_DIRECTORY | libc::O_NOFOLLOW | libc::O_CLOEXEC;

/// Strip trailing separators so `/dev/dri/` and `/dev/dri` are one key.
pub fn normalize_dir(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}

/// Preopened directory and file handles, keyed by path.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    dirs: BTreeMap<String, RawFd>,
    files: HashMap<String, RawFd>,
    retired: Vec<RawFd>,
}

impl HandleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `path` as a directory, restrict it to `class` and register it.
    pub fn preopen_dir<S>(&mut self, sys: &S, path: &str, class: ResourceClass) -> CapshimResult<RawFd>
    where
        S: SystemCalls + ?Sized,
    {
        let fd = open_restricted(sys, path, DIR_OPEN_FLAGS, class)?;
        let key = normalize_dir(path).to_string();
        info!("preopened directory {} as fd {} ({:?})", key, fd, class);
        if let Some(old) = self.dirs.insert(key, fd) {
            self.retire(path, old);
        }
        Ok(fd)
    }

    /// Open `path` with `flags`, restrict it to `class` and register it.
    ///
    /// Later opens of the same path get a duplicate of this handle.
    pub fn preopen_file<S>(
        &mut self,
        sys: &S,
        path: &str,
        flags: i32,
        class: ResourceClass,
    ) -> CapshimResult<RawFd>
    where
        S: SystemCalls + ?Sized,
    {
        let fd = open_restricted(sys, path, flags, class)?;
        info!("preopened file {} as fd {} ({:?})", path, fd, class);
        if let Some(old) = self.files.insert(path.to_string(), fd) {
            self.retire(path, old);
        }
        Ok(fd)
    }

    fn retire(&mut self, path: &str, fd: RawFd) {
        warn!("{} registered twice; fd {} stays open but unreachable", path, fd);
        self.retired.push(fd);
    }

    /// Handle registered for exactly this directory path.
    pub fn dir_handle(&self, path: &str) -> Option<RawFd> {
        self.dirs.get(normalize_dir(path)).copied()
    }

    /// Handle registered for exactly this file path.
    pub fn file_handle(&self, path: &str) -> Option<RawFd> {
        self.files.get(path).copied()
    }

    /// Registered directories in path order.
    pub fn dirs(&self) -> impl Iterator<Item = (&str, RawFd)> {
        self.dirs.iter().map(|(p, fd)| (p.as_str(), *fd))
    }

    /// Number of registered directories.
    pub fn dir_count(&self) -> usize {
        self.dirs.len()
    }

    /// Number of registered files.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty() && self.files.is_empty()
    }
}

fn open_restricted<S>(sys: &S, path: &str, flags: i32, class: ResourceClass) -> CapshimResult<RawFd>
where
    S: SystemCalls + ?Sized,
{
    let fd = sys.open_at(BaseDir::Cwd, path, flags, 0).map_err(|source| {
        warn!("preopen of {} failed: {}", path, source);
        CapshimError::Open {
            path: path.to_string(),
            source,
        }
    })?;
    if let Err(source) = apply_rights(sys, fd, class) {
        warn!("restricting {} to {:?} failed: {}", path, class, source);
        if let Err(e) = sys.close(fd) {
            warn!("closing fd {} for {} failed: {}", fd, path, e);
        }
        return Err(CapshimError::Rights {
            path: path.to_string(),
            class,
            source,
        });
    }
    Ok(fd)
}
