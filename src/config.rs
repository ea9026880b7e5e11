// CLASSIFICATION: COMMUNITY
// Filename: config.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Runtime knobs and the JSON preopen manifest.

use std::path::Path;

use serde::Deserialize;

use crate::cache::DeviceKey;
use crate::error::{CapshimError, CapshimResult};
use crate::rights::ResourceClass;

/// Symlink hops followed before a path is left unredirected.
pub const DEFAULT_MAX_SYMLINK_HOPS: usize = 8;
/// Environment override for [`ShimConfig::max_symlink_hops`].
pub const MAX_HOPS_ENV: &str = "CAPSHIM_MAX_SYMLINK_HOPS";

/// Runtime knobs for a [`crate::Capshim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimConfig {
    /// Symlink hops the resolver follows before giving up on a path.
    pub max_symlink_hops: usize,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            max_symlink_hops: std::env::var(MAX_HOPS_ENV)
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_MAX_SYMLINK_HOPS),
        }
    }
}

fn default_file_flags() -> i32 {
    libc::O_RDONLY | libc::O_CLOEXEC
}

/// A directory to preopen.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DirEntry {
    /// Absolute directory path.
    pub path: String,
    /// Rights the handle keeps.
    #[serde(default)]
    pub class: ResourceClass,
}

/// A file to preopen.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileEntry {
    /// Absolute file path.
    pub path: String,
    /// `open(2)` flags.
    #[serde(default = "default_file_flags")]
    pub flags: i32,
    /// Rights the handle keeps.
    #[serde(default)]
    pub class: ResourceClass,
}

/// Everything start-up wants opened or cached before capability mode.
///
/// ```json
/// {
///   "dirs":  [{ "path": "/dev/dri", "class": "gpu" }],
///   "files": [{ "path": "/usr/share/libdrm/amdgpu.ids", "class": "data_files" }],
///   "sysctls": ["hw.ncpu"],
///   "sysctl_mibs": [[6, 3]],
///   "devnames": [{ "dev": 42, "kind": 8192 }]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PreopenManifest {
    /// Directories to preopen.
    pub dirs: Vec<DirEntry>,
    /// Files to preopen.
    pub files: Vec<FileEntry>,
    /// Sysctl names to capture.
    pub sysctls: Vec<String>,
    /// Sysctl MIBs to capture.
    pub sysctl_mibs: Vec<Vec<i32>>,
    /// Device names to capture.
    pub devnames: Vec<DeviceKey>,
}

impl PreopenManifest {
    /// Parse a manifest from JSON text.
    pub fn from_json(data: &str) -> CapshimResult<Self> {
        Ok(serde_json::from_str(data)?)
    }

    /// Load a manifest from a JSON file.
    pub fn from_file(path: &Path) -> CapshimResult<Self> {
        let txt = std::fs::read_to_string(path).map_err(|source| CapshimError::ManifestIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&txt)
    }

    /// Number of entries across all lists.
    pub fn len(&self) -> usize {
        self.dirs.len()
            + self.files.len()
            + self.sysctls.len()
            + self.sysctl_mibs.len()
            + self.devnames.len()
    }

    /// True when the manifest lists nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of applying a [`PreopenManifest`].
#[derive(Debug, Default)]
pub struct ManifestReport {
    /// Entries that succeeded.
    pub applied: usize,
    /// Manifest item and the error it produced.
    pub failures: Vec<(String, CapshimError)>,
}

impl ManifestReport {
    /// True when every entry succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
