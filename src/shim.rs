// CLASSIFICATION: COMMUNITY
// Filename: shim.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! The per-process context tying registry, resolver and cache together.

use std::os::unix::io::RawFd;

use log::{info, warn};

use crate::cache::QueryCache;
use crate::config::{ManifestReport, PreopenManifest, ShimConfig};
use crate::error::CapshimResult;
use crate::registry::HandleRegistry;
use crate::resolve::{self, Resolution};
use crate::rights::ResourceClass;
use crate::sys::{HostSystem, SystemCalls};

/// Everything the shim knows, built once per process.
///
/// Registration (`preopen_*`, `precache_*`) needs `&mut self` and belongs to
/// the unrestricted start-up phase. Resolution and the adapters only read,
/// so the finished context can be shared freely.
#[derive(Debug)]
pub struct Capshim<S = HostSystem> {
    pub(crate) sys: S,
    config: ShimConfig,
    pub(crate) registry: HandleRegistry,
    pub(crate) cache: QueryCache,
}

impl Capshim<HostSystem> {
    /// Context backed by the real kernel.
    pub fn host() -> Self {
        Self::new(HostSystem)
    }
}

impl<S: SystemCalls> Capshim<S> {
    /// A context over `sys` with the default configuration.
    pub fn new(sys: S) -> Self {
        Self::with_config(sys, ShimConfig::default())
    }

    /// A context over `sys` with an explicit configuration.
    pub fn with_config(sys: S, config: ShimConfig) -> Self {
        Self {
            sys,
            config,
            registry: HandleRegistry::new(),
            cache: QueryCache::new(),
        }
    }

    /// The system backend.
    pub fn system(&self) -> &S {
        &self.sys
    }

    /// Active configuration.
    pub fn config(&self) -> &ShimConfig {
        &self.config
    }

    /// Registered handles.
    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// Captured query results.
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Open `path` as a directory handle restricted to `class`.
    pub fn preopen_dir(&mut self, path: &str, class: ResourceClass) -> CapshimResult<()> {
        self.registry.preopen_dir(&self.sys, path, class).map(|_| ())
    }

    /// Open `path` with `flags` and restrict it to `class`.
    pub fn preopen_file(&mut self, path: &str, flags: i32, class: ResourceClass) -> CapshimResult<()> {
        self.registry
            .preopen_file(&self.sys, path, flags, class)
            .map(|_| ())
    }

    /// Capture sysctl `name` and its MIB.
    pub fn precache_sysctl(&mut self, name: &str) -> CapshimResult<()> {
        self.cache.precache_sysctl(&self.sys, name)
    }

    /// Capture the sysctl at `mib`.
    pub fn precache_sysctl_by_mib(&mut self, mib: &[i32]) -> CapshimResult<()> {
        self.cache.precache_sysctl_by_mib(&self.sys, mib)
    }

    /// Capture the name of device `(dev, kind)`.
    pub fn precache_devname(&mut self, dev: u64, kind: u32) -> CapshimResult<()> {
        self.cache.precache_devname(&self.sys, dev, kind)
    }

    /// Map `path` to a registered directory handle and a relative path.
    pub fn resolve(&self, path: &str) -> Resolution {
        resolve::resolve(&self.registry, &self.sys, path, self.config.max_symlink_hops)
    }

    /// Handle preopened for exactly `path`, if any.
    pub fn preopened_file(&self, path: &str) -> Option<RawFd> {
        self.registry.file_handle(path)
    }

    /// Run every preopen and precache listed in `manifest`.
    ///
    /// Failures are logged and collected; the remaining items still run.
    pub fn apply_manifest(&mut self, manifest: &PreopenManifest) -> ManifestReport {
        let mut report = ManifestReport::default();
        let mut record = |item: String, res: CapshimResult<()>| match res {
            Ok(()) => report.applied += 1,
            Err(e) => {
                warn!("manifest item {} failed: {}", item, e);
                report.failures.push((item, e));
            }
        };
        for d in &manifest.dirs {
            record(format!("dir {}", d.path), self.preopen_dir(&d.path, d.class));
        }
        for f in &manifest.files {
            record(
                format!("file {}", f.path),
                self.preopen_file(&f.path, f.flags, f.class),
            );
        }
        for name in &manifest.sysctls {
            record(format!("sysctl {}", name), self.precache_sysctl(name));
        }
        for mib in &manifest.sysctl_mibs {
            record(format!("sysctl {:?}", mib), self.precache_sysctl_by_mib(mib));
        }
        for key in &manifest.devnames {
            record(
                format!("devname {:#x}/{:#o}", key.dev, key.kind),
                self.precache_devname(key.dev, key.kind),
            );
        }
        info!(
            "manifest applied: {} ok, {} failed",
            report.applied,
            report.failures.len()
        );
        report
    }
}
