// CLASSIFICATION: COMMUNITY
// Filename: cache.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Precomputed answers for queries capability mode refuses.
//!
//! Two families are cached: sysctl values (by name and by MIB) and device
//! names (by device number and file type). Entries are written once while
//! the process is still unrestricted and only read afterwards.

use std::collections::HashMap;

use log::{debug, info, warn};
use serde::Deserialize;

use crate::error::{CapshimError, CapshimResult};
use crate::sys::SystemCalls;

/// Device number plus `S_IFCHR`/`S_IFBLK` type bits.
///
/// Kept as a pair so distinct devices never share a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub struct DeviceKey {
    /// Device number.
    pub dev: u64,
    /// `S_IFCHR` or `S_IFBLK`.
    pub kind: u32,
}

impl DeviceKey {
    /// Key for device `dev` of file type `kind`.
    pub fn new(dev: u64, kind: u32) -> Self {
        Self { dev, kind }
    }
}

/// Sysctl values and device names captured before capability mode.
#[derive(Debug, Default)]
pub struct QueryCache {
    by_name: HashMap<String, Vec<u8>>,
    by_mib: HashMap<Vec<i32>, Vec<u8>>,
    devnames: HashMap<DeviceKey, String>,
}

impl QueryCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate `name` to its MIB, cache the value under both keys.
    pub fn precache_sysctl<S>(&mut self, sys: &S, name: &str) -> CapshimResult<()>
    where
        S: SystemCalls + ?Sized,
    {
        let mib = sys.sysctl_name_to_mib(name).map_err(|source| {
            warn!("sysctl {} has no MIB: {}", name, source);
            CapshimError::NameToMib {
                name: name.to_string(),
                source,
            }
        })?;
        let value = self.fetch(sys, &mib)?;
        info!("precached sysctl {} ({:?}, {} bytes)", name, mib, value.len());
        self.by_name.insert(name.to_string(), value.clone());
        self.by_mib.insert(mib, value);
        Ok(())
    }

    /// Query `mib` once for its size and once for its value, then cache it.
    pub fn precache_sysctl_by_mib<S>(&mut self, sys: &S, mib: &[i32]) -> CapshimResult<()>
    where
        S: SystemCalls + ?Sized,
    {
        let value = self.fetch(sys, mib)?;
        info!("precached sysctl {:?} ({} bytes)", mib, value.len());
        self.by_mib.insert(mib.to_vec(), value);
        Ok(())
    }

    fn fetch<S>(&self, sys: &S, mib: &[i32]) -> CapshimResult<Vec<u8>>
    where
        S: SystemCalls + ?Sized,
    {
        if mib.is_empty() {
            return Err(CapshimError::EmptyMib);
        }
        let fail = |source: std::io::Error| {
            warn!("sysctl {:?} failed: {}", mib, source);
            CapshimError::Sysctl {
                mib: mib.to_vec(),
                source,
            }
        };
        let size = sys.sysctl(mib, None, None).map_err(fail)?;
        let mut value = vec![0u8; size];
        let len = sys.sysctl(mib, Some(value.as_mut_slice()), None).map_err(fail)?;
        value.truncate(len);
        debug!("sysctl {:?}: {} of {} bytes", mib, len, size);
        Ok(value)
    }

    /// Resolve and cache the name of device `dev` with type bits `kind`.
    pub fn precache_devname<S>(&mut self, sys: &S, dev: u64, kind: u32) -> CapshimResult<()>
    where
        S: SystemCalls + ?Sized,
    {
        let name = sys.devname(dev, kind).map_err(|source| {
            warn!("devname for {:#x}/{:#o} failed: {}", dev, kind, source);
            CapshimError::Devname { dev, kind, source }
        })?;
        info!("precached devname {:#x}/{:#o} = {}", dev, kind, name);
        self.devnames.insert(DeviceKey::new(dev, kind), name);
        Ok(())
    }

    /// Cached value for sysctl `name`.
    pub fn sysctl_by_name(&self, name: &str) -> Option<&[u8]> {
        self.by_name.get(name).map(Vec::as_slice)
    }

    /// Cached value for `mib`.
    pub fn sysctl_by_mib(&self, mib: &[i32]) -> Option<&[u8]> {
        self.by_mib.get(mib).map(Vec::as_slice)
    }

    /// Cached name of `(dev, kind)`.
    pub fn devname(&self, dev: u64, kind: u32) -> Option<&str> {
        self.devnames.get(&DeviceKey::new(dev, kind)).map(String::as_str)
    }

    /// Number of cached entries across all three tables.
    pub fn len(&self) -> usize {
        self.by_name.len() + self.by_mib.len() + self.devnames.len()
    }

    /// True when nothing has been cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSystem;

    const HW_NCPU: [i32; 2] = [6, 3];

    #[test]
    fn mib_precache_stores_exact_bytes() {
        let sys = FakeSystem::new();
        sys.set_sysctl("hw.ncpu", &HW_NCPU, &8i32.to_ne_bytes());
        let mut cache = QueryCache::new();
        cache.precache_sysctl_by_mib(&sys, &HW_NCPU).unwrap();
        assert_eq!(cache.sysctl_by_mib(&HW_NCPU), Some(&8i32.to_ne_bytes()[..]));
        assert_eq!(cache.sysctl_by_name("hw.ncpu"), None);
        // one sizing query, one fetch
        assert_eq!(sys.live_queries(), 2);
    }

    #[test]
    fn name_precache_fills_both_tables() {
        let sys = FakeSystem::new();
        sys.set_sysctl("kern.ostype", &[1, 1], b"FreeBSD\0");
        let mut cache = QueryCache::new();
        cache.precache_sysctl(&sys, "kern.ostype").unwrap();
        assert_eq!(cache.sysctl_by_name("kern.ostype"), Some(&b"FreeBSD\0"[..]));
        assert_eq!(cache.sysctl_by_name("kern.ostype"), cache.sysctl_by_mib(&[1, 1]));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn unknown_name_is_reported() {
        let sys = FakeSystem::new();
        let mut cache = QueryCache::new();
        let err = cache.precache_sysctl(&sys, "hw.nothing").unwrap_err();
        assert!(matches!(err, CapshimError::NameToMib { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn empty_mib_is_rejected() {
        let sys = FakeSystem::new();
        let mut cache = QueryCache::new();
        assert!(matches!(
            cache.precache_sysctl_by_mib(&sys, &[]),
            Err(CapshimError::EmptyMib)
        ));
        assert_eq!(sys.live_queries(), 0);
    }

    #[test]
    fn failed_query_caches_nothing() {
        let sys = FakeSystem::new();
        sys.set_sysctl("hw.model", &[6, 2], b"cpu");
        sys.enter_capability_mode();
        let mut cache = QueryCache::new();
        assert!(matches!(
            cache.precache_sysctl_by_mib(&sys, &[6, 2]),
            Err(CapshimError::Sysctl { .. })
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn devnames_do_not_alias() {
        let sys = FakeSystem::new();
        // 10 + 0o20000 would collide with 0o20000 + 10 under an additive key
        sys.set_devname(10, 0o020000, "dri/card0");
        sys.set_devname(0o020000, 10, "ttyv0");
        let mut cache = QueryCache::new();
        cache.precache_devname(&sys, 10, 0o020000).unwrap();
        cache.precache_devname(&sys, 0o020000, 10).unwrap();
        assert_eq!(cache.devname(10, 0o020000), Some("dri/card0"));
        assert_eq!(cache.devname(0o020000, 10), Some("ttyv0"));
    }

    #[test]
    fn missing_devname_is_error() {
        let sys = FakeSystem::new();
        let mut cache = QueryCache::new();
        let err = cache.precache_devname(&sys, 1, 2).unwrap_err();
        assert!(matches!(err, CapshimError::Devname { dev: 1, kind: 2, .. }));
    }
}
