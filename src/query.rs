// CLASSIFICATION: COMMUNITY
// Filename: query.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Runtime side of the query cache: `sysctl`, `sysctlbyname`, `devname`.
//!
//! sysctl answers come from the live call whenever it succeeds, and from the
//! cache only once capability mode refuses it. devname consults the cache
//! first; both paths end at the same resolver, so the order is invisible.

use std::io;

use log::warn;

use crate::shim::Capshim;
use crate::sys::SystemCalls;

fn permission_denied() -> io::Error {
    io::Error::from_raw_os_error(libc::EPERM)
}

/// Copy as much of `cached` as fits into `old`.
///
/// Returns the bytes copied, or the full cached length when there is no
/// output buffer (a size probe).
fn copy_out(cached: &[u8], old: Option<&mut [u8]>) -> usize {
    match old {
        None => cached.len(),
        Some(buf) => {
            let n = buf.len().min(cached.len());
            buf[..n].copy_from_slice(&cached[..n]);
            n
        }
    }
}

impl<S: SystemCalls> Capshim<S> {
    /// `sysctl(3)` by MIB with a cached fallback for read-only queries.
    pub fn sysctl(&self, mib: &[i32], mut old: Option<&mut [u8]>, new: Option<&[u8]>) -> io::Result<usize> {
        let live = match self.sys.sysctl(mib, old.as_deref_mut(), new) {
            Ok(len) => return Ok(len),
            Err(e) => e,
        };
        if new.is_some() || mib.len() < 2 {
            return Err(permission_denied());
        }
        match self.cache.sysctl_by_mib(mib) {
            Some(cached) => {
                warn!("sysctl {:?} refused ({}), answering from cache", mib, live);
                Ok(copy_out(cached, old))
            }
            None => Err(permission_denied()),
        }
    }

    /// `sysctlbyname(3)` with a cached fallback for read-only queries.
    pub fn sysctl_by_name(
        &self,
        name: &str,
        mut old: Option<&mut [u8]>,
        new: Option<&[u8]>,
    ) -> io::Result<usize> {
        let live = match self.sys.sysctl_by_name(name, old.as_deref_mut(), new) {
            Ok(len) => return Ok(len),
            Err(e) => e,
        };
        if new.is_some() {
            return Err(permission_denied());
        }
        match self.cache.sysctl_by_name(name) {
            Some(cached) => {
                warn!("sysctl {} refused ({}), answering from cache", name, live);
                Ok(copy_out(cached, old))
            }
            None => Err(permission_denied()),
        }
    }

    /// `devname(3)`: cached name if known, otherwise the live lookup.
    pub fn devname(&self, dev: u64, kind: u32) -> Option<String> {
        if let Some(name) = self.cache.devname(dev, kind) {
            return Some(name.to_string());
        }
        self.sys.devname(dev, kind).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShimConfig;
    use crate::testing::FakeSystem;

    const KERN_OSRELEASE: [i32; 2] = [1, 2];

    fn shim() -> Capshim<FakeSystem> {
        let sys = FakeSystem::new();
        sys.set_sysctl("kern.osrelease", &KERN_OSRELEASE, b"14.1-RELEASE\0");
        Capshim::with_config(sys, ShimConfig { max_symlink_hops: 8 })
    }

    #[test]
    fn copy_out_caps_at_capacity() {
        let mut small = [0u8; 3];
        assert_eq!(copy_out(b"abcdef", Some(&mut small[..])), 3);
        assert_eq!(&small, b"abc");
        assert_eq!(copy_out(b"abcdef", None), 6);
    }

    #[test]
    fn live_answer_wins_when_allowed() {
        let shim = shim();
        let mut buf = [0u8; 32];
        let n = shim.sysctl(&KERN_OSRELEASE, Some(&mut buf[..]), None).unwrap();
        assert_eq!(&buf[..n], b"14.1-RELEASE\0");
    }

    #[test]
    fn denied_mib_served_from_cache() {
        let mut shim = shim();
        shim.precache_sysctl_by_mib(&KERN_OSRELEASE).unwrap();
        shim.system().enter_capability_mode();
        assert_eq!(shim.sysctl(&KERN_OSRELEASE, None, None).unwrap(), 13);
        let mut buf = [0u8; 13];
        shim.sysctl(&KERN_OSRELEASE, Some(&mut buf[..]), None).unwrap();
        assert_eq!(&buf, b"14.1-RELEASE\0");
    }

    #[test]
    fn denied_miss_is_eperm() {
        let shim = shim();
        shim.system().enter_capability_mode();
        let err = shim.sysctl(&KERN_OSRELEASE, None, None).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EPERM));
    }

    #[test]
    fn writes_never_use_cache() {
        let mut shim = shim();
        shim.precache_sysctl_by_mib(&KERN_OSRELEASE).unwrap();
        shim.system().enter_capability_mode();
        let err = shim.sysctl(&KERN_OSRELEASE, None, Some(&b"x"[..])).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EPERM));
    }

    #[test]
    fn single_component_mib_is_not_cached() {
        let mut shim = shim();
        shim.system().set_sysctl("top", &[7], b"v");
        shim.precache_sysctl_by_mib(&[7]).unwrap();
        shim.system().enter_capability_mode();
        assert!(shim.sysctl(&[7], None, None).is_err());
    }

    #[test]
    fn denied_name_served_from_cache() {
        let mut shim = shim();
        shim.precache_sysctl("kern.osrelease").unwrap();
        shim.system().enter_capability_mode();
        let mut buf = [0u8; 64];
        let n = shim.sysctl_by_name("kern.osrelease", Some(&mut buf[..]), None).unwrap();
        assert_eq!(&buf[..n], b"14.1-RELEASE\0");
        let err = shim.sysctl_by_name("kern.hostname", None, None).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EPERM));
    }

    #[test]
    fn devname_prefers_cache() {
        let mut shim = shim();
        shim.system().set_devname(0x5a, libc::S_IFCHR as u32, "dri/card0");
        shim.precache_devname(0x5a, libc::S_IFCHR as u32).unwrap();
        shim.system().enter_capability_mode();
        assert_eq!(shim.devname(0x5a, libc::S_IFCHR as u32).as_deref(), Some("dri/card0"));
        assert_eq!(shim.devname(0x5b, libc::S_IFCHR as u32), None);
    }

    #[test]
    fn devname_falls_through_to_live() {
        let shim = shim();
        shim.system().set_devname(3, libc::S_IFCHR as u32, "null");
        assert_eq!(shim.devname(3, libc::S_IFCHR as u32).as_deref(), Some("null"));
    }
}
