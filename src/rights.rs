// CLASSIFICATION: COMMUNITY
// Filename: rights.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Capability rights policy.
//!
//! Every preopened handle belongs to a [`ResourceClass`]. The class fixes the
//! smallest set of Capsicum rights the handle keeps once the process is in
//! capability mode. The sets are closed: nothing here is configurable at
//! runtime.

use std::io;
use std::os::unix::io::RawFd;

use bitflags::bitflags;
use log::debug;
use serde::Deserialize;

use crate::sys::SystemCalls;

/// Class of resource a handle is opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    /// Leave the handle with whatever rights `open` granted.
    #[default]
    Unrestricted,
    /// Read-only data trees (driver id tables, caches, fonts).
    DataFiles,
    /// Directories holding unix sockets the process connects to.
    IpcSockets,
    /// DRM device nodes.
    Gpu,
}

bitflags! {
    /// Portable view of the Capsicum rights this crate grants.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CapRights: u32 {
        const LOOKUP = 1 << 0;
        const READ = 1 << 1;
        const WRITE = 1 << 2;
        const SEEK = 1 << 3;
        const MMAP = 1 << 4;
        const FSTAT = 1 << 5;
        const FSTATFS = 1 << 6;
        const FCNTL = 1 << 7;
        const CONNECTAT = 1 << 8;
        const MKDIRAT = 1 << 9;
        const IOCTL = 1 << 10;
    }
}

bitflags! {
    /// `fcntl(2)` commands a handle with [`CapRights::FCNTL`] may still issue.
    ///
    /// Bit values follow `CAP_FCNTL_*` (`1 << F_xxx` on FreeBSD).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FcntlRights: u32 {
        const GETFL = 1 << 3;
        const SETFL = 1 << 4;
        const GETOWN = 1 << 5;
        const SETOWN = 1 << 6;
    }
}

const fn capright(idx: u32, bit: u64) -> u64 {
    (1u64 << (57 + idx)) | bit
}

/// FreeBSD `CAP_*` encoding: (word index, value) per portable flag.
const FREEBSD_RIGHTS: [(CapRights, usize, u64); 11] = [
    (CapRights::LOOKUP, 0, capright(0, 0x0000_0000_0000_0400)),
    (CapRights::READ, 0, capright(0, 0x0000_0000_0000_0001)),
    (CapRights::WRITE, 0, capright(0, 0x0000_0000_0000_0002)),
    // CAP_SEEK includes CAP_SEEK_TELL
    (CapRights::SEEK, 0, capright(0, 0x0000_0000_0000_000c)),
    (CapRights::MMAP, 0, capright(0, 0x0000_0000_0000_0010)),
    (CapRights::FSTAT, 0, capright(0, 0x0000_0000_0008_0000)),
    (CapRights::FSTATFS, 0, capright(0, 0x0000_0000_0010_0000)),
    (CapRights::FCNTL, 0, capright(0, 0x0000_0000_0000_8000)),
    (CapRights::CONNECTAT, 0, capright(0, 0x0000_0100_0000_0000)),
    (CapRights::MKDIRAT, 0, capright(0, 0x0000_0000_0080_0000)),
    (CapRights::IOCTL, 1, capright(1, 0x0000_0000_0000_0080)),
];

impl CapRights {
    /// FreeBSD `CAP_*` values for each flag set, as `cap_rights_set(3)`
    /// takes them.
    pub fn cap_values(self) -> impl Iterator<Item = u64> {
        FREEBSD_RIGHTS
            .into_iter()
            .filter(move |(flag, _, _)| self.contains(*flag))
            .map(|(_, _, value)| value)
    }

    /// Encode as the two `cr_rights` words of a version-0 `cap_rights_t`.
    pub fn to_raw_words(self) -> [u64; 2] {
        let mut words = [capright(0, 0), capright(1, 0)];
        for (flag, idx, value) in FREEBSD_RIGHTS {
            if self.contains(flag) {
                words[idx] |= value;
            }
        }
        words
    }
}

/// Rights a restricted class keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RightsSpec {
    /// Capability rights kept on the handle.
    pub rights: CapRights,
    /// Extra `cap_fcntls_limit` applied after the rights limit.
    pub fcntls: Option<FcntlRights>,
}

impl ResourceClass {
    /// The rights this class keeps, or `None` when it stays unrestricted.
    pub fn rights(self) -> Option<RightsSpec> {
        match self {
            ResourceClass::Unrestricted => None,
            // FSTATFS is needed by opendir; GETFL keeps Mesa quiet on amdgpu.ids
            ResourceClass::DataFiles => Some(RightsSpec {
                rights: CapRights::LOOKUP
                    | CapRights::READ
                    | CapRights::SEEK
                    | CapRights::MMAP
                    | CapRights::FSTAT
                    | CapRights::FSTATFS
                    | CapRights::FCNTL,
                fcntls: Some(FcntlRights::GETFL),
            }),
            // libpulse mkdirs its runtime dir before connecting and expects EEXIST
            ResourceClass::IpcSockets => Some(RightsSpec {
                rights: CapRights::LOOKUP
                    | CapRights::CONNECTAT
                    | CapRights::READ
                    | CapRights::WRITE
                    | CapRights::SEEK
                    | CapRights::FSTAT
                    | CapRights::FSTATFS
                    | CapRights::MKDIRAT,
                fcntls: None,
            }),
            ResourceClass::Gpu => Some(RightsSpec {
                rights: CapRights::LOOKUP
                    | CapRights::READ
                    | CapRights::WRITE
                    | CapRights::SEEK
                    | CapRights::MMAP
                    | CapRights::IOCTL
                    | CapRights::FCNTL
                    | CapRights::FSTAT
                    | CapRights::FSTATFS,
                fcntls: None,
            }),
        }
    }
}

/// Restrict `fd` to the rights of `class`.
///
/// Must run once, right after the descriptor is opened and before anything
/// else can see it. Reapplying the same class succeeds because Capsicum
/// accepts a limit equal to the current set.
pub fn apply_rights<S>(sys: &S, fd: RawFd, class: ResourceClass) -> io::Result<()>
where
    S: SystemCalls + ?Sized,
{
    let Some(spec) = class.rights() else {
        return Ok(());
    };
    debug!("limiting fd {} to {:?}", fd, spec.rights);
    sys.limit_rights(fd, spec.rights)?;
    if let Some(fcntls) = spec.fcntls {
        sys.limit_fcntls(fd, fcntls)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSystem;

    #[test]
    fn unrestricted_has_no_limit() {
        assert_eq!(ResourceClass::Unrestricted.rights(), None);
        assert_eq!(ResourceClass::default(), ResourceClass::Unrestricted);
    }

    #[test]
    fn every_restricted_class_can_lookup() {
        for class in [
            ResourceClass::DataFiles,
            ResourceClass::IpcSockets,
            ResourceClass::Gpu,
        ] {
            let spec = class.rights().expect("restricted");
            assert!(spec.rights.contains(CapRights::LOOKUP | CapRights::FSTAT));
        }
    }

    #[test]
    fn class_sets_stay_minimal() {
        let data = ResourceClass::DataFiles.rights().unwrap();
        assert!(!data.rights.contains(CapRights::WRITE));
        assert_eq!(data.fcntls, Some(FcntlRights::GETFL));

        let ipc = ResourceClass::IpcSockets.rights().unwrap();
        assert!(ipc.rights.contains(CapRights::CONNECTAT | CapRights::MKDIRAT));
        assert!(!ipc.rights.contains(CapRights::MMAP));

        let gpu = ResourceClass::Gpu.rights().unwrap();
        assert!(gpu.rights.contains(CapRights::IOCTL | CapRights::MMAP));
        assert!(!gpu.rights.contains(CapRights::CONNECTAT));
    }

    #[test]
    fn cap_values_follow_flags() {
        let values: Vec<u64> = (CapRights::LOOKUP | CapRights::IOCTL).cap_values().collect();
        assert_eq!(values, vec![(1 << 57) | 0x400, (1 << 58) | 0x80]);
        assert_eq!(CapRights::empty().cap_values().count(), 0);
    }

    #[test]
    fn raw_words_match_freebsd_layout() {
        let words = (CapRights::READ | CapRights::LOOKUP).to_raw_words();
        assert_eq!(words[0], (1 << 57) | 0x1 | 0x400);
        assert_eq!(words[1], 1 << 58);

        let words = CapRights::IOCTL.to_raw_words();
        assert_eq!(words[0], 1 << 57);
        assert_eq!(words[1], (1 << 58) | 0x80);
    }

    #[test]
    fn unrestricted_issues_no_limit_calls() {
        let sys = FakeSystem::new();
        let fd = sys.open_at_path("/", libc::O_RDONLY | libc::O_DIRECTORY).unwrap();
        apply_rights(&sys, fd, ResourceClass::Unrestricted).unwrap();
        assert_eq!(sys.rights_of(fd), None);
    }

    #[test]
    fn reapplying_same_class_succeeds() {
        let sys = FakeSystem::new();
        sys.add_dir("/dev/dri");
        let fd = sys.open_at_path("/dev/dri", libc::O_RDONLY | libc::O_DIRECTORY).unwrap();
        apply_rights(&sys, fd, ResourceClass::Gpu).unwrap();
        apply_rights(&sys, fd, ResourceClass::Gpu).unwrap();
        assert_eq!(
            sys.rights_of(fd),
            ResourceClass::Gpu.rights().map(|s| s.rights)
        );
    }

    #[test]
    fn widening_after_restriction_fails() {
        let sys = FakeSystem::new();
        sys.add_dir("/usr/share");
        let fd = sys.open_at_path("/usr/share", libc::O_RDONLY | libc::O_DIRECTORY).unwrap();
        apply_rights(&sys, fd, ResourceClass::DataFiles).unwrap();
        let err = apply_rights(&sys, fd, ResourceClass::Gpu).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(crate::testing::ENOTCAPABLE));
    }
}
