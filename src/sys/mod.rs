// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! The underlying system calls the shim forwards to.
//!
//! Everything that touches the OS goes through [`SystemCalls`], which is
//! chosen once when the context is built. [`HostSystem`] talks to the kernel;
//! `testing::FakeSystem` (behind the `testing` feature) scripts the same surface in memory.

use std::io;
use std::os::unix::io::RawFd;

use crate::rights::{CapRights, FcntlRights};

#[cfg(target_os = "freebsd")]
mod freebsd;
mod host;

pub use host::HostSystem;

/// Directory a relative path is looked up from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseDir {
    /// No preopened directory matched; use the default lookup.
    Cwd,
    /// A registered directory handle.
    Handle(RawFd),
}

impl BaseDir {
    /// Descriptor suitable for the `*at` family (`AT_FDCWD` for [`BaseDir::Cwd`]).
    pub fn as_raw(self) -> RawFd {
        match self {
            BaseDir::Cwd => libc::AT_FDCWD,
            BaseDir::Handle(fd) => fd,
        }
    }

    /// True for a preopened handle.
    pub fn is_redirected(self) -> bool {
        matches!(self, BaseDir::Handle(_))
    }
}

/// Subset of `struct stat` the adapters report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileStat {
    /// Device holding the inode.
    pub dev: u64,
    /// Inode number.
    pub ino: u64,
    /// File type and permission bits.
    pub mode: u32,
    /// Hard link count.
    pub nlink: u64,
    /// Size in bytes.
    pub size: i64,
}

impl FileStat {
    /// True for a directory.
    pub fn is_dir(&self) -> bool {
        self.mode & libc::S_IFMT as u32 == libc::S_IFDIR as u32
    }
}

/// Capacity of `sockaddr_un::sun_path` on this host, terminator included.
pub fn sun_path_capacity() -> usize {
    // SAFETY: sockaddr_un is plain old data; all-zero is a valid value.
    let addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_path.len()
}

/// The real (unrestricted) implementation of every primitive the shim uses.
///
/// Implementations report failures as [`io::Error`] carrying the OS error
/// code, so `EPERM`, `ENOTCAPABLE` and friends reach adapters untouched.
pub trait SystemCalls {
    fn open_at(&self, base: BaseDir, path: &str, flags: i32, mode: u32) -> io::Result<RawFd>;
    fn close(&self, fd: RawFd) -> io::Result<()>;
    fn dup(&self, fd: RawFd) -> io::Result<RawFd>;
    fn read_link_at(&self, base: BaseDir, path: &str) -> io::Result<String>;

    fn limit_rights(&self, fd: RawFd, rights: CapRights) -> io::Result<()>;
    fn limit_fcntls(&self, fd: RawFd, fcntls: FcntlRights) -> io::Result<()>;

    fn sysctl_name_to_mib(&self, name: &str) -> io::Result<Vec<i32>>;
    /// With `old` unset, returns the size of the answer; otherwise fills
    /// `old` and returns the number of bytes written.
    fn sysctl(&self, mib: &[i32], old: Option<&mut [u8]>, new: Option<&[u8]>) -> io::Result<usize>;
    fn sysctl_by_name(
        &self,
        name: &str,
        old: Option<&mut [u8]>,
        new: Option<&[u8]>,
    ) -> io::Result<usize>;
    fn devname(&self, dev: u64, kind: u32) -> io::Result<String>;

    fn access_at(&self, base: BaseDir, path: &str, mode: i32) -> io::Result<()>;
    fn stat_at(&self, base: BaseDir, path: &str) -> io::Result<FileStat>;
    fn mkdir_at(&self, base: BaseDir, path: &str, mode: u32) -> io::Result<()>;
    fn unlink_at(&self, base: BaseDir, path: &str) -> io::Result<()>;
    fn connect_unix_at(&self, base: BaseDir, socket: RawFd, path: &str) -> io::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cwd_maps_to_at_fdcwd() {
        assert_eq!(BaseDir::Cwd.as_raw(), libc::AT_FDCWD);
        assert_eq!(BaseDir::Handle(7).as_raw(), 7);
        assert!(!BaseDir::Cwd.is_redirected());
        assert!(BaseDir::Handle(7).is_redirected());
    }

    #[test]
    fn sun_path_has_room() {
        assert!(sun_path_capacity() >= 100);
    }
}
