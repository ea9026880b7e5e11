// CLASSIFICATION: COMMUNITY
// Filename: host.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! libc-backed [`SystemCalls`] for the running host.

use std::ffi::CString;
use std::io;
use std::mem::MaybeUninit;
use std::os::unix::io::RawFd;

use super::{BaseDir, FileStat, SystemCalls};
use crate::rights::{CapRights, FcntlRights};

/// Forwards every primitive to the kernel.
///
/// Capsicum, `sysctl` and `devname` only exist on FreeBSD; elsewhere those
/// methods fail with [`io::ErrorKind::Unsupported`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HostSystem;

pub(super) fn c_path(path: &str) -> io::Result<CString> {
    CString::new(path).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))
}

pub(super) fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

#[cfg(not(target_os = "freebsd"))]
fn unsupported(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{what} is only available on FreeBSD"),
    )
}

/// Build a `sockaddr_un` for `path`.
pub(super) fn unix_addr(path: &str) -> io::Result<(libc::sockaddr_un, libc::socklen_t)> {
    // SAFETY: sockaddr_un is plain old data; all-zero is a valid value.
    let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    let bytes = path.as_bytes();
    if bytes.len() >= addr.sun_path.len() {
        return Err(io::Error::from_raw_os_error(libc::ENAMETOOLONG));
    }
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    for (dst, src) in addr.sun_path.iter_mut().zip(bytes) {
        *dst = *src as libc::c_char;
    }
    let len = std::mem::size_of::<libc::sockaddr_un>();
    #[cfg(target_os = "freebsd")]
    {
        addr.sun_len = len as u8;
    }
    Ok((addr, len as libc::socklen_t))
}

impl SystemCalls for HostSystem {
    fn open_at(&self, base: BaseDir, path: &str, flags: i32, mode: u32) -> io::Result<RawFd> {
        let c = c_path(path)?;
        // SAFETY: `c` is a valid NUL-terminated string for the call's duration.
        cvt(unsafe { libc::openat(base.as_raw(), c.as_ptr(), flags, mode as libc::c_uint) })
    }

    fn close(&self, fd: RawFd) -> io::Result<()> {
        // SAFETY: closing a descriptor we own.
        cvt(unsafe { libc::close(fd) }).map(|_| ())
    }

    fn dup(&self, fd: RawFd) -> io::Result<RawFd> {
        // SAFETY: dup has no memory-safety preconditions.
        cvt(unsafe { libc::dup(fd) })
    }

    fn read_link_at(&self, base: BaseDir, path: &str) -> io::Result<String> {
        let c = c_path(path)?;
        let mut buf = vec![0u8; libc::PATH_MAX as usize + 1];
        // SAFETY: `buf` is writable for `buf.len()` bytes.
        let n = unsafe {
            libc::readlinkat(
                base.as_raw(),
                c.as_ptr(),
                buf.as_mut_ptr() as *mut libc::c_char,
                buf.len() - 1,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        buf.truncate(n as usize);
        String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    #[cfg(target_os = "freebsd")]
    fn limit_rights(&self, fd: RawFd, rights: CapRights) -> io::Result<()> {
        super::freebsd::limit_rights(fd, rights)
    }

    #[cfg(not(target_os = "freebsd"))]
    fn limit_rights(&self, _fd: RawFd, _rights: CapRights) -> io::Result<()> {
        Err(unsupported("cap_rights_limit"))
    }

    #[cfg(target_os = "freebsd")]
    fn limit_fcntls(&self, fd: RawFd, fcntls: FcntlRights) -> io::Result<()> {
        super::freebsd::limit_fcntls(fd, fcntls)
    }

    #[cfg(not(target_os = "freebsd"))]
    fn limit_fcntls(&self, _fd: RawFd, _fcntls: FcntlRights) -> io::Result<()> {
        Err(unsupported("cap_fcntls_limit"))
    }

    #[cfg(target_os = "freebsd")]
    fn sysctl_name_to_mib(&self, name: &str) -> io::Result<Vec<i32>> {
        super::freebsd::name_to_mib(name)
    }

    #[cfg(not(target_os = "freebsd"))]
    fn sysctl_name_to_mib(&self, _name: &str) -> io::Result<Vec<i32>> {
        Err(unsupported("sysctlnametomib"))
    }

    #[cfg(target_os = "freebsd")]
    fn sysctl(&self, mib: &[i32], old: Option<&mut [u8]>, new: Option<&[u8]>) -> io::Result<usize> {
        super::freebsd::sysctl_mib(mib, old, new)
    }

    #[cfg(not(target_os = "freebsd"))]
    fn sysctl(&self, _mib: &[i32], _old: Option<&mut [u8]>, _new: Option<&[u8]>) -> io::Result<usize> {
        Err(unsupported("sysctl"))
    }

    #[cfg(target_os = "freebsd")]
    fn sysctl_by_name(
        &self,
        name: &str,
        old: Option<&mut [u8]>,
        new: Option<&[u8]>,
    ) -> io::Result<usize> {
        super::freebsd::sysctl_name(name, old, new)
    }

    #[cfg(not(target_os = "freebsd"))]
    fn sysctl_by_name(
        &self,
        _name: &str,
        _old: Option<&mut [u8]>,
        _new: Option<&[u8]>,
    ) -> io::Result<usize> {
        Err(unsupported("sysctlbyname"))
    }

    #[cfg(target_os = "freebsd")]
    fn devname(&self, dev: u64, kind: u32) -> io::Result<String> {
        super::freebsd::device_name(dev, kind)
    }

    #[cfg(not(target_os = "freebsd"))]
    fn devname(&self, _dev: u64, _kind: u32) -> io::Result<String> {
        Err(unsupported("devname_r"))
    }

    fn access_at(&self, base: BaseDir, path: &str, mode: i32) -> io::Result<()> {
        let c = c_path(path)?;
        // SAFETY: `c` is a valid NUL-terminated string.
        cvt(unsafe { libc::faccessat(base.as_raw(), c.as_ptr(), mode, 0) }).map(|_| ())
    }

    fn stat_at(&self, base: BaseDir, path: &str) -> io::Result<FileStat> {
        let c = c_path(path)?;
        let mut st = MaybeUninit::<libc::stat>::uninit();
        // SAFETY: fstatat fully initializes `st` when it returns 0.
        cvt(unsafe { libc::fstatat(base.as_raw(), c.as_ptr(), st.as_mut_ptr(), 0) })?;
        let st = unsafe { st.assume_init() };
        Ok(FileStat {
            dev: st.st_dev as u64,
            ino: st.st_ino as u64,
            mode: st.st_mode as u32,
            nlink: st.st_nlink as u64,
            size: st.st_size as i64,
        })
    }

    fn mkdir_at(&self, base: BaseDir, path: &str, mode: u32) -> io::Result<()> {
        let c = c_path(path)?;
        // SAFETY: `c` is a valid NUL-terminated string.
        cvt(unsafe { libc::mkdirat(base.as_raw(), c.as_ptr(), mode as libc::mode_t) }).map(|_| ())
    }

    fn unlink_at(&self, base: BaseDir, path: &str) -> io::Result<()> {
        let c = c_path(path)?;
        // SAFETY: `c` is a valid NUL-terminated string.
        cvt(unsafe { libc::unlinkat(base.as_raw(), c.as_ptr(), 0) }).map(|_| ())
    }

    #[cfg(target_os = "freebsd")]
    fn connect_unix_at(&self, base: BaseDir, socket: RawFd, path: &str) -> io::Result<()> {
        let (addr, len) = unix_addr(path)?;
        super::freebsd::connect_at(base.as_raw(), socket, &addr, len)
    }

    #[cfg(not(target_os = "freebsd"))]
    fn connect_unix_at(&self, base: BaseDir, socket: RawFd, path: &str) -> io::Result<()> {
        if base.is_redirected() {
            return Err(unsupported("connectat"));
        }
        let (addr, len) = unix_addr(path)?;
        // SAFETY: `addr` is an initialized sockaddr_un of `len` bytes.
        cvt(unsafe {
            libc::connect(socket, &addr as *const libc::sockaddr_un as *const libc::sockaddr, len)
        })
        .map(|_| ())
    }
}
