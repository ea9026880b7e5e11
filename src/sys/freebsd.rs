// CLASSIFICATION: COMMUNITY
// Filename: freebsd.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! FreeBSD-only primitives: Capsicum limits, sysctl and devname.

use std::ffi::CStr;
use std::io;
use std::mem;
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::os::unix::io::RawFd;
use std::ptr;

use super::host::{c_path, cvt};
use crate::rights::{CapRights, FcntlRights};

/// `CTL_MAXNAME` from `<sys/sysctl.h>`.
const CTL_MAXNAME: usize = 24;
/// `SPECNAMELEN` from `<sys/param.h>`, plus the terminator.
const DEVNAME_BUF: usize = 256;

// not exported by the libc crate
extern "C" {
    fn connectat(
        fd: c_int,
        s: c_int,
        name: *const libc::sockaddr,
        namelen: libc::socklen_t,
    ) -> c_int;
}

pub(super) fn limit_rights(fd: RawFd, rights: CapRights) -> io::Result<()> {
    // SAFETY: cap_rights_t is plain data; __cap_rights_init fills it in
    // before anything reads it.
    let mut raw: libc::cap_rights_t = unsafe { mem::zeroed() };
    // SAFETY: the variadic lists are 0-terminated as cap_rights_init(3) requires.
    unsafe {
        libc::__cap_rights_init(libc::CAP_RIGHTS_VERSION, &mut raw, 0u64);
        for value in rights.cap_values() {
            libc::__cap_rights_set(&mut raw, value, 0u64);
        }
    }
    // SAFETY: `raw` is a valid cap_rights_t.
    cvt(unsafe { libc::cap_rights_limit(fd, &raw) }).map(|_| ())
}

pub(super) fn limit_fcntls(fd: RawFd, fcntls: FcntlRights) -> io::Result<()> {
    // SAFETY: no pointers involved.
    cvt(unsafe { libc::cap_fcntls_limit(fd, fcntls.bits()) }).map(|_| ())
}

pub(super) fn name_to_mib(name: &str) -> io::Result<Vec<i32>> {
    let c = c_path(name)?;
    let mut mib = vec![0 as c_int; CTL_MAXNAME];
    let mut len: libc::size_t = mib.len();
    // SAFETY: `mib` has room for `len` integers.
    cvt(unsafe { libc::sysctlnametomib(c.as_ptr(), mib.as_mut_ptr(), &mut len) })?;
    mib.truncate(len);
    Ok(mib)
}

fn split_old(old: Option<&mut [u8]>) -> (*mut c_void, libc::size_t) {
    match old {
        Some(buf) => (buf.as_mut_ptr() as *mut c_void, buf.len()),
        None => (ptr::null_mut(), 0),
    }
}

fn split_new(new: Option<&[u8]>) -> (*const c_void, libc::size_t) {
    match new {
        Some(buf) => (buf.as_ptr() as *const c_void, buf.len()),
        None => (ptr::null(), 0),
    }
}

pub(super) fn sysctl_mib(mib: &[i32], old: Option<&mut [u8]>, new: Option<&[u8]>) -> io::Result<usize> {
    let (oldp, mut oldlen) = split_old(old);
    let (newp, newlen) = split_new(new);
    // SAFETY: the buffers outlive the call and their lengths are exact.
    cvt(unsafe {
        libc::sysctl(
            mib.as_ptr(),
            mib.len() as c_uint,
            oldp,
            &mut oldlen,
            newp,
            newlen,
        )
    })?;
    Ok(oldlen)
}

pub(super) fn sysctl_name(
    name: &str,
    old: Option<&mut [u8]>,
    new: Option<&[u8]>,
) -> io::Result<usize> {
    let c = c_path(name)?;
    let (oldp, mut oldlen) = split_old(old);
    let (newp, newlen) = split_new(new);
    // SAFETY: the buffers outlive the call and their lengths are exact.
    cvt(unsafe { libc::sysctlbyname(c.as_ptr(), oldp, &mut oldlen, newp, newlen) })?;
    Ok(oldlen)
}

pub(super) fn device_name(dev: u64, kind: u32) -> io::Result<String> {
    let mut buf = [0 as c_char; DEVNAME_BUF];
    // SAFETY: `buf` is writable for its full length.
    let res = unsafe {
        libc::devname_r(
            dev as libc::dev_t,
            kind as libc::mode_t,
            buf.as_mut_ptr(),
            buf.len() as c_int,
        )
    };
    if res.is_null() {
        return Err(io::Error::from_raw_os_error(libc::ENOENT));
    }
    // SAFETY: devname_r NUL-terminates within `buf`.
    let name = unsafe { CStr::from_ptr(res) };
    Ok(name.to_string_lossy().into_owned())
}

pub(super) fn connect_at(
    base: RawFd,
    socket: RawFd,
    addr: &libc::sockaddr_un,
    len: libc::socklen_t,
) -> io::Result<()> {
    // SAFETY: `addr` is an initialized sockaddr_un of `len` bytes.
    cvt(unsafe {
        connectat(
            base,
            socket,
            addr as *const libc::sockaddr_un as *const libc::sockaddr,
            len,
        )
    })
    .map(|_| ())
}
