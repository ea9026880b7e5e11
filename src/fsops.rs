// CLASSIFICATION: COMMUNITY
// Filename: fsops.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Path-taking file operations rewritten onto preopened handles.
//!
//! Each adapter resolves its path through [`Capshim::resolve`] and forwards
//! to the matching `*at` primitive. `open` checks the preopened files first.

use std::io;
use std::os::unix::io::RawFd;

use log::debug;

use crate::shim::Capshim;
use crate::sys::{self, FileStat, SystemCalls};

/// `DEFFILEMODE`: creation mode used by `fopen`.
pub const DEFAULT_FILE_MODE: u32 = 0o666;

/// Flags `opendir(3)` opens with.
pub const OPENDIR_FLAGS: i32 = libc::O_RDONLY | libc::O_NONBLOCK | libc::O_DIRECTORY | libc::O_CLOEXEC;

fn invalid() -> io::Error {
    io::Error::from_raw_os_error(libc::EINVAL)
}

fn creates(flags: i32) -> bool {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    let tmpfile = flags & libc::O_TMPFILE == libc::O_TMPFILE;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    let tmpfile = false;
    tmpfile || flags & libc::O_CREAT != 0
}

/// Translate an stdio mode string (`"r"`, `"w+"`, `"ae"`...) into open flags.
///
/// Returns `None` for strings `fopen` would reject.
pub fn parse_stdio_mode(mode: &str) -> Option<i32> {
    let mut chars = mode.chars();
    let (mut access, mut extra) = match chars.next()? {
        'r' => (libc::O_RDONLY, 0),
        'w' => (libc::O_WRONLY, libc::O_CREAT | libc::O_TRUNC),
        'a' => (libc::O_WRONLY, libc::O_CREAT | libc::O_APPEND),
        _ => return None,
    };
    for c in chars {
        match c {
            '+' => access = libc::O_RDWR,
            'x' => extra |= libc::O_EXCL,
            'e' => extra |= libc::O_CLOEXEC,
            'b' => {}
            _ => break,
        }
    }
    if extra & libc::O_EXCL != 0 && extra & libc::O_CREAT == 0 {
        return None;
    }
    Some(access | extra)
}

impl<S: SystemCalls> Capshim<S> {
    /// `open(2)`.
    ///
    /// `mode` is required with `O_CREAT` and ignored without it. A preopened
    /// file is never reopened; the caller gets a duplicate of its handle.
    pub fn open(&self, path: &str, flags: i32, mode: Option<u32>) -> io::Result<RawFd> {
        let mode = match (creates(flags), mode) {
            (true, Some(mode)) => mode,
            (true, None) => return Err(invalid()),
            (false, Some(_)) => {
                debug!("open {}: mode ignored without O_CREAT", path);
                0
            }
            (false, None) => 0,
        };
        if let Some(fd) = self.registry.file_handle(path) {
            debug!("open {}: duplicating preopened fd {}", path, fd);
            return self.sys.dup(fd);
        }
        let res = self.resolve(path);
        self.sys.open_at(res.base, &res.relpath, flags, mode)
    }

    /// `opendir(3)`: returns the directory descriptor.
    pub fn open_dir(&self, path: &str) -> io::Result<RawFd> {
        self.open(path, OPENDIR_FLAGS, None)
    }

    /// `fopen(3)`: returns the descriptor to wrap in a stream.
    pub fn fopen(&self, path: &str, mode: &str) -> io::Result<RawFd> {
        let flags = parse_stdio_mode(mode).ok_or_else(invalid)?;
        self.open(path, flags, Some(DEFAULT_FILE_MODE))
    }

    /// `access(2)` and `eaccess(2)`.
    pub fn access(&self, path: &str, mode: i32) -> io::Result<()> {
        let res = self.resolve(path);
        self.sys.access_at(res.base, &res.relpath, mode)
    }

    /// `stat(2)` and `lstat(2)`; both follow the final symlink.
    pub fn stat(&self, path: &str) -> io::Result<FileStat> {
        let res = self.resolve(path);
        self.sys.stat_at(res.base, &res.relpath)
    }

    /// `mkdir(2)` through the registry.
    pub fn mkdir(&self, path: &str, mode: u32) -> io::Result<()> {
        let res = self.resolve(path);
        self.sys.mkdir_at(res.base, &res.relpath, mode)
    }

    /// `unlink(2)` through the registry.
    pub fn unlink(&self, path: &str) -> io::Result<()> {
        let res = self.resolve(path);
        self.sys.unlink_at(res.base, &res.relpath)
    }

    /// `connect(2)` on a unix socket, with `sun_path` rewritten relative to
    /// the preopened directory that holds it.
    pub fn connect_unix(&self, socket: RawFd, path: &str) -> io::Result<()> {
        let res = self.resolve(path);
        if res.relpath.len() >= sys::sun_path_capacity() {
            return Err(io::Error::from_raw_os_error(libc::ENAMETOOLONG));
        }
        self.sys.connect_unix_at(res.base, socket, &res.relpath)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShimConfig;
    use crate::rights::ResourceClass;
    use crate::testing::{FakeSystem, ENOTCAPABLE};

    fn shim() -> Capshim<FakeSystem> {
        Capshim::with_config(FakeSystem::new(), ShimConfig { max_symlink_hops: 8 })
    }

    #[test]
    fn stdio_modes() {
        assert_eq!(parse_stdio_mode("r"), Some(libc::O_RDONLY));
        assert_eq!(parse_stdio_mode("rb+"), Some(libc::O_RDWR));
        assert_eq!(
            parse_stdio_mode("w"),
            Some(libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC)
        );
        assert_eq!(
            parse_stdio_mode("a+e"),
            Some(libc::O_RDWR | libc::O_CREAT | libc::O_APPEND | libc::O_CLOEXEC)
        );
        assert_eq!(
            parse_stdio_mode("wx"),
            Some(libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC | libc::O_EXCL)
        );
        assert_eq!(parse_stdio_mode("rx"), None);
        assert_eq!(parse_stdio_mode("q"), None);
        assert_eq!(parse_stdio_mode(""), None);
    }

    #[test]
    fn create_without_mode_is_einval() {
        let shim = shim();
        let err = shim.open("/tmp/new", libc::O_WRONLY | libc::O_CREAT, None).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
    }

    #[test]
    fn preopened_file_is_duplicated() {
        let mut shim = shim();
        shim.system().add_file("/usr/share/libdrm/amdgpu.ids", b"1002");
        shim.preopen_file("/usr/share/libdrm/amdgpu.ids", libc::O_RDONLY, ResourceClass::DataFiles)
            .unwrap();
        shim.system().enter_capability_mode();
        let original = shim.preopened_file("/usr/share/libdrm/amdgpu.ids").unwrap();
        let fd = shim.fopen("/usr/share/libdrm/amdgpu.ids", "r").unwrap();
        assert_ne!(fd, original);
        assert_eq!(shim.system().path_of(fd), shim.system().path_of(original));
        assert_eq!(shim.system().rights_of(fd), shim.system().rights_of(original));
    }

    #[test]
    fn open_dir_on_preopened_dir() {
        let mut shim = shim();
        shim.system().add_dir("/dev/dri");
        shim.preopen_dir("/dev/dri", ResourceClass::Gpu).unwrap();
        shim.system().enter_capability_mode();
        let fd = shim.open_dir("/dev/dri").unwrap();
        assert_eq!(shim.system().path_of(fd).as_deref(), Some("/dev/dri"));
    }

    #[test]
    fn unredirected_open_hits_capability_mode() {
        let shim = shim();
        shim.system().add_file("/etc/passwd", b"");
        shim.system().enter_capability_mode();
        let err = shim.open("/etc/passwd", libc::O_RDONLY, None).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(crate::testing::ECAPMODE));
    }

    #[test]
    fn ipc_dir_allows_mkdir_and_connect() {
        let mut shim = shim();
        shim.system().add_dir("/var/run/user/1000");
        shim.system().add_socket("/var/run/user/1000/pulse/native");
        shim.preopen_dir("/var/run/user/1000", ResourceClass::IpcSockets).unwrap();
        shim.system().enter_capability_mode();

        let err = shim.mkdir("/var/run/user/1000/pulse", 0o700).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EEXIST));
        shim.connect_unix(7, "/var/run/user/1000/pulse/native").unwrap();
        assert_eq!(
            shim.system().connections(),
            vec![(7, "/var/run/user/1000/pulse/native".to_string())]
        );
    }

    #[test]
    fn data_dir_refuses_mkdir() {
        let mut shim = shim();
        shim.system().add_dir("/usr/share/fonts");
        shim.preopen_dir("/usr/share/fonts", ResourceClass::DataFiles).unwrap();
        shim.system().enter_capability_mode();
        let err = shim.mkdir("/usr/share/fonts/new", 0o755).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(ENOTCAPABLE));
    }

    #[test]
    fn stat_access_unlink_through_handle() {
        let mut shim = shim();
        shim.system().add_file("/tmp/work/a.txt", b"hello");
        shim.preopen_dir("/tmp/work", ResourceClass::Unrestricted).unwrap();
        shim.system().enter_capability_mode();

        let st = shim.stat("/tmp/work/a.txt").unwrap();
        assert_eq!(st.size, 5);
        assert!(!st.is_dir());
        assert!(shim.stat("/tmp/work").unwrap().is_dir());
        shim.access("/tmp/work/a.txt", libc::R_OK).unwrap();
        shim.unlink("/tmp/work/a.txt").unwrap();
        assert!(!shim.system().exists("/tmp/work/a.txt"));
        let err = shim.access("/tmp/work/a.txt", libc::F_OK).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }

    #[test]
    fn overlong_socket_path_is_rejected() {
        let mut shim = shim();
        shim.system().add_dir("/run");
        shim.preopen_dir("/run", ResourceClass::IpcSockets).unwrap();
        let long = format!("/run/{}", "s".repeat(sys::sun_path_capacity()));
        let err = shim.connect_unix(3, &long).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENAMETOOLONG));
    }
}
