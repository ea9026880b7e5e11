// CLASSIFICATION: COMMUNITY
// Filename: testing.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! In-memory [`SystemCalls`] used by unit and integration tests.
//!
//! `FakeSystem` keeps a small file tree (directories, files, symlinks and
//! unix sockets), a descriptor table with Capsicum-style rights, a sysctl
//! table and a devname table. After [`FakeSystem::enter_capability_mode`]
//! it behaves like a process in capability mode: lookups relative to the
//! current directory fail with `ECAPMODE`, `..` under a directory handle
//! fails with `ENOTCAPABLE`, and live sysctl/devname queries are denied.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::os::unix::io::RawFd;

use crate::rights::{CapRights, FcntlRights};
use crate::sys::{BaseDir, FileStat, SystemCalls};

/// FreeBSD `ENOTCAPABLE`.
pub const ENOTCAPABLE: i32 = 93;
/// FreeBSD `ECAPMODE`.
pub const ECAPMODE: i32 = 94;

const FIRST_FD: RawFd = 100;
const MAX_FOLLOW: usize = 8;

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
    Symlink(String),
    Socket,
}

#[derive(Debug, Clone)]
struct OpenFile {
    path: String,
    rights: Option<CapRights>,
    fcntls: Option<FcntlRights>,
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<String, Node>,
    fds: HashMap<RawFd, OpenFile>,
    next_fd: RawFd,
    mibs: HashMap<String, Vec<i32>>,
    sysctls: HashMap<Vec<i32>, Vec<u8>>,
    devnames: HashMap<(u64, u32), String>,
    restricted: bool,
    denied: HashSet<String>,
    fail_limits: bool,
    opens: usize,
    closes: usize,
    live_queries: usize,
    connections: Vec<(RawFd, String)>,
}

fn err(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

/// Join `rel` onto `base` and drop empty and `.` components.
fn join(base: &str, rel: &str) -> String {
    let parts: Vec<&str> = base
        .split('/')
        .chain(rel.split('/'))
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();
    format!("/{}", parts.join("/"))
}

fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Scripted stand-in for the kernel.
#[derive(Debug)]
pub struct FakeSystem {
    state: RefCell<State>,
}

impl Default for FakeSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSystem {
    /// Empty tree containing only `/`.
    pub fn new() -> Self {
        let mut state = State {
            next_fd: FIRST_FD,
            ..Default::default()
        };
        state.nodes.insert("/".into(), Node::Dir);
        Self {
            state: RefCell::new(state),
        }
    }

    fn insert(&self, path: &str, node: Node) {
        let path = join("/", path);
        let mut st = self.state.borrow_mut();
        let mut cur = String::new();
        for part in parent(&path).split('/').filter(|p| !p.is_empty()) {
            cur.push('/');
            cur.push_str(part);
            st.nodes.entry(cur.clone()).or_insert(Node::Dir);
        }
        st.nodes.insert(path, node);
    }

    /// Add a directory, creating parents.
    pub fn add_dir(&self, path: &str) {
        self.insert(path, Node::Dir);
    }

    /// Add a regular file, creating parents.
    pub fn add_file(&self, path: &str, contents: &[u8]) {
        self.insert(path, Node::File(contents.to_vec()));
    }

    /// Add a symlink, creating parents.
    pub fn add_symlink(&self, path: &str, target: &str) {
        self.insert(path, Node::Symlink(target.into()));
    }

    /// Add a unix socket node, creating parents.
    pub fn add_socket(&self, path: &str) {
        self.insert(path, Node::Socket);
    }

    /// Register a sysctl reachable by `name` and by `mib`.
    pub fn set_sysctl(&self, name: &str, mib: &[i32], value: &[u8]) {
        let mut st = self.state.borrow_mut();
        st.mibs.insert(name.into(), mib.to_vec());
        st.sysctls.insert(mib.to_vec(), value.to_vec());
    }

    /// Register the name of device `(dev, kind)`.
    pub fn set_devname(&self, dev: u64, kind: u32, name: &str) {
        self.state
            .borrow_mut()
            .devnames
            .insert((dev, kind), name.into());
    }

    /// Switch to capability-mode behaviour. There is no way back.
    pub fn enter_capability_mode(&self) {
        self.state.borrow_mut().restricted = true;
    }

    /// Make every open of `path` fail with `EACCES`.
    pub fn deny_open(&self, path: &str) {
        self.state.borrow_mut().denied.insert(join("/", path));
    }

    /// Make `cap_rights_limit`/`cap_fcntls_limit` fail with `EINVAL`.
    pub fn fail_rights_limits(&self, fail: bool) {
        self.state.borrow_mut().fail_limits = fail;
    }

    /// `open(path, flags)` from the current directory.
    pub fn open_at_path(&self, path: &str, flags: i32) -> io::Result<RawFd> {
        self.open_at(BaseDir::Cwd, path, flags, 0)
    }

    /// Capability rights currently on `fd`.
    pub fn rights_of(&self, fd: RawFd) -> Option<CapRights> {
        self.state.borrow().fds.get(&fd).and_then(|f| f.rights)
    }

    /// Fcntl rights currently on `fd`.
    pub fn fcntls_of(&self, fd: RawFd) -> Option<FcntlRights> {
        self.state.borrow().fds.get(&fd).and_then(|f| f.fcntls)
    }

    /// Path `fd` was opened at.
    pub fn path_of(&self, fd: RawFd) -> Option<String> {
        self.state.borrow().fds.get(&fd).map(|f| f.path.clone())
    }

    /// True while `fd` is open.
    pub fn is_open(&self, fd: RawFd) -> bool {
        self.state.borrow().fds.contains_key(&fd)
    }

    /// Number of fds currently open.
    pub fn open_fds(&self) -> usize {
        self.state.borrow().fds.len()
    }

    /// Successful opens so far.
    pub fn open_count(&self) -> usize {
        self.state.borrow().opens
    }

    /// Closes so far.
    pub fn close_count(&self) -> usize {
        self.state.borrow().closes
    }

    /// Number of live sysctl/sysctlbyname calls issued so far.
    pub fn live_queries(&self) -> usize {
        self.state.borrow().live_queries
    }

    /// True when a node exists at `path`.
    pub fn exists(&self, path: &str) -> bool {
        self.state.borrow().nodes.contains_key(&join("/", path))
    }

    /// Contents of the file at `path`.
    pub fn file_contents(&self, path: &str) -> Option<Vec<u8>> {
        match self.state.borrow().nodes.get(&join("/", path)) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    /// `(socket, absolute path)` for every successful connect.
    pub fn connections(&self) -> Vec<(RawFd, String)> {
        self.state.borrow().connections.clone()
    }

    /// Turn (base, path) into an absolute path, enforcing capability rules.
    fn locate(&self, st: &State, base: BaseDir, path: &str, need: CapRights) -> io::Result<String> {
        match base {
            BaseDir::Cwd => {
                if st.restricted {
                    return Err(err(ECAPMODE));
                }
                Ok(join("/", path))
            }
            BaseDir::Handle(fd) => {
                let open = st.fds.get(&fd).ok_or_else(|| err(libc::EBADF))?;
                if let Some(rights) = open.rights {
                    if !rights.contains(need) {
                        return Err(err(ENOTCAPABLE));
                    }
                }
                if st.restricted && (path.starts_with('/') || path.split('/').any(|p| p == "..")) {
                    return Err(err(ENOTCAPABLE));
                }
                match st.nodes.get(&open.path) {
                    Some(Node::Dir) => Ok(join(&open.path, path)),
                    _ => Err(err(libc::ENOTDIR)),
                }
            }
        }
    }

    fn follow(st: &State, mut path: String) -> io::Result<String> {
        for _ in 0..MAX_FOLLOW {
            match st.nodes.get(&path) {
                Some(Node::Symlink(target)) if target.starts_with('/') => path = join("/", target),
                Some(Node::Symlink(target)) => path = join(parent(&path), target),
                Some(_) => return Ok(path),
                None => return Err(err(libc::ENOENT)),
            }
        }
        Err(err(libc::ELOOP))
    }

    fn alloc(st: &mut State, file: OpenFile) -> RawFd {
        let fd = st.next_fd;
        st.next_fd += 1;
        st.fds.insert(fd, file);
        fd
    }
}

impl SystemCalls for FakeSystem {
    fn open_at(&self, base: BaseDir, path: &str, flags: i32, _mode: u32) -> io::Result<RawFd> {
        let mut st = self.state.borrow_mut();
        let full = self.locate(&st, base, path, CapRights::LOOKUP)?;
        if st.denied.contains(&full) {
            return Err(err(libc::EACCES));
        }
        let existing = st.nodes.get(&full).cloned();
        let full = match existing {
            Some(Node::Symlink(_)) if flags & libc::O_NOFOLLOW != 0 => return Err(err(libc::ELOOP)),
            Some(_) => Self::follow(&st, full)?,
            None if flags & libc::O_CREAT != 0 => {
                if !matches!(st.nodes.get(parent(&full)), Some(Node::Dir)) {
                    return Err(err(libc::ENOENT));
                }
                st.nodes.insert(full.clone(), Node::File(Vec::new()));
                full
            }
            None => return Err(err(libc::ENOENT)),
        };
        if flags & libc::O_DIRECTORY != 0 && !matches!(st.nodes.get(&full), Some(Node::Dir)) {
            return Err(err(libc::ENOTDIR));
        }
        st.opens += 1;
        Ok(Self::alloc(
            &mut st,
            OpenFile {
                path: full,
                rights: None,
                fcntls: None,
            },
        ))
    }

    fn close(&self, fd: RawFd) -> io::Result<()> {
        let mut st = self.state.borrow_mut();
        st.fds.remove(&fd).ok_or_else(|| err(libc::EBADF))?;
        st.closes += 1;
        Ok(())
    }

    fn dup(&self, fd: RawFd) -> io::Result<RawFd> {
        let mut st = self.state.borrow_mut();
        let file = st.fds.get(&fd).cloned().ok_or_else(|| err(libc::EBADF))?;
        Ok(Self::alloc(&mut st, file))
    }

    fn read_link_at(&self, base: BaseDir, path: &str) -> io::Result<String> {
        let st = self.state.borrow();
        let full = self.locate(&st, base, path, CapRights::LOOKUP)?;
        match st.nodes.get(&full) {
            Some(Node::Symlink(target)) => Ok(target.clone()),
            Some(_) => Err(err(libc::EINVAL)),
            None => Err(err(libc::ENOENT)),
        }
    }

    fn limit_rights(&self, fd: RawFd, rights: CapRights) -> io::Result<()> {
        let mut st = self.state.borrow_mut();
        if st.fail_limits {
            return Err(err(libc::EINVAL));
        }
        let file = st.fds.get_mut(&fd).ok_or_else(|| err(libc::EBADF))?;
        if let Some(current) = file.rights {
            if !current.contains(rights) {
                return Err(err(ENOTCAPABLE));
            }
        }
        file.rights = Some(rights);
        Ok(())
    }

    fn limit_fcntls(&self, fd: RawFd, fcntls: FcntlRights) -> io::Result<()> {
        let mut st = self.state.borrow_mut();
        if st.fail_limits {
            return Err(err(libc::EINVAL));
        }
        let file = st.fds.get_mut(&fd).ok_or_else(|| err(libc::EBADF))?;
        if let Some(current) = file.fcntls {
            if !current.contains(fcntls) {
                return Err(err(ENOTCAPABLE));
            }
        }
        file.fcntls = Some(fcntls);
        Ok(())
    }

    fn sysctl_name_to_mib(&self, name: &str) -> io::Result<Vec<i32>> {
        let st = self.state.borrow();
        if st.restricted {
            return Err(err(libc::EPERM));
        }
        st.mibs.get(name).cloned().ok_or_else(|| err(libc::ENOENT))
    }

    fn sysctl(&self, mib: &[i32], old: Option<&mut [u8]>, new: Option<&[u8]>) -> io::Result<usize> {
        let mut st = self.state.borrow_mut();
        st.live_queries += 1;
        if st.restricted {
            return Err(err(libc::EPERM));
        }
        if let Some(value) = new {
            st.sysctls.insert(mib.to_vec(), value.to_vec());
        }
        let value = st.sysctls.get(mib).ok_or_else(|| err(libc::ENOENT))?;
        match old {
            None => Ok(value.len()),
            Some(buf) if buf.len() < value.len() => Err(err(libc::ENOMEM)),
            Some(buf) => {
                buf[..value.len()].copy_from_slice(value);
                Ok(value.len())
            }
        }
    }

    fn sysctl_by_name(
        &self,
        name: &str,
        old: Option<&mut [u8]>,
        new: Option<&[u8]>,
    ) -> io::Result<usize> {
        let mib = {
            let mut st = self.state.borrow_mut();
            if st.restricted {
                st.live_queries += 1;
                return Err(err(libc::EPERM));
            }
            st.mibs.get(name).cloned()
        };
        match mib {
            Some(mib) => self.sysctl(&mib, old, new),
            None => Err(err(libc::ENOENT)),
        }
    }

    fn devname(&self, dev: u64, kind: u32) -> io::Result<String> {
        let st = self.state.borrow();
        if st.restricted {
            return Err(err(libc::EPERM));
        }
        st.devnames
            .get(&(dev, kind))
            .cloned()
            .ok_or_else(|| err(libc::ENOENT))
    }

    fn access_at(&self, base: BaseDir, path: &str, _mode: i32) -> io::Result<()> {
        let st = self.state.borrow();
        let full = self.locate(&st, base, path, CapRights::LOOKUP)?;
        Self::follow(&st, full).map(|_| ())
    }

    fn stat_at(&self, base: BaseDir, path: &str) -> io::Result<FileStat> {
        let st = self.state.borrow();
        let full = self.locate(&st, base, path, CapRights::LOOKUP | CapRights::FSTAT)?;
        let full = Self::follow(&st, full)?;
        let ino = st.nodes.keys().position(|k| *k == full).unwrap_or(0) as u64 + 1;
        let (mode, size) = match st.nodes.get(&full) {
            Some(Node::Dir) => (libc::S_IFDIR as u32 | 0o755, 0),
            Some(Node::File(data)) => (libc::S_IFREG as u32 | 0o644, data.len() as i64),
            Some(Node::Socket) => (libc::S_IFSOCK as u32 | 0o777, 0),
            Some(Node::Symlink(_)) | None => return Err(err(libc::ENOENT)),
        };
        Ok(FileStat {
            dev: 1,
            ino,
            mode,
            nlink: 1,
            size,
        })
    }

    fn mkdir_at(&self, base: BaseDir, path: &str, _mode: u32) -> io::Result<()> {
        let mut st = self.state.borrow_mut();
        let full = self.locate(&st, base, path, CapRights::LOOKUP | CapRights::MKDIRAT)?;
        if st.nodes.contains_key(&full) {
            return Err(err(libc::EEXIST));
        }
        if !matches!(st.nodes.get(parent(&full)), Some(Node::Dir)) {
            return Err(err(libc::ENOENT));
        }
        st.nodes.insert(full, Node::Dir);
        Ok(())
    }

    fn unlink_at(&self, base: BaseDir, path: &str) -> io::Result<()> {
        let mut st = self.state.borrow_mut();
        let full = self.locate(&st, base, path, CapRights::LOOKUP)?;
        match st.nodes.get(&full) {
            Some(Node::Dir) => Err(err(libc::EPERM)),
            Some(_) => {
                st.nodes.remove(&full);
                Ok(())
            }
            None => Err(err(libc::ENOENT)),
        }
    }

    fn connect_unix_at(&self, base: BaseDir, socket: RawFd, path: &str) -> io::Result<()> {
        let mut st = self.state.borrow_mut();
        let full = self.locate(&st, base, path, CapRights::LOOKUP | CapRights::CONNECTAT)?;
        match st.nodes.get(&full) {
            Some(Node::Socket) => {
                st.connections.push((socket, full));
                Ok(())
            }
            Some(_) => Err(err(libc::ECONNREFUSED)),
            None => Err(err(libc::ENOENT)),
        }
    }
}
