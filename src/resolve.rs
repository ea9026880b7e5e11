// CLASSIFICATION: COMMUNITY
// Filename: resolve.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Absolute path to (directory handle, relative path) redirection.
//!
//! Capability mode refuses lookups by absolute path, but every preopened
//! directory can still be searched with the `*at` calls. [`resolve`] picks
//! the registered directory covering a path and hands back the remainder.
//! Device trees like `/dev/dri/card0 -> ../drm/0` are followed one symlink
//! hop per step, using nothing but the handles already in the registry.

use std::os::unix::io::RawFd;

use log::{debug, warn};

use crate::registry::HandleRegistry;
use crate::sys::{BaseDir, SystemCalls};

/// Where an absolute path should be looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Directory the lookup starts from.
    pub base: BaseDir,
    /// Path relative to `base`.
    pub relpath: String,
}

impl Resolution {
    /// No registered directory covers `path`: use it unchanged.
    pub fn passthrough(path: &str) -> Self {
        Self {
            base: BaseDir::Cwd,
            relpath: path.to_string(),
        }
    }

    /// True when the lookup goes through a preopened handle.
    pub fn is_redirected(&self) -> bool {
        self.base.is_redirected()
    }
}

/// Resolve `path` against the registered directories.
///
/// Symlinks are followed at most `max_hops` times; past that the path is
/// treated as unregistered.
pub fn resolve<S>(registry: &HandleRegistry, sys: &S, path: &str, max_hops: usize) -> Resolution
where
    S: SystemCalls + ?Sized,
{
    match resolve_step(registry, sys, path, max_hops) {
        Some(res) => res,
        None => {
            warn!("{}: more than {} symlink hops, not redirecting", path, max_hops);
            Resolution::passthrough(path)
        }
    }
}

/// One resolution step. `None` means the hop budget ran out.
fn resolve_step<S>(registry: &HandleRegistry, sys: &S, path: &str, hops_left: usize) -> Option<Resolution>
where
    S: SystemCalls + ?Sized,
{
    // preopened directories may be reopened as themselves (mesa on /dev/dri)
    if let Some(fd) = registry.dir_handle(path) {
        debug!("{} is preopened as fd {}", path, fd);
        return Some(Resolution {
            base: BaseDir::Handle(fd),
            relpath: ".".into(),
        });
    }

    let Some((dir, fd, rest)) = longest_prefix(registry, path) else {
        debug!("{} is not under any preopened directory", path);
        return Some(Resolution::passthrough(path));
    };
    let relpath = match rest.trim_start_matches('/') {
        "" => ".",
        rel => rel,
    };

    let target = match sys.read_link_at(BaseDir::Handle(fd), relpath) {
        Ok(target) => target,
        Err(_) => {
            debug!("{} -> fd {} ({}) + {}", path, fd, dir, relpath);
            return Some(Resolution {
                base: BaseDir::Handle(fd),
                relpath: relpath.to_string(),
            });
        }
    };
    if hops_left == 0 {
        return None;
    }

    let next = link_destination(dir, relpath, &target);
    debug!("{} is a symlink to {}, continuing at {}", path, target, next);
    resolve_step(registry, sys, &next, hops_left - 1)
}

/// Longest registered directory that is a whole-segment prefix of `path`.
fn longest_prefix<'p>(registry: &HandleRegistry, path: &'p str) -> Option<(String, RawFd, &'p str)> {
    registry
        .dirs()
        .filter_map(|(dir, fd)| {
            let rest = if dir.ends_with('/') {
                path.strip_prefix(dir)?
            } else {
                path.strip_prefix(dir)?.strip_prefix('/')?
            };
            Some((dir, fd, rest))
        })
        .max_by_key(|(dir, _, _)| dir.len())
        .map(|(dir, fd, rest)| (dir.to_string(), fd, rest))
}

/// Absolute path a symlink at `relpath` under registered directory `dir`
/// leads to.
///
/// A `..` target climbs one level from `dir` itself; other relative targets
/// are taken relative to the directory holding the link.
fn link_destination(dir: String, relpath: &str, target: &str) -> String {
    if let Some(rest) = target.strip_prefix("..") {
        let parent = match dir.rfind('/') {
            Some(idx) => &dir[..idx],
            None => "",
        };
        let joined = format!("{}{}", parent, rest);
        if joined.is_empty() {
            "/".into()
        } else {
            joined
        }
    } else if target.starts_with('/') {
        target.to_string()
    } else {
        let mut base = dir;
        if let Some(idx) = relpath.rfind('/') {
            if !base.ends_with('/') {
                base.push('/');
            }
            base.push_str(&relpath[..idx]);
        }
        if base.ends_with('/') {
            format!("{}{}", base, target)
        } else {
            format!("{}/{}", base, target)
        }
    }
}
