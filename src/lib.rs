// CLASSIFICATION: COMMUNITY
// Filename: lib.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Capsicum companion library.
//!
//! Once a process calls `cap_enter(2)` it may only use descriptors it already
//! holds: `open("/dev/dri/card0")`, `sysctl` and `devname` stop working.
//! This crate lets the process prepare for that while still unrestricted:
//!
//! * directories and files are preopened and limited to a
//!   [`ResourceClass`] worth of rights ([`Capshim::preopen_dir`],
//!   [`Capshim::preopen_file`]);
//! * absolute paths are later rewritten to a preopened handle plus a
//!   relative path ([`Capshim::resolve`]), following device symlinks;
//! * sysctl and devname answers are cached up front and served once the
//!   live query is refused.

/// Error type for the preparation phase.
pub mod error;

/// Resource classes and the Capsicum rights each keeps.
pub mod rights;

/// The injected system-call surface.
pub mod sys;

/// Preopened directory and file handles.
pub mod registry;

/// Absolute path redirection.
pub mod resolve;

/// Cached sysctl and devname answers.
pub mod cache;

/// sysctl/devname interception.
pub mod query;

/// open/stat/mkdir/unlink/connect adapters.
pub mod fsops;

/// Runtime knobs and preopen manifests.
pub mod config;

/// The per-process context.
pub mod shim;

/// Process-wide context slot.
pub mod global;

/// In-memory system backend for tests.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::{DeviceKey, QueryCache};
pub use config::{ManifestReport, PreopenManifest, ShimConfig};
pub use error::{CapshimError, CapshimResult};
pub use registry::HandleRegistry;
pub use resolve::Resolution;
pub use rights::{CapRights, FcntlRights, ResourceClass};
pub use shim::Capshim;
pub use sys::{BaseDir, FileStat, HostSystem, SystemCalls};
