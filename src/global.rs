// CLASSIFICATION: COMMUNITY
// Filename: global.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Install-once slot for the process's context.
//!
//! Symbol-level interception glue has no way to receive a reference, so the
//! finished context is parked here after start-up. Installing freezes it:
//! only shared references come back out.

use log::{info, warn};
use once_cell::sync::OnceCell;

use crate::error::{CapshimError, CapshimResult};
use crate::shim::Capshim;
use crate::sys::HostSystem;

static SHIM: OnceCell<Capshim<HostSystem>> = OnceCell::new();

/// Publish `shim` for the rest of the process lifetime.
pub fn install(shim: Capshim<HostSystem>) -> CapshimResult<&'static Capshim<HostSystem>> {
    let dirs = shim.registry().dir_count();
    let files = shim.registry().file_count();
    if SHIM.set(shim).is_err() {
        warn!("capshim context already installed; keeping the first one");
        return Err(CapshimError::AlreadyInstalled);
    }
    info!("capshim installed ({} dirs, {} files)", dirs, files);
    SHIM.get().ok_or(CapshimError::AlreadyInstalled)
}

/// The installed context, if start-up got that far.
pub fn get() -> Option<&'static Capshim<HostSystem>> {
    SHIM.get()
}
