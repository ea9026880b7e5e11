// CLASSIFICATION: COMMUNITY
// Filename: error.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Error type shared by the registry, the query cache and the manifest loader.

use std::io;

use thiserror::Error;

use crate::rights::ResourceClass;

/// Errors produced while preparing the shim during the unrestricted phase.
///
/// Runtime adapters never surface this type; they report plain
/// [`io::Error`] values so callers see the same codes the live calls use.
#[derive(Debug, Error)]
pub enum CapshimError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to limit {path} to {class:?} rights: {source}")]
    Rights {
        path: String,
        class: ResourceClass,
        #[source]
        source: io::Error,
    },
    #[error("sysctl name {name:?} has no MIB: {source}")]
    NameToMib {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("sysctl {mib:?} failed: {source}")]
    Sysctl {
        mib: Vec<i32>,
        #[source]
        source: io::Error,
    },
    #[error("empty sysctl MIB")]
    EmptyMib,
    #[error("devname lookup for dev {dev:#x} type {kind:#o} failed: {source}")]
    Devname {
        dev: u64,
        kind: u32,
        #[source]
        source: io::Error,
    },
    #[error("invalid preopen manifest: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("failed to read manifest {path}: {source}")]
    ManifestIo {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("a capshim context is already installed")]
    AlreadyInstalled,
}

/// Result alias for shim setup operations.
pub type CapshimResult<T> = Result<T, CapshimError>;
