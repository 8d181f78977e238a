// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Error taxonomy for the virtual memory manager
//! OWNERS: @kernel-mm-team
//! PUBLIC API: VmError, SwapError, ConfigError, Result
//! DEPENDS_ON: thiserror, toml (parse errors)
//! INVARIANTS: Contract violations panic and never appear here; exhaustion blocks instead of failing

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Pid;
use crate::vm::section::LayoutError;

/// Result alias used by the VM manager.
pub type Result<T> = core::result::Result<T, VmError>;

/// Errors surfaced by the VM manager to its callers.
///
/// Kernel-side copies never fail on protection: a write to a read-only page
/// is a short transfer, and running out of unpinned frames is a blocking
/// condition. The address variants are raised only by the processor model.
#[derive(Debug, Error)]
pub enum VmError {
    /// The swap backing store failed; the affected fault was aborted.
    #[error("swap failure: {0}")]
    Swap(#[from] SwapError),
    /// Kernel configuration was rejected.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// The process is not (or no longer) registered with the kernel.
    #[error("unknown process {0}")]
    UnknownProcess(Pid),
    /// Executable sections could not be arranged into an address space.
    #[error("bad layout: {0}")]
    Layout(#[from] LayoutError),
    /// User code touched an address outside its address space.
    #[error("{pid}: address {vaddr:#x} outside the address space")]
    BadAddress {
        /// Faulting process.
        pid: Pid,
        /// Faulting virtual address.
        vaddr: usize,
    },
    /// User code wrote through a read-only translation.
    #[error("{pid}: write to read-only address {vaddr:#x}")]
    Protection {
        /// Faulting process.
        pid: Pid,
        /// Faulting virtual address.
        vaddr: usize,
    },
}

/// Failures of the swap backing store.
#[derive(Debug, Error)]
pub enum SwapError {
    /// Underlying storage reported an I/O error.
    #[error("backing store i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Fewer bytes than a full page were transferred.
    #[error("short transfer on slot {slot}: {transferred} of {expected} bytes")]
    ShortTransfer {
        /// Slot being accessed.
        slot: usize,
        /// Bytes actually moved.
        transferred: usize,
        /// Page size.
        expected: usize,
    },
    /// The slot index lies beyond the end of the store.
    #[error("swap slot {slot} out of range (store holds {len} pages)")]
    OutOfRange {
        /// Slot being accessed.
        slot: usize,
        /// Current store length in pages.
        len: usize,
    },
    /// The store has already been destroyed by kernel shutdown.
    #[error("backing store closed")]
    Closed,
}

/// Errors produced while loading or validating a [`crate::VmConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The TOML document is malformed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A field holds a value the kernel cannot run with.
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}
