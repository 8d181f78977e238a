// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

//! CONTEXT: Host-first demand-paging virtual memory manager for a simulated single-CPU machine
//! OWNERS: @kernel-mm-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests per module; integration tests under tests/ (clock, swap, tlb, concurrency, proptest)
//! PUBLIC API: VmKernel, VmProcess, PinnedPage, VmConfig, VmStats, AuditError, VmError, ProcessLayout,
//!             ExecutableSection, ImageSection, BackingStore, Lock, Condition
//! DEPENDS_ON: parking_lot, thiserror, log, serde/toml, bitflags, rand, static_assertions
//! INVARIANTS: Pages load lazily on first touch; a frame backs at most one (pid, vpn);
//!             dirty pages reach swap before their frame is reused; pinned frames are never evicted
//!
//! Notes:
//! - Page tables start all-invalid. A fault fills a frame from swap, then
//!   from the executable section, then with zeroes.
//! - Frame reclaim uses a second-chance clock over the inverted page table.
//! - The TLB is software-refilled; its used/dirty bits are merged back into
//!   the page table before any slot is dropped.

pub mod config;
pub mod error;
pub mod machine;
pub mod sync;
pub mod types;
pub mod vm;

mod kernel;
mod process;

pub use config::{SwapBacking, VmConfig};
pub use error::{ConfigError, Result, SwapError, VmError};
pub use kernel::{AuditError, VmKernel, VmStats};
pub use process::{PinnedPage, VmProcess};
pub use types::{Pid, Ppn, SwapSlot, Vpn};
pub use vm::{
    BackingStore, EntryFlags, ExecutableSection, FileBackingStore, FrameOwner, ImageSection,
    LayoutError, MemBackingStore, ProcessLayout, TranslationEntry,
};
