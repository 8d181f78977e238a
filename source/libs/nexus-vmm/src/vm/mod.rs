// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Paging machinery: translation entries, page tables, frames, swap, TLB sync, faults, clock
//! OWNERS: @kernel-mm-team
//! PUBLIC API: TranslationEntry, EntryFlags, PageTable, FrameTable, FrameOwner, SwapManager,
//!             BackingStore, MemBackingStore, FileBackingStore, ExecutableSection, ImageSection,
//!             ProcessLayout, LayoutError
//! DEPENDS_ON: machine, sync

mod clock;
mod fault;
pub mod frames;
pub mod page_table;
pub mod section;
pub mod swap;
pub mod tlb_sync;
pub mod translation;

pub use frames::{FrameOwner, FrameTable};
pub use page_table::PageTable;
pub use section::{ExecutableSection, ImageSection, LayoutError, ProcessLayout};
pub use swap::{BackingStore, FileBackingStore, MemBackingStore, SwapManager};
pub use translation::{EntryFlags, TranslationEntry};
