// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Kernel-wide VM state: frames, inverted table, TLB, swap and process registry
//! OWNERS: @kernel-mm-team
//! PUBLIC API: VmKernel (new/with_store/spawn/spawn_image/process/switch_to/audit/stats/terminate),
//!             VmStats, AuditError
//! DEPENDS_ON: sync::{Lock, Condition}, vm::*, machine::*, log, rand, static_assertions
//! INVARIANTS: Every page-table, frame-table and TLB mutation happens under the page lock;
//!             the swap lock nests inside the page lock; waiters for frames sleep on one condition

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use static_assertions::assert_impl_all;
use thiserror::Error;

use crate::config::{SwapBacking, VmConfig};
use crate::error::{ConfigError, Result, VmError};
use crate::machine::{Interrupt, PhysicalMemory, Tlb};
use crate::process::VmProcess;
use crate::sync::{Condition, Lock};
use crate::types::{Pid, Ppn, SwapSlot, Vpn};
use crate::vm::frames::{FrameOwner, FrameTable};
use crate::vm::page_table::PageTable;
use crate::vm::section::{ExecutableSection, ProcessLayout};
use crate::vm::swap::{BackingStore, FileBackingStore, MemBackingStore, SwapManager};
use crate::vm::tlb_sync;
use crate::vm::translation::TranslationEntry;

/// Event counters, readable at any time through [`VmKernel::stats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VmStats {
    /// Faults on non-resident pages.
    pub page_faults: u64,
    /// Pages restored from swap.
    pub swap_ins: u64,
    /// Dirty pages written to swap.
    pub swap_outs: u64,
    /// Frames reclaimed by the clock.
    pub evictions: u64,
    /// Pages loaded from an executable section.
    pub section_loads: u64,
    /// Pages filled with zeroes.
    pub zero_fills: u64,
    /// Hardware TLB misses serviced.
    pub tlb_misses: u64,
    /// TLB slots loaded by software.
    pub tlb_refills: u64,
    /// Scheduler switches between processes.
    pub context_switches: u64,
    /// Times a fault slept because every frame was pinned.
    pub blocked_waits: u64,
}

/// Inconsistency found by [`VmKernel::audit`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    /// A frame is on the free list and registered at once.
    #[error("frame {ppn} is free but registered to {owner:?}")]
    FreeAndOwned {
        /// Offending frame.
        ppn: Ppn,
        /// Recorded owner.
        owner: FrameOwner,
    },
    /// A frame is neither free nor registered.
    #[error("frame {ppn} is neither free nor registered")]
    Leaked {
        /// Offending frame.
        ppn: Ppn,
    },
    /// The inverted table names a page that does not map the frame back.
    #[error("frame {ppn} registered to {owner:?}, which does not map it")]
    StaleOwner {
        /// Offending frame.
        ppn: Ppn,
        /// Recorded owner.
        owner: FrameOwner,
    },
    /// A resident page is missing from the inverted table.
    #[error("{pid} vpn {vpn} maps frame {ppn} without being registered")]
    Unregistered {
        /// Owning process.
        pid: Pid,
        /// Resident page.
        vpn: Vpn,
        /// Frame it maps.
        ppn: Ppn,
    },
    /// A page is resident and also holds a swap slot.
    #[error("{pid} vpn {vpn} is resident and swapped at once")]
    ResidentAndSwapped {
        /// Owning process.
        pid: Pid,
        /// Offending page.
        vpn: Vpn,
    },
    /// A pinned frame backs no page.
    #[error("frame {ppn} is pinned but unregistered")]
    PinnedUnowned {
        /// Offending frame.
        ppn: Ppn,
    },
    /// A valid TLB slot disagrees with the scheduled process's page table.
    #[error("tlb slot {slot} translates vpn {vpn} to a frame the page table does not map")]
    StaleTlb {
        /// Slot index.
        slot: usize,
        /// Page the slot translates.
        vpn: Vpn,
    },
}

pub(crate) struct ProcessState {
    pub(crate) layout: ProcessLayout,
    pub(crate) page_table: PageTable,
    pub(crate) swap_slots: BTreeMap<Vpn, SwapSlot>,
    pub(crate) tlb_shadow: Vec<TranslationEntry>,
}

impl ProcessState {
    fn new(layout: ProcessLayout) -> Self {
        let page_table = PageTable::new(layout.page_count());
        Self { layout, page_table, swap_slots: BTreeMap::new(), tlb_shadow: Vec::new() }
    }
}

/// Everything protected by the page lock.
pub(crate) struct VmState {
    pub(crate) memory: PhysicalMemory,
    pub(crate) tlb: Tlb,
    pub(crate) tlb_rng: StdRng,
    pub(crate) frames: FrameTable,
    pub(crate) processes: BTreeMap<Pid, ProcessState>,
    pub(crate) current: Option<Pid>,
    pub(crate) stats: VmStats,
    next_pid: Pid,
}

impl VmState {
    fn new(config: &VmConfig) -> Self {
        Self {
            memory: PhysicalMemory::new(config.page_size, config.phys_pages),
            tlb: Tlb::new(config.tlb_size),
            tlb_rng: StdRng::seed_from_u64(config.tlb_seed),
            frames: FrameTable::new(config.phys_pages),
            processes: BTreeMap::new(),
            current: None,
            stats: VmStats::default(),
            next_pid: Pid::from_raw(1),
        }
    }

    pub(crate) fn process(&self, pid: Pid) -> Result<&ProcessState> {
        self.processes.get(&pid).ok_or(VmError::UnknownProcess(pid))
    }

    pub(crate) fn process_mut(&mut self, pid: Pid) -> Result<&mut ProcessState> {
        self.processes.get_mut(&pid).ok_or(VmError::UnknownProcess(pid))
    }

    /// Loads the translation for `vpn` into the TLB when `pid` is scheduled.
    pub(crate) fn refill_tlb(&mut self, pid: Pid, vpn: Vpn) {
        if self.current != Some(pid) {
            return;
        }
        let Some(process) = self.processes.get_mut(&pid) else {
            return;
        };
        tlb_sync::install(&mut self.tlb, &mut self.tlb_rng, &mut process.page_table, vpn);
        self.stats.tlb_refills += 1;
    }

    fn audit(&self) -> core::result::Result<(), AuditError> {
        for ppn in 0..self.frames.frame_count() {
            match (self.frames.is_free(ppn), self.frames.owner(ppn)) {
                (true, Some(owner)) => return Err(AuditError::FreeAndOwned { ppn, owner }),
                (false, None) => return Err(AuditError::Leaked { ppn }),
                (false, Some(owner)) => {
                    let maps_back = self.processes.get(&owner.pid).is_some_and(|process| {
                        process.page_table.contains(owner.vpn) && {
                            let entry = process.page_table.entry(owner.vpn);
                            entry.valid() && entry.ppn == ppn
                        }
                    });
                    if !maps_back {
                        return Err(AuditError::StaleOwner { ppn, owner });
                    }
                }
                (true, None) => {}
            }
            if self.frames.is_pinned(ppn) && self.frames.owner(ppn).is_none() {
                return Err(AuditError::PinnedUnowned { ppn });
            }
        }
        for (&pid, process) in &self.processes {
            for (vpn, ppn) in process.page_table.resident() {
                if self.frames.owner(ppn) != Some(FrameOwner { pid, vpn }) {
                    return Err(AuditError::Unregistered { pid, vpn, ppn });
                }
            }
            for &vpn in process.swap_slots.keys() {
                if process.page_table.entry(vpn).valid() {
                    return Err(AuditError::ResidentAndSwapped { pid, vpn });
                }
            }
        }
        let current = self.current.and_then(|pid| self.processes.get(&pid));
        for slot in 0..self.tlb.size() {
            let hw = self.tlb.read_entry(slot);
            if !hw.valid() {
                continue;
            }
            let mirrored = current.is_some_and(|process| {
                process.page_table.contains(hw.vpn) && {
                    let entry = process.page_table.entry(hw.vpn);
                    entry.valid() && entry.ppn == hw.ppn
                }
            });
            if !mirrored {
                return Err(AuditError::StaleTlb { slot, vpn: hw.vpn });
            }
        }
        Ok(())
    }
}

/// The virtual memory manager of one simulated machine.
///
/// Processes are created through [`VmKernel::spawn`] and share the kernel
/// through an [`Arc`].
pub struct VmKernel {
    pub(crate) config: VmConfig,
    pub(crate) state: Lock<VmState>,
    /// Signalled whenever a frame is unpinned or returned to the free list.
    pub(crate) frame_freed: Condition,
    pub(crate) swap: SwapManager,
}

assert_impl_all!(VmKernel: Send, Sync);

impl VmKernel {
    /// Builds a kernel with the swap backing named by `config.swap`.
    pub fn new(config: VmConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let store: Box<dyn BackingStore> = match &config.swap {
            SwapBacking::Memory => Box::new(MemBackingStore::new(config.page_size)),
            SwapBacking::File { path } => Box::new(FileBackingStore::create(path, config.page_size)?),
        };
        Self::with_store(config, store)
    }

    /// Builds a kernel on top of a caller-provided backing store.
    pub fn with_store(config: VmConfig, store: Box<dyn BackingStore>) -> Result<Arc<Self>> {
        config.validate()?;
        if store.page_size() != config.page_size {
            return Err(ConfigError::Invalid("backing store page size differs from page_size").into());
        }
        let state = Lock::new(VmState::new(&config));
        let frame_freed = Condition::new(&state, Arc::new(Interrupt::new()));
        info!(
            target: "vmm::kernel",
            "vm up: {} frames x {} bytes, {} tlb slots",
            config.phys_pages,
            config.page_size,
            config.tlb_size
        );
        Ok(Arc::new(Self { config, state, frame_freed, swap: SwapManager::new(store) }))
    }

    /// Active configuration.
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Bytes per page.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    /// Registers a new process with an empty (all-invalid) page table.
    pub fn spawn(self: &Arc<Self>, layout: ProcessLayout) -> VmProcess {
        let mut state = self.state.acquire();
        let pid = state.next_pid;
        state.next_pid = pid.next();
        info!(target: "vmm::kernel", "{pid}: spawned with {} pages", layout.page_count());
        state.processes.insert(pid, ProcessState::new(layout));
        VmProcess::new(Arc::clone(self), pid)
    }

    /// Spawns a process from executable sections plus the configured stack.
    pub fn spawn_image(self: &Arc<Self>, sections: Vec<Arc<dyn ExecutableSection>>) -> Result<VmProcess> {
        let layout =
            ProcessLayout::from_sections(sections, self.config.page_size, self.config.stack_pages)?;
        Ok(self.spawn(layout))
    }

    /// Handle to an already spawned process.
    pub fn process(self: &Arc<Self>, pid: Pid) -> Result<VmProcess> {
        self.state.acquire().process(pid)?;
        Ok(VmProcess::new(Arc::clone(self), pid))
    }

    /// Schedules `next` (or nothing), saving the outgoing process's TLB state.
    ///
    /// The incoming process starts with an empty TLB and refills on demand.
    pub fn switch_to(&self, next: Option<Pid>) -> Result<()> {
        let mut state = self.state.acquire();
        if let Some(pid) = next {
            state.process(pid)?;
        }
        if state.current == next {
            return Ok(());
        }
        let st = &mut *state;
        if let Some(process) = st.current.and_then(|prev| st.processes.get_mut(&prev)) {
            process.tlb_shadow = tlb_sync::save_state(&mut st.tlb, &mut process.page_table);
        }
        tlb_sync::flush(&mut st.tlb);
        debug!(target: "vmm::kernel", "switch {:?} -> {:?}", st.current, next);
        st.current = next;
        st.stats.context_switches += 1;
        Ok(())
    }

    /// Currently scheduled process.
    pub fn current(&self) -> Option<Pid> {
        self.state.acquire().current
    }

    /// Snapshot of the event counters.
    pub fn stats(&self) -> VmStats {
        self.state.acquire().stats
    }

    /// Frame the clock hand examines first on the next eviction.
    pub fn clock_cursor(&self) -> Ppn {
        self.state.acquire().frames.cursor()
    }

    /// Frames on the free list.
    pub fn free_frames(&self) -> usize {
        self.state.acquire().frames.free_count()
    }

    /// Page backed by frame `ppn`, if any.
    pub fn frame_owner(&self, ppn: Ppn) -> Option<FrameOwner> {
        self.state.acquire().frames.owner(ppn)
    }

    /// Swap slots currently holding an evicted page.
    pub fn swap_slots_in_use(&self) -> usize {
        self.swap.slots_in_use()
    }

    /// Pages the swap area has grown to.
    pub fn swap_size_pages(&self) -> usize {
        self.swap.size_pages()
    }

    /// Threads asleep waiting for an unpinned frame.
    pub fn frame_waiters(&self) -> usize {
        self.frame_freed.waiters()
    }

    /// Cross-checks the frame table, page tables, swap maps and TLB.
    pub fn audit(&self) -> core::result::Result<(), AuditError> {
        self.state.acquire().audit()
    }

    /// Shuts the swap area down and releases its storage.
    pub fn terminate(&self) -> Result<()> {
        let _state = self.state.acquire();
        self.swap.close()?;
        info!(target: "vmm::kernel", "vm terminated");
        Ok(())
    }
}
