// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Page-fault service: obtain a frame, fill it, map it
//! OWNERS: @kernel-mm-team
//! PUBLIC API: crate-internal (VmKernel::resident_frame/handle_page_fault)
//! DEPENDS_ON: vm::clock, vm::swap, vm::section, log
//! INVARIANTS: Fill order is swap, then executable section, then zeroes;
//!             the frame stays pinned from acquisition until it is mapped;
//!             an aborted fault returns its frame to the free list

use log::{debug, error};

use crate::error::{Result, VmError};
use crate::kernel::{VmKernel, VmState};
use crate::sync::LockGuard;
use crate::types::{Pid, Ppn, Vpn};
use crate::vm::frames::FrameOwner;
use crate::vm::translation::{EntryFlags, TranslationEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fill {
    Swap,
    Section,
    Zero,
}

impl VmKernel {
    /// Frame backing `vpn`, faulting it in first when needed.
    pub(crate) fn resident_frame(
        &self,
        state: &mut LockGuard<'_, VmState>,
        pid: Pid,
        vpn: Vpn,
    ) -> Result<Ppn> {
        let entry = *state.process(pid)?.page_table.entry(vpn);
        if entry.valid() {
            return Ok(entry.ppn);
        }
        self.handle_page_fault(state, pid, vpn)
    }

    /// Makes `vpn` resident for `pid` and returns its frame.
    pub(crate) fn handle_page_fault(
        &self,
        state: &mut LockGuard<'_, VmState>,
        pid: Pid,
        vpn: Vpn,
    ) -> Result<Ppn> {
        state.stats.page_faults += 1;
        let ppn = self.obtain_frame(state)?;

        // obtain_frame may have slept with the lock released.
        let raced = match state.processes.get(&pid) {
            None => Some(Err(VmError::UnknownProcess(pid))),
            Some(process) if process.page_table.entry(vpn).valid() => {
                Some(Ok(process.page_table.entry(vpn).ppn))
            }
            Some(_) => None,
        };
        if let Some(outcome) = raced {
            state.frames.release(ppn);
            self.frame_freed.signal(state);
            return outcome;
        }

        state.frames.pin(ppn);
        let fill = match self.fill_frame(state, pid, vpn, ppn) {
            Ok(fill) => fill,
            Err(err) => {
                error!(target: "vmm::fault", "{pid}: fault on vpn {vpn} aborted: {err}");
                state.frames.unpin(ppn);
                state.frames.release(ppn);
                self.frame_freed.signal(state);
                return Err(err);
            }
        };

        let st: &mut VmState = &mut **state;
        let process = st.process_mut(pid)?;
        let read_only = process.layout.section_for(vpn).is_some_and(|section| section.is_read_only());
        let mut flags = EntryFlags::VALID;
        flags.set(EntryFlags::READ_ONLY, read_only);
        flags.set(EntryFlags::DIRTY, fill == Fill::Swap);
        process.page_table.set(vpn, TranslationEntry { vpn, ppn, flags });
        st.frames.register(ppn, FrameOwner { pid, vpn });
        st.refill_tlb(pid, vpn);
        st.frames.unpin(ppn);
        debug!(target: "vmm::fault", "{pid}: vpn {vpn} -> frame {ppn} ({fill:?})");
        self.frame_freed.signal(state);
        Ok(ppn)
    }

    fn fill_frame(&self, state: &mut VmState, pid: Pid, vpn: Vpn, ppn: Ppn) -> Result<Fill> {
        let VmState { memory, processes, stats, .. } = state;
        let process = processes.get_mut(&pid).ok_or(VmError::UnknownProcess(pid))?;
        let frame = memory.frame_mut(ppn);
        if let Some(&slot) = process.swap_slots.get(&vpn) {
            self.swap.read(slot, frame)?;
            process.swap_slots.remove(&vpn);
            self.swap.release_slot(slot);
            stats.swap_ins += 1;
            return Ok(Fill::Swap);
        }
        match process.layout.section_for(vpn) {
            Some(section) => {
                section.load_page(vpn - section.first_vpn(), frame);
                stats.section_loads += 1;
                Ok(Fill::Section)
            }
            None => {
                frame.fill(0);
                stats.zero_fills += 1;
                Ok(Fill::Zero)
            }
        }
    }
}
