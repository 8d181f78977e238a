// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Frame acquisition and second-chance (clock) eviction
//! OWNERS: @kernel-mm-team
//! PUBLIC API: crate-internal (VmKernel::obtain_frame)
//! DEPENDS_ON: vm::frames, vm::swap, vm::tlb_sync, sync::Condition, log
//! INVARIANTS: Pinned frames are never chosen; a victim's used/dirty bits are merged before inspection;
//!             a dirty victim reaches swap before its entry is invalidated

use log::{debug, error, warn};

use crate::error::Result;
use crate::kernel::{VmKernel, VmState};
use crate::sync::LockGuard;
use crate::types::Ppn;
use crate::vm::frames::FrameOwner;
use crate::vm::tlb_sync;

impl VmState {
    /// Sweeps the clock hand until an unpinned frame with a clear used bit turns up.
    ///
    /// Used bits are cleared along the way, so two full sweeps always find a
    /// victim unless every registered frame is pinned.
    pub(crate) fn select_victim(&mut self) -> Option<(Ppn, FrameOwner)> {
        if let Some(process) = self.current.and_then(|pid| self.processes.get_mut(&pid)) {
            tlb_sync::merge_all(&self.tlb, &mut process.page_table);
        }
        let frames = self.frames.frame_count();
        let start = self.frames.cursor();
        for step in 0..2 * frames {
            let ppn = (start + step) % frames;
            if self.frames.is_pinned(ppn) {
                continue;
            }
            let Some(owner) = self.frames.owner(ppn) else {
                continue;
            };
            let Some(process) = self.processes.get_mut(&owner.pid) else {
                panic!("frame {ppn} registered to unknown {}", owner.pid);
            };
            let entry = process.page_table.entry_mut(owner.vpn);
            if entry.used() {
                entry.set_used(false);
                if self.current == Some(owner.pid) {
                    tlb_sync::clear_used(&mut self.tlb, owner.vpn);
                }
                continue;
            }
            self.frames.advance_past(ppn);
            return Some((ppn, owner));
        }
        None
    }
}

impl VmKernel {
    /// Returns a frame that is neither free nor registered, ready to be filled.
    ///
    /// Takes the free list head when possible, otherwise evicts. Sleeps on
    /// the frame condition while every frame is pinned.
    pub(crate) fn obtain_frame(&self, state: &mut LockGuard<'_, VmState>) -> Result<Ppn> {
        loop {
            if let Some(ppn) = state.frames.allocate() {
                return Ok(ppn);
            }
            if !state.frames.all_pinned() {
                if let Some((ppn, owner)) = state.select_victim() {
                    return self.evict(state, ppn, owner);
                }
            }
            warn!(target: "vmm::clock", "all {} frames pinned; waiting", state.frames.frame_count());
            state.stats.blocked_waits += 1;
            self.frame_freed.wait(state);
        }
    }

    fn evict(&self, state: &mut VmState, ppn: Ppn, owner: FrameOwner) -> Result<Ppn> {
        let FrameOwner { pid, vpn } = owner;
        let scheduled = state.current == Some(pid);
        let VmState { memory, tlb, processes, frames, stats, .. } = state;
        let Some(process) = processes.get_mut(&pid) else {
            panic!("victim frame {ppn} registered to unknown {pid}");
        };
        if scheduled {
            tlb_sync::purge(tlb, &mut process.page_table, vpn);
        }
        if process.page_table.entry(vpn).dirty() {
            let slot = self.swap.allocate_slot()?;
            if let Err(err) = self.swap.write(slot, memory.frame(ppn)) {
                self.swap.release_slot(slot);
                error!(target: "vmm::swap", "{pid}: swap-out of vpn {vpn} failed: {err}");
                return Err(err.into());
            }
            let previous = process.swap_slots.insert(vpn, slot);
            assert!(previous.is_none(), "{pid}: vpn {vpn} swapped out twice");
            stats.swap_outs += 1;
            debug!(target: "vmm::swap", "{pid}: vpn {vpn} -> slot {slot}");
        }
        process.page_table.invalidate(vpn);
        frames.unregister(ppn);
        stats.evictions += 1;
        debug!(target: "vmm::clock", "evicted {pid} vpn {vpn} from frame {ppn}");
        Ok(ppn)
    }
}
