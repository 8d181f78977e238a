// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Per-process view of the VM manager: user-memory copies, TLB misses, pinning, teardown
//! OWNERS: @kernel-mm-team
//! PUBLIC API: VmProcess (read_virtual_memory/write_virtual_memory/handle_tlb_miss/access/pin_page/unload),
//!             PinnedPage
//! DEPENDS_ON: kernel::VmKernel, vm::*, log, static_assertions
//! INVARIANTS: Each page of a copy is pinned while bytes move; reads set `used`, writes set `used|dirty`;
//!             a copy stops at the first read-only or out-of-range page and reports the bytes moved so far

use std::fmt;
use std::sync::Arc;

use log::{debug, info};
use static_assertions::assert_impl_all;

use crate::error::{Result, VmError};
use crate::kernel::VmKernel;
use crate::machine::TlbFault;
use crate::types::{Pid, Ppn, Vpn};
use crate::vm::tlb_sync;
use crate::vm::translation::TranslationEntry;

/// Handle to one process's address space.
///
/// Clones share the same process; every thread of the process may hold one.
#[derive(Clone)]
pub struct VmProcess {
    kernel: Arc<VmKernel>,
    pid: Pid,
}

assert_impl_all!(VmProcess: Send, Sync);

impl fmt::Debug for VmProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmProcess").field("pid", &self.pid).finish()
    }
}

impl VmProcess {
    pub(crate) fn new(kernel: Arc<VmKernel>, pid: Pid) -> Self {
        Self { kernel, pid }
    }

    /// Process identifier.
    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Kernel the process lives in.
    pub fn kernel(&self) -> &Arc<VmKernel> {
        &self.kernel
    }

    /// Number of virtual pages in the address space.
    pub fn page_count(&self) -> Result<usize> {
        Ok(self.kernel.state.acquire().process(self.pid)?.page_table.len())
    }

    /// Copy of the page-table entry for `vpn`.
    pub fn entry(&self, vpn: Vpn) -> Result<TranslationEntry> {
        Ok(*self.kernel.state.acquire().process(self.pid)?.page_table.entry(vpn))
    }

    /// Number of pages currently backed by a frame.
    pub fn resident_pages(&self) -> Result<usize> {
        Ok(self.kernel.state.acquire().process(self.pid)?.page_table.resident().count())
    }

    /// Number of pages currently held in swap.
    pub fn swapped_pages(&self) -> Result<usize> {
        Ok(self.kernel.state.acquire().process(self.pid)?.swap_slots.len())
    }

    /// TLB contents captured the last time the process was switched out.
    pub fn tlb_snapshot(&self) -> Result<Vec<TranslationEntry>> {
        Ok(self.kernel.state.acquire().process(self.pid)?.tlb_shadow.clone())
    }

    /// Copies user memory starting at `vaddr` into `buf`.
    ///
    /// Returns the number of bytes copied, which is short when the range
    /// runs past the end of the address space.
    pub fn read_virtual_memory(&self, vaddr: usize, buf: &mut [u8]) -> Result<usize> {
        let page_size = self.kernel.page_size();
        let mut copied = 0;
        while copied < buf.len() {
            let Some(addr) = vaddr.checked_add(copied) else {
                break;
            };
            let (vpn, offset) = (addr / page_size, addr % page_size);
            let len = (page_size - offset).min(buf.len() - copied);

            let mut state = self.kernel.state.acquire();
            if !state.process(self.pid)?.page_table.contains(vpn) {
                debug!(target: "vmm::fault", "{}: read past end at vpn {vpn}", self.pid);
                break;
            }
            let ppn = self.kernel.resident_frame(&mut state, self.pid, vpn)?;
            state.process_mut(self.pid)?.page_table.entry_mut(vpn).set_used(true);
            state.frames.pin(ppn);
            buf[copied..copied + len].copy_from_slice(&state.memory.frame(ppn)[offset..offset + len]);
            state.frames.unpin(ppn);
            self.kernel.frame_freed.signal(&state);
            copied += len;
        }
        Ok(copied)
    }

    /// Copies `data` into user memory starting at `vaddr`.
    ///
    /// Returns the number of bytes copied. The copy stops short at the first
    /// read-only page or at the end of the address space.
    pub fn write_virtual_memory(&self, vaddr: usize, data: &[u8]) -> Result<usize> {
        let page_size = self.kernel.page_size();
        let mut copied = 0;
        while copied < data.len() {
            let Some(addr) = vaddr.checked_add(copied) else {
                break;
            };
            let (vpn, offset) = (addr / page_size, addr % page_size);
            let len = (page_size - offset).min(data.len() - copied);

            let mut state = self.kernel.state.acquire();
            if !state.process(self.pid)?.page_table.contains(vpn) {
                debug!(target: "vmm::fault", "{}: write past end at vpn {vpn}", self.pid);
                break;
            }
            let ppn = self.kernel.resident_frame(&mut state, self.pid, vpn)?;
            let entry = state.process_mut(self.pid)?.page_table.entry_mut(vpn);
            if entry.read_only() {
                debug!(target: "vmm::fault", "{}: write to read-only vpn {vpn} refused", self.pid);
                break;
            }
            entry.set_used(true);
            entry.mark_dirty();
            state.frames.pin(ppn);
            state.memory.frame_mut(ppn)[offset..offset + len].copy_from_slice(&data[copied..copied + len]);
            state.frames.unpin(ppn);
            self.kernel.frame_freed.signal(&state);
            copied += len;
        }
        Ok(copied)
    }

    /// Services a hardware TLB miss on `vaddr`.
    ///
    /// # Panics
    ///
    /// When `vaddr` lies outside the address space.
    pub fn handle_tlb_miss(&self, vaddr: usize) -> Result<()> {
        let vpn = vaddr / self.kernel.page_size();
        let mut state = self.kernel.state.acquire();
        let entry = {
            let table = &state.process(self.pid)?.page_table;
            assert!(table.contains(vpn), "{}: vpn {vpn} out of range (size {})", self.pid, table.len());
            *table.entry(vpn)
        };
        state.stats.tlb_misses += 1;
        if entry.valid() {
            state.refill_tlb(self.pid, vpn);
        } else {
            self.kernel.handle_page_fault(&mut state, self.pid, vpn)?;
        }
        Ok(())
    }

    /// Executes one user-mode load (`write == false`) or store at `vaddr` and
    /// returns the physical address it resolved to.
    ///
    /// Misses are serviced and retried. Addresses outside the address space
    /// and stores to read-only pages are reported as errors.
    ///
    /// # Panics
    ///
    /// When the process is not the scheduled one.
    pub fn access(&self, vaddr: usize, write: bool) -> Result<usize> {
        let page_size = self.kernel.page_size();
        loop {
            {
                let mut state = self.kernel.state.acquire();
                assert_eq!(state.current, Some(self.pid), "{} executing while not scheduled", self.pid);
                match state.tlb.translate(vaddr, page_size, write) {
                    Ok(paddr) => return Ok(paddr),
                    Err(TlbFault::ReadOnly { vaddr }) => {
                        return Err(VmError::Protection { pid: self.pid, vaddr })
                    }
                    Err(TlbFault::Miss { .. }) => {}
                }
                if !state.process(self.pid)?.page_table.contains(vaddr / page_size) {
                    return Err(VmError::BadAddress { pid: self.pid, vaddr });
                }
            }
            self.handle_tlb_miss(vaddr)?;
        }
    }

    /// Faults in the page holding `vaddr` and keeps it resident until the
    /// returned guard is dropped.
    pub fn pin_page(&self, vaddr: usize) -> Result<PinnedPage> {
        let vpn = vaddr / self.kernel.page_size();
        let mut state = self.kernel.state.acquire();
        if !state.process(self.pid)?.page_table.contains(vpn) {
            return Err(VmError::BadAddress { pid: self.pid, vaddr });
        }
        let ppn = self.kernel.resident_frame(&mut state, self.pid, vpn)?;
        state.process_mut(self.pid)?.page_table.entry_mut(vpn).set_used(true);
        state.frames.pin(ppn);
        Ok(PinnedPage { kernel: Arc::clone(&self.kernel), pid: self.pid, vpn, ppn })
    }

    /// Tears the address space down: frames return to the free list, swap
    /// slots are released and the process is forgotten.
    ///
    /// # Panics
    ///
    /// When one of the process's frames is still pinned.
    pub fn unload(&self) -> Result<()> {
        let mut state = self.kernel.state.acquire();
        let st = &mut *state;
        let mut process = st.processes.remove(&self.pid).ok_or(VmError::UnknownProcess(self.pid))?;
        if st.current == Some(self.pid) {
            tlb_sync::flush(&mut st.tlb);
            st.current = None;
        }
        let resident = process.page_table.invalidate_all();
        for &(vpn, ppn) in &resident {
            assert!(!st.frames.is_pinned(ppn), "{}: unload with vpn {vpn} pinned in frame {ppn}", self.pid);
            st.frames.unregister(ppn);
            st.frames.release(ppn);
        }
        let swapped = process.swap_slots.len();
        for slot in process.swap_slots.into_values() {
            self.kernel.swap.release_slot(slot);
        }
        info!(
            target: "vmm::kernel",
            "{}: unloaded ({} frames, {swapped} swap slots released)",
            self.pid,
            resident.len()
        );
        self.kernel.frame_freed.broadcast(&state);
        Ok(())
    }
}

/// Keeps one page resident; dropping the guard unpins it.
pub struct PinnedPage {
    kernel: Arc<VmKernel>,
    pid: Pid,
    vpn: Vpn,
    ppn: Ppn,
}

impl PinnedPage {
    /// Owning process.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Pinned virtual page.
    pub fn vpn(&self) -> Vpn {
        self.vpn
    }

    /// Frame the page is held in.
    pub fn ppn(&self) -> Ppn {
        self.ppn
    }

    /// Copy of the frame contents.
    pub fn contents(&self) -> Vec<u8> {
        self.kernel.state.acquire().memory.frame(self.ppn).to_vec()
    }
}

impl fmt::Debug for PinnedPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedPage")
            .field("pid", &self.pid)
            .field("vpn", &self.vpn)
            .field("ppn", &self.ppn)
            .finish()
    }
}

impl Drop for PinnedPage {
    fn drop(&mut self) {
        let mut state = self.kernel.state.acquire();
        state.frames.unpin(self.ppn);
        self.kernel.frame_freed.signal(&state);
    }
}
