// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Software-visible hardware TLB of the simulated processor
//! OWNERS: @kernel-mm-team
//! PUBLIC API: Tlb (read_entry/write_entry/translate/slot_of), TlbFault
//! DEPENDS_ON: vm::translation
//! INVARIANTS: Fixed slot count; lookups are fully associative on vpn; only valid slots translate

use crate::types::Vpn;
use crate::vm::translation::{EntryFlags, TranslationEntry};

/// Exception raised by a TLB lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlbFault {
    /// No valid slot translates the page; software must refill.
    Miss {
        /// Faulting virtual address.
        vaddr: usize,
    },
    /// A write hit a read-only translation.
    ReadOnly {
        /// Faulting virtual address.
        vaddr: usize,
    },
}

/// Bounded array of translation slots.
///
/// Slots hold copies of page-table entries. The lookup path updates the
/// `used` and `dirty` bits of the copy only, so software merges them back
/// into the page table when the copy is dropped.
#[derive(Debug, Clone)]
pub struct Tlb {
    slots: Vec<TranslationEntry>,
}

impl Tlb {
    /// Creates a TLB with `size` invalid slots.
    pub fn new(size: usize) -> Self {
        Self { slots: (0..size).map(TranslationEntry::invalid).collect() }
    }

    /// Number of slots.
    #[inline]
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Returns a copy of slot `index`.
    pub fn read_entry(&self, index: usize) -> TranslationEntry {
        self.slots[index]
    }

    /// Overwrites slot `index`.
    pub fn write_entry(&mut self, index: usize, entry: TranslationEntry) {
        self.slots[index] = entry;
    }

    /// Index of the valid slot translating `vpn`, if any.
    pub fn slot_of(&self, vpn: Vpn) -> Option<usize> {
        self.slots.iter().position(|slot| slot.valid() && slot.vpn == vpn)
    }

    /// Index of the first invalid slot, if any.
    pub fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|slot| !slot.valid())
    }

    /// Hardware translation of `vaddr`, setting `used` (and `dirty` on writes).
    pub fn translate(
        &mut self,
        vaddr: usize,
        page_size: usize,
        write: bool,
    ) -> Result<usize, TlbFault> {
        let vpn = vaddr / page_size;
        let index = self.slot_of(vpn).ok_or(TlbFault::Miss { vaddr })?;
        let slot = &mut self.slots[index];
        if write && slot.read_only() {
            return Err(TlbFault::ReadOnly { vaddr });
        }
        slot.flags.insert(EntryFlags::USED);
        if write {
            slot.flags.insert(EntryFlags::DIRTY);
        }
        Ok(slot.ppn * page_size + vaddr % page_size)
    }
}
