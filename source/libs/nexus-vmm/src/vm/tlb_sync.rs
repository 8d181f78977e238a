// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Keeps the hardware TLB coherent with the scheduled process's page table
//! OWNERS: @kernel-mm-team
//! PUBLIC API: merge_all, save_state, install, purge, clear_used, flush
//! DEPENDS_ON: machine::tlb, vm::page_table, rand (victim slot)
//! INVARIANTS: A TLB slot is dropped only after its used/dirty bits reach the page table;
//!             every valid slot mirrors a valid page-table entry of the scheduled process

use log::trace;
use rand::rngs::StdRng;
use rand::Rng;

use crate::machine::Tlb;
use crate::types::Vpn;
use crate::vm::page_table::PageTable;
use crate::vm::translation::TranslationEntry;

fn merge_slot(table: &mut PageTable, slot: &TranslationEntry) {
    if !slot.valid() || !table.contains(slot.vpn) {
        return;
    }
    let entry = table.entry_mut(slot.vpn);
    if entry.valid() && entry.ppn == slot.ppn {
        entry.merge_from(slot);
    }
}

/// ORs the used/dirty bits of every valid slot into `table`.
pub fn merge_all(tlb: &Tlb, table: &mut PageTable) {
    for index in 0..tlb.size() {
        merge_slot(table, &tlb.read_entry(index));
    }
}

/// Switch-out: merges every slot, snapshots the TLB and invalidates it.
pub fn save_state(tlb: &mut Tlb, table: &mut PageTable) -> Vec<TranslationEntry> {
    merge_all(tlb, table);
    let snapshot = (0..tlb.size()).map(|index| tlb.read_entry(index)).collect();
    flush(tlb);
    snapshot
}

/// Invalidates every slot without merging.
pub fn flush(tlb: &mut Tlb) {
    for index in 0..tlb.size() {
        tlb.write_entry(index, TranslationEntry::invalid(index));
    }
}

/// Loads the page-table entry for `vpn` into the TLB and returns the slot used.
///
/// Prefers the slot already holding `vpn`, then an invalid slot, then a
/// random victim whose bits are merged back first.
pub fn install(tlb: &mut Tlb, rng: &mut StdRng, table: &mut PageTable, vpn: Vpn) -> usize {
    let entry = *table.entry(vpn);
    assert!(entry.valid(), "installing non-resident vpn {vpn} into the TLB");
    let index = match tlb.slot_of(vpn).or_else(|| tlb.free_slot()) {
        Some(index) => index,
        None => rng.gen_range(0..tlb.size()),
    };
    let replaced = tlb.read_entry(index);
    merge_slot(table, &replaced);
    // Re-read: the merge may have touched the entry being installed.
    tlb.write_entry(index, *table.entry(vpn));
    trace!(target: "vmm::tlb", "slot {index}: vpn {vpn} -> ppn {} (was vpn {})", entry.ppn, replaced.vpn);
    index
}

/// Drops the slot translating `vpn`, merging its bits first.
pub fn purge(tlb: &mut Tlb, table: &mut PageTable, vpn: Vpn) {
    if let Some(index) = tlb.slot_of(vpn) {
        merge_slot(table, &tlb.read_entry(index));
        tlb.write_entry(index, TranslationEntry::invalid(index));
    }
}

/// Clears the used bit of the slot translating `vpn`, if any.
pub fn clear_used(tlb: &mut Tlb, vpn: Vpn) {
    if let Some(index) = tlb.slot_of(vpn) {
        let mut slot = tlb.read_entry(index);
        slot.set_used(false);
        tlb.write_entry(index, slot);
    }
}
