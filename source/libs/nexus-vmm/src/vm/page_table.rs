// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Flat per-process page table indexed by virtual page number
//! OWNERS: @kernel-mm-team
//! PUBLIC API: PageTable (new/entry/entry_mut/set/invalidate/invalidate_all/resident)
//! DEPENDS_ON: vm::translation
//! INVARIANTS: entries[vpn].vpn == vpn; out-of-range vpn is a caller bug and panics

use crate::types::{Ppn, Vpn};
use crate::vm::translation::TranslationEntry;

/// Array of translation entries, one per virtual page.
#[derive(Debug, Clone)]
pub struct PageTable {
    entries: Vec<TranslationEntry>,
}

impl PageTable {
    /// Creates a table of `pages` invalid entries.
    pub fn new(pages: usize) -> Self {
        Self { entries: (0..pages).map(TranslationEntry::invalid).collect() }
    }

    /// Number of virtual pages.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` for a zero-page address space.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` when `vpn` lies inside the address space.
    #[inline]
    pub fn contains(&self, vpn: Vpn) -> bool {
        vpn < self.entries.len()
    }

    /// Borrows the entry for `vpn`.
    pub fn entry(&self, vpn: Vpn) -> &TranslationEntry {
        self.check(vpn);
        &self.entries[vpn]
    }

    /// Mutably borrows the entry for `vpn`.
    pub fn entry_mut(&mut self, vpn: Vpn) -> &mut TranslationEntry {
        self.check(vpn);
        &mut self.entries[vpn]
    }

    /// Replaces the entry for `vpn`.
    pub fn set(&mut self, vpn: Vpn, entry: TranslationEntry) {
        self.check(vpn);
        assert_eq!(entry.vpn, vpn, "entry for vpn {} stored at vpn {vpn}", entry.vpn);
        self.entries[vpn] = entry;
    }

    /// Resets `vpn` to an invalid entry with all bits clear.
    pub fn invalidate(&mut self, vpn: Vpn) {
        self.set(vpn, TranslationEntry::invalid(vpn));
    }

    /// Invalidates every entry and returns the `(vpn, ppn)` pairs that were resident.
    pub fn invalidate_all(&mut self) -> Vec<(Vpn, Ppn)> {
        let released = self.resident().collect();
        for (vpn, entry) in self.entries.iter_mut().enumerate() {
            *entry = TranslationEntry::invalid(vpn);
        }
        released
    }

    /// Iterates over `(vpn, ppn)` of resident pages.
    pub fn resident(&self) -> impl Iterator<Item = (Vpn, Ppn)> + '_ {
        self.entries.iter().filter(|entry| entry.valid()).map(|entry| (entry.vpn, entry.ppn))
    }

    fn check(&self, vpn: Vpn) {
        assert!(vpn < self.entries.len(), "vpn {vpn} out of range (size {})", self.entries.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::translation::EntryFlags;

    #[test]
    fn starts_invalid() {
        let table = PageTable::new(3);
        assert_eq!(table.len(), 3);
        assert!((0..3).all(|vpn| !table.entry(vpn).valid()));
        assert_eq!(table.resident().count(), 0);
    }

    #[test]
    fn invalidate_all_reports_resident_frames() {
        let mut table = PageTable::new(4);
        table.set(1, TranslationEntry { vpn: 1, ppn: 7, flags: EntryFlags::VALID });
        table.set(3, TranslationEntry { vpn: 3, ppn: 2, flags: EntryFlags::VALID | EntryFlags::DIRTY });
        table.set(2, TranslationEntry { vpn: 2, ppn: 9, flags: EntryFlags::DIRTY });
        assert_eq!(table.invalidate_all(), vec![(1, 7), (3, 2)]);
        assert_eq!(table.resident().count(), 0);
        assert!(!table.entry(3).dirty());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_panics() {
        let table = PageTable::new(2);
        let _ = table.entry(2);
    }
}
