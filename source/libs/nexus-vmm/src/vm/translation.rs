// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Translation entry shared by page tables and the hardware TLB
//! OWNERS: @kernel-mm-team
//! PUBLIC API: TranslationEntry, EntryFlags
//! DEPENDS_ON: bitflags
//! INVARIANTS: ppn is meaningless unless VALID is set; merges only ever OR bits in

use bitflags::bitflags;

use crate::types::{Ppn, Vpn};

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    /// Status bits of a translation entry.
    pub struct EntryFlags: u8 {
        /// The entry maps a resident frame.
        const VALID = 1 << 0;
        /// Writes through this entry are refused.
        const READ_ONLY = 1 << 1;
        /// The page was referenced since the clock hand last cleared it.
        const USED = 1 << 2;
        /// The frame differs from the page's backing source.
        const DIRTY = 1 << 3;
    }
}

/// Virtual-to-physical mapping for one page.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TranslationEntry {
    /// Virtual page number this entry translates.
    pub vpn: Vpn,
    /// Backing frame, valid only when [`EntryFlags::VALID`] is set.
    pub ppn: Ppn,
    /// Status bits.
    pub flags: EntryFlags,
}

impl TranslationEntry {
    /// An invalid entry for `vpn`.
    pub const fn invalid(vpn: Vpn) -> Self {
        Self { vpn, ppn: 0, flags: EntryFlags::empty() }
    }

    /// Returns `true` when the entry maps a resident frame.
    #[inline]
    pub fn valid(&self) -> bool {
        self.flags.contains(EntryFlags::VALID)
    }

    /// Returns `true` when writes must be refused.
    #[inline]
    pub fn read_only(&self) -> bool {
        self.flags.contains(EntryFlags::READ_ONLY)
    }

    /// Returns `true` when the page was referenced recently.
    #[inline]
    pub fn used(&self) -> bool {
        self.flags.contains(EntryFlags::USED)
    }

    /// Returns `true` when the frame must be written back before reuse.
    #[inline]
    pub fn dirty(&self) -> bool {
        self.flags.contains(EntryFlags::DIRTY)
    }

    /// Sets or clears the recency bit.
    #[inline]
    pub fn set_used(&mut self, used: bool) {
        self.flags.set(EntryFlags::USED, used);
    }

    /// Marks the page as modified.
    #[inline]
    pub fn mark_dirty(&mut self) {
        self.flags.insert(EntryFlags::DIRTY);
    }

    /// ORs the `used`/`dirty` bits of a hardware copy into this entry.
    ///
    /// Never clears a bit, so a dirty page stays dirty until it is evicted.
    pub fn merge_from(&mut self, hardware: &TranslationEntry) {
        debug_assert_eq!(self.vpn, hardware.vpn);
        self.flags |= hardware.flags & (EntryFlags::USED | EntryFlags::DIRTY);
    }
}
