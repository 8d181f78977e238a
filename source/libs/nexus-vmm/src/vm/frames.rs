// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Physical frame bookkeeping (free list, inverted table, pins, clock hand)
//! OWNERS: @kernel-mm-team
//! PUBLIC API: FrameTable, FrameOwner
//! DEPENDS_ON: types
//! INVARIANTS: A frame is free XOR registered to one (pid, vpn), except while a fault holds it pinned;
//!             pins are counted and never go negative; the cursor is always < frame_count

use std::collections::VecDeque;

use crate::types::{Pid, Ppn, Vpn};

/// Process page a frame currently backs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FrameOwner {
    /// Owning process.
    pub pid: Pid,
    /// Page within that process.
    pub vpn: Vpn,
}

/// State of every physical frame.
///
/// All access happens under the kernel's page lock.
#[derive(Debug)]
pub struct FrameTable {
    free: VecDeque<Ppn>,
    is_free: Vec<bool>,
    owners: Vec<Option<FrameOwner>>,
    pins: Vec<u32>,
    pinned_frames: usize,
    cursor: Ppn,
}

impl FrameTable {
    /// Every frame starts free, queued in ascending order.
    pub fn new(frames: usize) -> Self {
        Self {
            free: (0..frames).collect(),
            is_free: vec![true; frames],
            owners: vec![None; frames],
            pins: vec![0; frames],
            pinned_frames: 0,
            cursor: 0,
        }
    }

    /// Number of physical frames.
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.owners.len()
    }

    /// Takes the frame at the head of the free list.
    pub fn allocate(&mut self) -> Option<Ppn> {
        let ppn = self.free.pop_front()?;
        self.is_free[ppn] = false;
        Some(ppn)
    }

    /// Returns an unregistered frame to the tail of the free list.
    pub fn release(&mut self, ppn: Ppn) {
        assert!(!self.is_free[ppn], "frame {ppn} released twice");
        assert!(self.owners[ppn].is_none(), "frame {ppn} released while still registered");
        self.is_free[ppn] = true;
        self.free.push_back(ppn);
    }

    /// Number of frames on the free list.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Returns `true` when `ppn` sits on the free list.
    pub fn is_free(&self, ppn: Ppn) -> bool {
        self.is_free[ppn]
    }

    /// Records that `ppn` now backs `owner`.
    pub fn register(&mut self, ppn: Ppn, owner: FrameOwner) {
        assert!(!self.is_free[ppn], "frame {ppn} registered while on the free list");
        if let Some(previous) = self.owners[ppn] {
            panic!(
                "frame {ppn} registered to {} vpn {} while owned by {} vpn {}",
                owner.pid, owner.vpn, previous.pid, previous.vpn
            );
        }
        self.owners[ppn] = Some(owner);
    }

    /// Forgets the owner of `ppn` and returns it.
    pub fn unregister(&mut self, ppn: Ppn) -> FrameOwner {
        match self.owners[ppn].take() {
            Some(owner) => owner,
            None => panic!("frame {ppn} unregistered without an owner"),
        }
    }

    /// Current owner of `ppn`.
    pub fn owner(&self, ppn: Ppn) -> Option<FrameOwner> {
        self.owners[ppn]
    }

    /// Adds one pin to `ppn`.
    pub fn pin(&mut self, ppn: Ppn) {
        if self.pins[ppn] == 0 {
            self.pinned_frames += 1;
        }
        self.pins[ppn] += 1;
    }

    /// Drops one pin from `ppn`.
    pub fn unpin(&mut self, ppn: Ppn) {
        assert!(self.pins[ppn] > 0, "unpin of unpinned frame {ppn}");
        self.pins[ppn] -= 1;
        if self.pins[ppn] == 0 {
            self.pinned_frames -= 1;
        }
    }

    /// Returns `true` while at least one pin is held on `ppn`.
    #[inline]
    pub fn is_pinned(&self, ppn: Ppn) -> bool {
        self.pins[ppn] > 0
    }

    /// Returns `true` when no frame can be chosen for eviction.
    pub fn all_pinned(&self) -> bool {
        self.pinned_frames == self.frame_count()
    }

    /// Frame the clock hand examines first.
    #[inline]
    pub fn cursor(&self) -> Ppn {
        self.cursor
    }

    /// Parks the clock hand just past `victim`.
    pub fn advance_past(&mut self, victim: Ppn) {
        self.cursor = (victim + 1) % self.frame_count();
    }
}
