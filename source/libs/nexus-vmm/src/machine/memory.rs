// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Byte-addressable main memory of the simulated machine.

use crate::types::Ppn;

/// Main memory split into `frames` page-sized frames.
pub struct PhysicalMemory {
    page_size: usize,
    bytes: Vec<u8>,
}

impl PhysicalMemory {
    /// Allocates zeroed memory holding `frames` frames of `page_size` bytes.
    pub fn new(page_size: usize, frames: usize) -> Self {
        Self { page_size, bytes: vec![0u8; page_size * frames] }
    }

    /// Number of frames.
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.bytes.len() / self.page_size
    }

    /// Borrows the contents of `ppn`.
    pub fn frame(&self, ppn: Ppn) -> &[u8] {
        let base = self.base_of(ppn);
        &self.bytes[base..base + self.page_size]
    }

    /// Mutably borrows the contents of `ppn`.
    pub fn frame_mut(&mut self, ppn: Ppn) -> &mut [u8] {
        let base = self.base_of(ppn);
        &mut self.bytes[base..base + self.page_size]
    }

    fn base_of(&self, ppn: Ppn) -> usize {
        assert!(ppn < self.frame_count(), "frame {ppn} beyond physical memory");
        ppn * self.page_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_do_not_overlap() {
        let mut memory = PhysicalMemory::new(16, 4);
        memory.frame_mut(1).fill(0xaa);
        assert!(memory.frame(0).iter().all(|b| *b == 0));
        assert!(memory.frame(1).iter().all(|b| *b == 0xaa));
        assert!(memory.frame(2).iter().all(|b| *b == 0));
        assert_eq!(memory.frame_count(), 4);
    }

    #[test]
    #[should_panic(expected = "beyond physical memory")]
    fn out_of_range_frame_panics() {
        let memory = PhysicalMemory::new(16, 4);
        let _ = memory.frame(4);
    }
}
