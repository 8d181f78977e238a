// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Simulated interrupt controller (preemption mask)
//! OWNERS: @kernel-sync-team
//! PUBLIC API: Interrupt::disable(), InterruptGuard
//! DEPENDS_ON: parking_lot::Mutex
//! INVARIANTS: At most one masked section runs at a time; the guard restores the previous level on drop

use parking_lot::{Mutex, MutexGuard};

/// Interrupt enable state as seen by the simulated processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Preemption may occur.
    Enabled,
    /// Preemption is masked.
    Disabled,
}

/// Interrupt controller of the simulated machine.
///
/// On the uniprocessor this models, disabling interrupts means no other
/// thread can be scheduled until they are restored. Host threads run in
/// parallel, so masking is expressed as exclusive ownership of the level:
/// two masked sections never overlap.
#[derive(Debug)]
pub struct Interrupt {
    level: Mutex<Level>,
}

impl Interrupt {
    /// Creates a controller with interrupts enabled.
    pub fn new() -> Self {
        Self { level: Mutex::new(Level::Enabled) }
    }

    /// Masks interrupts until the returned guard is dropped.
    pub fn disable(&self) -> InterruptGuard<'_> {
        let mut level = self.level.lock();
        let previous = *level;
        *level = Level::Disabled;
        InterruptGuard { level, previous }
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof that interrupts are masked; restores the previous level on drop.
pub struct InterruptGuard<'a> {
    level: MutexGuard<'a, Level>,
    previous: Level,
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        *self.level = self.previous;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_masks_and_restores() {
        let interrupt = Interrupt::new();
        {
            let masked = interrupt.disable();
            assert_eq!(*masked.level, Level::Disabled);
            assert!(interrupt.level.try_lock().is_none(), "masked sections must not overlap");
        }
        assert_eq!(*interrupt.level.lock(), Level::Enabled);
    }
}
