// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Newtypes shared across the VM manager
//! OWNERS: @kernel-mm-team
//! PUBLIC API: Pid, Vpn, Ppn, SwapSlot
//! INVARIANTS: Pids are never reused within one kernel instance

use core::fmt;

/// Virtual page number within a process address space.
pub type Vpn = usize;

/// Physical frame number within simulated main memory.
pub type Ppn = usize;

/// Page-sized slot index within the swap backing store.
pub type SwapSlot = usize;

/// Process identifier handed out by [`crate::VmKernel::spawn`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(u32);

impl Pid {
    /// Wraps a raw identifier.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid:{}", self.0)
    }
}
