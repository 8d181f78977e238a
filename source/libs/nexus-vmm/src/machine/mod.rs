// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Simulated machine surface consumed by the VM manager
//! OWNERS: @kernel-mm-team
//! PUBLIC API: PhysicalMemory, Tlb, TlbFault, Interrupt, InterruptGuard
//! INVARIANTS: Hardware state is plain data; locking is the kernel's job

pub mod interrupt;
pub mod memory;
pub mod tlb;

pub use interrupt::{Interrupt, InterruptGuard, Level};
pub use memory::PhysicalMemory;
pub use tlb::{Tlb, TlbFault};
