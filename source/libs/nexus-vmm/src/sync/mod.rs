// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Blocking synchronization primitives for the VM manager
//! OWNERS: @kernel-sync-team
//! PUBLIC API: Lock, LockGuard, Condition, WaitQueue, Waiter
//! DEPENDS_ON: parking_lot, machine::interrupt
//! INVARIANTS: Interrupt masking is confined to the condition variable's queue operations

pub mod condition;
pub mod lock;
pub mod wait_queue;

pub use condition::Condition;
pub use lock::{Lock, LockGuard, LockId};
pub use wait_queue::{WaitQueue, Waiter};
