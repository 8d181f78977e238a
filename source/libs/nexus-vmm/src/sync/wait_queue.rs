// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: FIFO queue of descheduled threads
//! OWNERS: @kernel-sync-team
//! PUBLIC API: Waiter (current/ready/sleep), WaitQueue (wait_for_access/next_thread)
//! DEPENDS_ON: machine::interrupt (mask token), std::thread park/unpark
//! INVARIANTS: Queue mutation only with interrupts masked; a ready() before sleep() is never lost

extern crate alloc;

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, Thread};

use parking_lot::Mutex;

use crate::machine::InterruptGuard;

struct WaiterInner {
    thread: Thread,
    runnable: AtomicBool,
}

/// Handle to a thread that is (or is about to be) asleep.
#[derive(Clone)]
pub struct Waiter(Arc<WaiterInner>);

impl Waiter {
    /// A not-yet-runnable handle for the calling thread.
    pub fn current() -> Self {
        Self(Arc::new(WaiterInner { thread: thread::current(), runnable: AtomicBool::new(false) }))
    }

    /// Makes the thread runnable again.
    pub fn ready(&self) {
        self.0.runnable.store(true, Ordering::Release);
        self.0.thread.unpark();
    }

    /// Deschedules the calling thread until [`Waiter::ready`] is called.
    pub fn sleep(&self) {
        debug_assert_eq!(self.0.thread.id(), thread::current().id());
        while !self.0.runnable.load(Ordering::Acquire) {
            thread::park();
        }
    }
}

/// FIFO of sleeping threads. Every mutation requires proof that
/// interrupts are masked.
#[derive(Default)]
pub struct WaitQueue {
    waiters: Mutex<VecDeque<Waiter>>,
}

impl WaitQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `waiter` to the tail.
    pub fn wait_for_access(&self, _masked: &InterruptGuard<'_>, waiter: Waiter) {
        self.waiters.lock().push_back(waiter);
    }

    /// Removes the head, if any.
    pub fn next_thread(&self, _masked: &InterruptGuard<'_>) -> Option<Waiter> {
        self.waiters.lock().pop_front()
    }

    /// Number of queued threads.
    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    /// Returns `true` when nobody is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Interrupt;

    #[test]
    fn ready_before_sleep_is_not_lost() {
        let waiter = Waiter::current();
        waiter.ready();
        waiter.sleep();
    }

    #[test]
    fn queue_is_fifo() {
        let interrupt = Interrupt::new();
        let queue = WaitQueue::new();
        let first = Waiter::current();
        let second = Waiter::current();
        {
            let masked = interrupt.disable();
            queue.wait_for_access(&masked, first.clone());
            queue.wait_for_access(&masked, second.clone());
        }
        assert_eq!(queue.len(), 2);
        let masked = interrupt.disable();
        let head = queue.next_thread(&masked).unwrap();
        assert!(Arc::ptr_eq(&head.0, &first.0));
        let next = queue.next_thread(&masked).unwrap();
        assert!(Arc::ptr_eq(&next.0, &second.0));
        assert!(queue.next_thread(&masked).is_none());
    }
}
