// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Condition variable built from a wait queue and interrupt masking
//! OWNERS: @kernel-sync-team
//! PUBLIC API: Condition::new/wait/signal/broadcast
//! DEPENDS_ON: sync::lock, sync::wait_queue, machine::interrupt
//! INVARIANTS: Bound to one lock for life; every call requires that lock held by the caller;
//!             enqueue happens before the lock is released, so no wake-up is lost

use std::sync::Arc;

use super::lock::{LockGuard, LockId};
use super::wait_queue::{WaitQueue, Waiter};
use crate::machine::Interrupt;
use crate::sync::Lock;

/// Mesa-style condition variable.
///
/// Woken threads re-acquire the lock before `wait` returns but must re-check
/// their predicate: a signal only means "something changed".
pub struct Condition {
    lock: LockId,
    interrupt: Arc<Interrupt>,
    waiters: WaitQueue,
}

impl Condition {
    /// Creates a condition variable bound to `lock`.
    pub fn new<T>(lock: &Lock<T>, interrupt: Arc<Interrupt>) -> Self {
        Self { lock: lock.id(), interrupt, waiters: WaitQueue::new() }
    }

    /// Atomically releases the lock and sleeps until signalled, then
    /// re-acquires the lock.
    pub fn wait<T>(&self, guard: &mut LockGuard<'_, T>) {
        self.assert_bound(guard);
        let waiter = Waiter::current();
        {
            let masked = self.interrupt.disable();
            self.waiters.wait_for_access(&masked, waiter.clone());
        }
        guard.unlocked(|| waiter.sleep());
    }

    /// Wakes at most one waiter.
    pub fn signal<T>(&self, guard: &LockGuard<'_, T>) {
        self.assert_bound(guard);
        let masked = self.interrupt.disable();
        if let Some(waiter) = self.waiters.next_thread(&masked) {
            waiter.ready();
        }
    }

    /// Wakes every waiter and returns how many were woken.
    pub fn broadcast<T>(&self, guard: &LockGuard<'_, T>) -> usize {
        self.assert_bound(guard);
        let masked = self.interrupt.disable();
        let mut woken = 0;
        while let Some(waiter) = self.waiters.next_thread(&masked) {
            waiter.ready();
            woken += 1;
        }
        woken
    }

    /// Number of threads currently asleep on this condition.
    pub fn waiters(&self) -> usize {
        self.waiters.len()
    }

    fn assert_bound<T>(&self, guard: &LockGuard<'_, T>) {
        let lock = guard.lock();
        assert_eq!(lock.id(), self.lock, "condition used with a lock it is not bound to");
        assert!(lock.is_held_by_current_thread(), "{} not held by the calling thread", self.lock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::thread;

    struct Mailbox {
        lock: Lock<VecDeque<u32>>,
        ready: Condition,
    }

    fn mailbox() -> Arc<Mailbox> {
        let lock = Lock::new(VecDeque::new());
        let ready = Condition::new(&lock, Arc::new(Interrupt::new()));
        Arc::new(Mailbox { lock, ready })
    }

    #[test]
    fn signal_without_waiters_is_noop() {
        let mb = mailbox();
        let guard = mb.lock.acquire();
        mb.ready.signal(&guard);
        assert_eq!(mb.ready.broadcast(&guard), 0);
    }

    #[test]
    fn wait_returns_holding_the_lock() {
        let mb = mailbox();
        let consumer = {
            let mb = Arc::clone(&mb);
            thread::spawn(move || {
                let mut guard = mb.lock.acquire();
                let mut got = Vec::new();
                while got.len() < 20 {
                    while guard.is_empty() {
                        mb.ready.wait(&mut guard);
                        assert!(mb.lock.is_held_by_current_thread());
                    }
                    got.extend(guard.drain(..));
                }
                got
            })
        };
        for value in 0..20 {
            let mut guard = mb.lock.acquire();
            guard.push_back(value);
            mb.ready.signal(&guard);
            drop(guard);
            thread::yield_now();
        }
        assert_eq!(consumer.join().unwrap(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn broadcast_wakes_everyone() {
        let mb = mailbox();
        let sleepers: Vec<_> = (0..3)
            .map(|_| {
                let mb = Arc::clone(&mb);
                thread::spawn(move || {
                    let mut guard = mb.lock.acquire();
                    while guard.is_empty() {
                        mb.ready.wait(&mut guard);
                    }
                })
            })
            .collect();
        while mb.ready.waiters() < 3 {
            thread::yield_now();
        }
        let mut guard = mb.lock.acquire();
        guard.push_back(1);
        assert_eq!(mb.ready.broadcast(&guard), 3);
        drop(guard);
        for sleeper in sleepers {
            sleeper.join().unwrap();
        }
    }

    #[test]
    #[should_panic(expected = "not bound")]
    fn foreign_lock_is_rejected() {
        let mb = mailbox();
        let other = Lock::new(VecDeque::<u32>::new());
        let guard = other.acquire();
        mb.ready.signal(&guard);
    }
}
