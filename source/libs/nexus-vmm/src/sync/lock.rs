// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Kernel mutual-exclusion lock with holder tracking
//! OWNERS: @kernel-sync-team
//! PUBLIC API: Lock::new/acquire/is_held_by_current_thread, LockGuard, LockId
//! DEPENDS_ON: parking_lot::Mutex
//! INVARIANTS: holder == current thread tag exactly while a guard is live and not temporarily released

use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

const NO_HOLDER: u64 = 0;

static NEXT_LOCK_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_THREAD_TAG: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TAG: u64 = NEXT_THREAD_TAG.fetch_add(1, Ordering::Relaxed);
}

fn current_thread_tag() -> u64 {
    THREAD_TAG.with(|tag| *tag)
}

/// Identity of a [`Lock`], used to bind condition variables.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LockId(u64);

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lock#{}", self.0)
    }
}

/// Blocking lock that knows which thread holds it.
///
/// Re-acquiring from the holding thread is a contract violation and panics
/// instead of deadlocking.
pub struct Lock<T> {
    id: LockId,
    holder: AtomicU64,
    inner: Mutex<T>,
}

impl<T> Lock<T> {
    /// Creates an unlocked lock protecting `value`.
    pub fn new(value: T) -> Self {
        Self {
            id: LockId(NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed)),
            holder: AtomicU64::new(NO_HOLDER),
            inner: Mutex::new(value),
        }
    }

    /// Identity of this lock.
    #[inline]
    pub fn id(&self) -> LockId {
        self.id
    }

    /// Blocks until the lock is free, then takes it.
    pub fn acquire(&self) -> LockGuard<'_, T> {
        assert!(
            !self.is_held_by_current_thread(),
            "{} acquired twice by the same thread",
            self.id
        );
        let guard = self.inner.lock();
        self.holder.store(current_thread_tag(), Ordering::Release);
        LockGuard { lock: self, guard }
    }

    /// Returns `true` when the calling thread holds the lock.
    pub fn is_held_by_current_thread(&self) -> bool {
        self.holder.load(Ordering::Acquire) == current_thread_tag()
    }
}

/// RAII holder of a [`Lock`]; releases it on drop.
pub struct LockGuard<'a, T> {
    lock: &'a Lock<T>,
    guard: MutexGuard<'a, T>,
}

impl<'a, T> LockGuard<'a, T> {
    /// The lock this guard holds.
    pub fn lock(&self) -> &'a Lock<T> {
        self.lock
    }

    /// Releases the lock for the duration of `f` and takes it back afterwards.
    pub(crate) fn unlocked<U>(&mut self, f: impl FnOnce() -> U) -> U {
        self.lock.holder.store(NO_HOLDER, Ordering::Release);
        let out = MutexGuard::unlocked(&mut self.guard, f);
        self.lock.holder.store(current_thread_tag(), Ordering::Release);
        out
    }
}

impl<T> Deref for LockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<T> DerefMut for LockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl<T> Drop for LockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.holder.store(NO_HOLDER, Ordering::Release);
    }
}
