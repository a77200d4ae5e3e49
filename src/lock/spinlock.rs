//! Mutual-exclusion lock that busy-waits.
//!
//! Grounded in the teacher's `src/lock/spinlock.rs`. The teacher disables
//! interrupts on the acquiring CPU via `push_off`/`pop_off`; that has no
//! meaning in a hosted crate, so this wraps `spin::Mutex` directly. Used for
//! the short O(N) index operations over `bcache`, `icache` and `ftable`
//! (spec.md §4.1, §4.3, §4.6): never held across I/O.

use spin::{Mutex, MutexGuard};

pub struct Spinlock<T> {
    inner: Mutex<T>,
}

pub struct SpinlockGuard<'s, T> {
    inner: MutexGuard<'s, T>,
}

impl<T> Spinlock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            inner: Mutex::new(data),
        }
    }

    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        SpinlockGuard {
            inner: self.inner.lock(),
        }
    }
}

impl<T> core::ops::Deref for SpinlockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> core::ops::DerefMut for SpinlockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}
