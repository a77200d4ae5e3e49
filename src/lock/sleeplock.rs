//! Long-term lock that parks the waiting thread instead of busy-waiting.
//!
//! Grounded in the teacher's `src/lock/sleeplock.rs`, which implements a
//! sleep-lock atop its own process scheduler (`Sleepablelock` + `sleep`).
//! This crate has no scheduler of its own (the process subsystem is an
//! out-of-scope collaborator, spec.md §1), so the same "owner flag guarded
//! by a short spin-style wait, with real blocking" contract is built on
//! `std::sync::{Mutex, Condvar}` instead.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex};

pub struct SleepLock<T> {
    held: Mutex<bool>,
    cond: Condvar,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is only ever granted through a `SleepLockGuard`,
// which exists only while `held` is true and owned by exactly one thread.
unsafe impl<T: Send> Sync for SleepLock<T> {}
unsafe impl<T: Send> Send for SleepLock<T> {}

pub struct SleepLockGuard<'s, T> {
    lock: &'s SleepLock<T>,
}

impl<T> SleepLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            held: Mutex::new(false),
            cond: Condvar::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquires the lock, parking the calling thread while it is held
    /// elsewhere.
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        let mut held = self.held.lock().unwrap();
        while *held {
            held = self.cond.wait(held).unwrap();
        }
        *held = true;
        SleepLockGuard { lock: self }
    }
}

impl<T> Deref for SleepLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: this guard's existence proves the lock is held.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SleepLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: this guard's existence proves the lock is held, exclusively.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SleepLockGuard<'_, T> {
    fn drop(&mut self) {
        let mut held = self.lock.held.lock().unwrap();
        *held = false;
        self.lock.cond.notify_one();
    }
}
