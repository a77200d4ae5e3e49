//! Condition variables addressed by identity, standing in for the process
//! subsystem's `sleep(chan, lock)` / `wakeup(chan)` (spec.md §1, §5, §9).
//!
//! Grounded in the teacher's `src/proc/wait_channel.rs`, which implements
//! the same "atomically release the held lock and park, reacquire on
//! wakeup" contract on top of its own scheduler. Since the process
//! subsystem is an out-of-scope collaborator here, this implements the
//! contract directly on `std::sync::Condvar`, which already guarantees the
//! release-and-park step is atomic with respect to the paired `Mutex`.

use std::sync::{Condvar, MutexGuard};

pub struct WaitChannel {
    cond: Condvar,
}

impl WaitChannel {
    pub const fn new() -> Self {
        Self {
            cond: Condvar::new(),
        }
    }

    /// Atomically releases `guard`'s mutex and parks the caller until
    /// `wakeup` is called, then reacquires the mutex before returning.
    pub fn sleep<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        self.cond.wait(guard).expect("wait channel mutex poisoned")
    }

    /// Wakes every thread currently parked on this channel.
    pub fn wakeup(&self) {
        self.cond.notify_all();
    }
}

impl Default for WaitChannel {
    fn default() -> Self {
        Self::new()
    }
}
