//! Lock primitives.
//!
//! Mirrors the teacher's two-discipline model (`src/lock/spinlock.rs`,
//! `src/lock/sleeplock.rs`, spec.md §5): a spin-lock for short critical
//! sections over index structures, and a sleep-lock for long-lived
//! per-object state whose critical sections may block across I/O.

mod sleeplock;
mod spinlock;

pub use sleeplock::{SleepLock, SleepLockGuard};
pub use spinlock::{Spinlock, SpinlockGuard};
