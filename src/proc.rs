//! Minimal stand-in for the process subsystem (spec.md §1: "referenced only
//! by interface"). Supplies exactly what the filesystem/pipe layer needs:
//! a per-caller identity and a `killed` flag observable while waiting on a
//! pipe (spec.md §4.7, §5 "Cancellation").
//!
//! Grounded in the shape of the teacher's `src/proc.rs` `Proc`/`CurrentProc`,
//! stripped of scheduling, address spaces and trap handling, none of which
//! this crate owns.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

static NEXT_PID: AtomicU32 = AtomicU32::new(1);

/// A handle representing one caller of the filesystem API.
///
/// Cloning shares the same `killed` flag, the way `dup`'d file descriptors
/// in the same process share `myproc()->killed`.
#[derive(Clone)]
pub struct Proc {
    pid: u32,
    killed: Arc<AtomicBool>,
}

impl Proc {
    pub fn new() -> Self {
        Self {
            pid: NEXT_PID.fetch_add(1, Ordering::Relaxed),
            killed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }

    pub fn kill(&self) {
        self.killed.store(true, Ordering::Release);
    }
}

impl Default for Proc {
    fn default() -> Self {
        Self::new()
    }
}
