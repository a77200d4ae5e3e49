//! File descriptor layer: a tagged union over "nothing open", a pipe end,
//! and an open inode, plus the system-wide table of such objects
//! (spec.md §4.6).
//!
//! Grounded in the teacher's `src/file.rs`: `File` carries readable/
//! writable flags alongside its payload, `write` chunks a large write
//! into pieces no bigger than the log can hold in one transaction
//! (`(MAXOPBLOCKS - 1 - 1 - 2) / 2 * BSIZE` — one block of slack for the
//! inode, one for an indirect block, two for unaligned head/tail writes,
//! halved because each data block written also dirties its bitmap block),
//! and closing a file is the trigger that releases its inode or pipe end.
//! Unlike the teacher (whose `File` only ever represents `Inode`, `Device`
//! or `Pipe` because an always-open console fills the `None` slot
//! conceptually), this crate's `FileKind::None` is reachable: a
//! filesystem with no device layer has nothing to dispatch `Device` to,
//! so that variant is dropped; `None` stands in for an unallocated table
//! slot only, never a live file.

use std::sync::{Arc, Mutex};

use crate::error::{FsError, FsResult};
use crate::fs::{Fs, FsTransaction};
use crate::inode::{Inode, Itable};
use crate::lock::Spinlock;
use crate::param::{BSIZE, MAXOPBLOCKS, NFILE};
use crate::pipe::Pipe;
use crate::proc::Proc;
use crate::stat::Stat;

pub enum FileKind {
    None,
    Pipe(Arc<Pipe>),
    Inode { ip: Arc<Inode>, off: Mutex<u32> },
}

pub struct File {
    kind: FileKind,
    readable: bool,
    writable: bool,
}

impl File {
    pub fn stat(&self, fs: &Fs) -> FsResult<Stat> {
        match &self.kind {
            FileKind::Inode { ip, .. } => Ok(ip.stat(fs)),
            _ => Err(FsError::PermissionDenied),
        }
    }

    /// Reads up to `dst.len()` bytes, advancing this file object's shared
    /// offset for `Inode` files.
    pub fn read(&self, dst: &mut [u8], fs: &Fs, proc: &Proc) -> FsResult<usize> {
        if !self.readable {
            return Err(FsError::PermissionDenied);
        }
        match &self.kind {
            FileKind::Pipe(pipe) => pipe.read(dst, proc),
            FileKind::Inode { ip, off } => {
                let mut offset = off.lock().unwrap();
                let mut guard = ip.lock(fs);
                let n = guard.read(dst, *offset);
                *offset += n as u32;
                Ok(n)
            }
            FileKind::None => panic!("file::read on an unallocated file"),
        }
    }

    /// Writes all of `src`, advancing this file object's shared offset for
    /// `Inode` files. Large writes are split across several transactions
    /// so no single one overflows the log.
    pub fn write(&self, src: &[u8], fs: &Fs, proc: &Proc) -> FsResult<usize> {
        if !self.writable {
            return Err(FsError::PermissionDenied);
        }
        match &self.kind {
            FileKind::Pipe(pipe) => pipe.write(src, proc),
            FileKind::Inode { ip, off } => {
                const MAX_PER_TX: usize = (MAXOPBLOCKS - 1 - 1 - 2) / 2 * BSIZE;
                let mut written = 0;
                while written < src.len() {
                    let chunk = core::cmp::min(src.len() - written, MAX_PER_TX);
                    let tx = fs.begin_tx();
                    let mut offset = off.lock().unwrap();
                    let mut guard = ip.lock(fs);
                    let n = guard.write(&src[written..written + chunk], *offset, &tx)?;
                    assert_eq!(n, chunk, "file::write: short write");
                    *offset += n as u32;
                    written += n;
                }
                Ok(written)
            }
            FileKind::None => panic!("file::write on an unallocated file"),
        }
    }
}

/// The system-wide table of open file objects (spec.md §4.6, `NFILE`).
pub struct Ftable {
    slots: Spinlock<Vec<Option<Arc<File>>>>,
}

impl Ftable {
    pub fn new() -> Self {
        Self {
            slots: Spinlock::new(vec![None; NFILE]),
        }
    }

    /// Allocates a file object of the given kind, failing if the table is
    /// full.
    pub fn alloc(&self, kind: FileKind, readable: bool, writable: bool) -> FsResult<Arc<File>> {
        let mut slots = self.slots.lock();
        let idx = slots
            .iter()
            .position(|slot| slot.is_none())
            .ok_or(FsError::TableFull)?;
        let file = Arc::new(File {
            kind,
            readable,
            writable,
        });
        slots[idx] = Some(Arc::clone(&file));
        Ok(file)
    }

    /// Shares a file object with another descriptor (`dup`).
    pub fn dup(file: &Arc<File>) -> Arc<File> {
        Arc::clone(file)
    }

    /// Releases one descriptor's reference to `file`. If this was the last
    /// reference outside the table itself, closes the underlying pipe end
    /// or releases the underlying inode, and frees the table slot.
    pub fn close(&self, tx: &FsTransaction<'_>, itable: &Itable, file: Arc<File>) {
        if Arc::strong_count(&file) == 2 {
            match &file.kind {
                FileKind::Pipe(pipe) => {
                    pipe.close(file.writable);
                }
                FileKind::Inode { ip, .. } => {
                    itable.put(tx, Arc::clone(ip));
                }
                FileKind::None => {}
            }
            let mut slots = self.slots.lock();
            if let Some(pos) = slots
                .iter()
                .position(|slot| matches!(slot, Some(f) if Arc::ptr_eq(f, &file)))
            {
                slots[pos] = None;
            }
        }
    }
}

impl Default for Ftable {
    fn default() -> Self {
        Self::new()
    }
}
