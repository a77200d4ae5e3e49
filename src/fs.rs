//! The explicit filesystem context (spec.md §1, Design Notes).
//!
//! The teacher reaches every filesystem collaborator through a global
//! `kernel_builder()`/`kernel()` singleton — necessary in a `no_std`
//! kernel with exactly one filesystem instance for the lifetime of the
//! program. Hosted on `std`, and wanting the block cache, log and inode
//! table to be independently testable, this crate bundles them into one
//! `Fs` value instead, passed explicitly to every operation that needs
//! disk access — the teacher's own Design Notes flag the global-singleton
//! pattern as the first thing a hosted rewrite should drop.
//!
//! `FsTransaction` plays the same role as the teacher's `fs/mod.rs`
//! (legacy generation) `FsTransaction`: a RAII handle that calls
//! `end_op` on drop, so every filesystem-mutating call takes `&FsTransaction`
//! as proof a transaction is open.

use std::sync::Arc;

use log::info;

use crate::alloc;
use crate::bio::{Bcache, Buf};
use crate::device::BlockDevice;
use crate::inode::{Itable, ROOTINO};
use crate::log::Log;
use crate::param::LOGSIZE;
use crate::path::FileName;
use crate::stat::FileType;
use crate::superblock::Superblock;

/// Bundles every collaborator a filesystem operation needs: the device,
/// the block cache built on it, the mounted superblock, the write-ahead
/// log, and the inode cache.
pub struct Fs {
    pub device: Arc<dyn BlockDevice>,
    pub bcache: Bcache,
    pub superblock: Superblock,
    pub itable: Itable,
    log: Log,
    dev: u32,
}

impl Fs {
    /// Mounts the filesystem found on `device`, replaying the log if the
    /// last session committed a transaction without installing it.
    pub fn mount(device: Arc<dyn BlockDevice>, dev: u32) -> Self {
        let bcache = Bcache::new(Arc::clone(&device));
        let superblock = {
            let buf = bcache.bread(dev, 1);
            Superblock::read(&buf)
        };
        let log = Log::new(&bcache, dev, superblock.logstart, superblock.nlog);
        info!(
            "fs: mounted dev {} ({} blocks, {} inodes)",
            dev, superblock.size, superblock.ninodes
        );
        Self {
            device,
            bcache,
            superblock,
            itable: Itable::new(),
            log,
            dev,
        }
    }

    /// Builds a fresh filesystem image on `device`, sized to fit it
    /// exactly, with `ninodes` inode slots and an empty root directory.
    /// Stands in for the separate `mkfs` tool the teacher's generations
    /// ship alongside the kernel.
    pub fn format(device: Arc<dyn BlockDevice>, dev: u32, ninodes: u32) -> Self {
        use crate::superblock::IPB;

        let size = device.num_blocks();
        let nlog = LOGSIZE as u32 + 1;
        let logstart = 2;
        let inodestart = logstart + nlog;
        let ninodeblocks = (ninodes + IPB as u32 - 1) / IPB as u32;
        let bmapstart = inodestart + ninodeblocks;
        let bits_per_block = (crate::param::BSIZE * 8) as u32;
        let nbitmapblocks = (size + bits_per_block - 1) / bits_per_block;
        let datastart = bmapstart + nbitmapblocks;
        assert!(datastart < size, "format: device too small for {} inodes", ninodes);

        let bcache = Bcache::new(Arc::clone(&device));

        for b in 0..size {
            bcache.bread_and_clear(dev, b).bwrite();
        }

        let superblock =
            Superblock::for_format(size, size - datastart, ninodes, nlog, logstart, inodestart, bmapstart);
        let mut sb_buf = bcache.bread_and_clear(dev, 1);
        superblock.write(&mut sb_buf);
        sb_buf.bwrite();
        drop(sb_buf);

        // Reserve the boot/super/log/inode/bitmap blocks in the free
        // bitmap itself. Done with direct writes rather than through a
        // transaction: the log doesn't exist yet at this point, the way a
        // real mkfs tool writes below the journaling layer entirely.
        for b in 0..datastart {
            let mut bp = bcache.bread(dev, superblock.bblock(b));
            let bi = b % bits_per_block;
            bp.data_mut()[(bi / 8) as usize] |= 1 << (bi % 8);
            bp.bwrite();
        }

        let log = Log::new(&bcache, dev, logstart, nlog);

        let fs = Self {
            device,
            bcache,
            superblock,
            itable: Itable::new(),
            log,
            dev,
        };

        {
            let tx = fs.begin_tx();
            let root = fs.itable.alloc_inode(dev, FileType::Dir, &tx);
            let mut guard = root.lock(&fs);
            guard.set_nlink(1);
            guard.update(&tx);
            guard
                .dirlink(FileName::new("."), ROOTINO, &tx, &fs.itable)
                .expect("format: link .");
            guard
                .dirlink(FileName::new(".."), ROOTINO, &tx, &fs.itable)
                .expect("format: link ..");
        }

        info!(
            "fs: formatted dev {} ({} blocks, {} inodes, {} log blocks)",
            dev, size, ninodes, nlog
        );
        fs
    }

    pub fn dev(&self) -> u32 {
        self.dev
    }

    /// Begins a filesystem operation, returning a handle whose `Drop`
    /// ends it (spec.md §4.1 `begin_op`/`end_op`).
    pub fn begin_tx(&self) -> FsTransaction<'_> {
        self.log.begin_op();
        FsTransaction { fs: self }
    }
}

/// Proof that a transaction is open on `fs`. Every write to disk made
/// through the filesystem API takes one of these.
pub struct FsTransaction<'a> {
    fs: &'a Fs,
}

impl<'a> FsTransaction<'a> {
    pub fn fs(&self) -> &'a Fs {
        self.fs
    }

    /// Records `buf` as part of this transaction instead of writing it
    /// through immediately.
    pub fn write(&self, buf: &mut Buf<'_>) {
        self.fs.log.write(&self.fs.bcache, buf.dev(), buf.blockno());
    }

    pub fn balloc(&self, dev: u32) -> u32 {
        alloc::balloc(self.fs, dev, self)
    }

    pub fn bfree(&self, dev: u32, b: u32) {
        alloc::bfree(self.fs, dev, b, self)
    }
}

impl Drop for FsTransaction<'_> {
    fn drop(&mut self) {
        self.fs.log.end_op(&self.fs.bcache);
    }
}
