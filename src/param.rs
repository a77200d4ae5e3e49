//! Tunable pool sizes and on-disk constants.
//!
//! Mirrors the teacher's `param.rs`, adjusted to the block size and pool
//! sizes spec.md fixes explicitly (§3, §4.1, §4.3, §4.6).

/// Block size, in bytes.
pub const BSIZE: usize = 512;

/// Number of buffers in the block cache.
pub const NBUF: usize = 30;

/// Number of in-memory inode cache slots.
pub const NINODE: usize = 50;

/// Number of system-wide open file objects.
pub const NFILE: usize = 100;

/// Device number of the filesystem's root device.
pub const ROOTDEV: u32 = 1;

/// Max number of blocks any single FS op writes, bounding one transaction.
pub const MAXOPBLOCKS: usize = 10;

/// Max data blocks in the on-disk log.
pub const LOGSIZE: usize = MAXOPBLOCKS * 3;

/// Maximum length of one path component, not counting a NUL terminator.
pub const DIRSIZ: usize = 14;

/// Capacity of a pipe's ring buffer, in bytes.
pub const PIPESIZE: usize = 512;
