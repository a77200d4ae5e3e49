//! A small, host-testable reimplementation of an xv6-style on-disk
//! filesystem: block cache, bitmap allocator, write-ahead log, inode
//! cache, path resolution, file descriptors and pipes.
//!
//! See `Fs` for the entry point: `Fs::format` builds a fresh image on a
//! `BlockDevice`, `Fs::mount` opens an existing one, and every mutating
//! operation runs inside an `FsTransaction` obtained from `Fs::begin_tx`.

pub mod alloc;
pub mod bio;
pub mod device;
pub mod error;
pub mod file;
pub mod fs;
pub mod inode;
pub mod lock;
pub mod log;
pub mod param;
pub mod path;
pub mod pipe;
pub mod proc;
pub mod stat;
pub mod superblock;
pub mod wait_channel;

pub use error::{FsError, FsResult};
pub use fs::{Fs, FsTransaction};
