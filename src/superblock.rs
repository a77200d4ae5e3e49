//! On-disk superblock: describes the disk layout (spec.md §3, §4.2, §4.3).
//!
//! Grounded in the teacher's `src/fs/superblock.rs`, which reads the exact
//! same fields with `ptr::read`; this crate reads it through `zerocopy`
//! instead, per the ambient-stack decision (`SPEC_FULL.md` §B) to use
//! `zerocopy` for every on-disk struct rather than raw pointer casts.

use static_assertions::const_assert;
use zerocopy::{AsBytes, FromBytes};

use crate::bio::Buf;
use crate::inode::Dinode;
use crate::param::BSIZE;

const FSMAGIC: u32 = 0x1020_3040;

/// Disk layout:
/// `[ boot block | super block | log | inode blocks | free bitmap | data blocks ]`
#[repr(C)]
#[derive(Copy, Clone, FromBytes, AsBytes)]
pub struct Superblock {
    magic: u32,
    /// Size of the filesystem image, in blocks.
    pub size: u32,
    /// Number of data blocks.
    pub nblocks: u32,
    /// Number of inodes.
    pub ninodes: u32,
    /// Number of log blocks.
    pub nlog: u32,
    /// Block number of the first log block.
    pub logstart: u32,
    /// Block number of the first inode block.
    pub inodestart: u32,
    /// Block number of the first free-bitmap block.
    pub bmapstart: u32,
}

const_assert!(core::mem::size_of::<Superblock>() <= BSIZE);

/// Inodes packed per block.
pub const IPB: usize = BSIZE / core::mem::size_of::<Dinode>();

/// Bitmap bits per block.
pub const BPB: u32 = (BSIZE * 8) as u32;

impl Superblock {
    /// Reads and validates the superblock out of block 1 of the device.
    pub fn read(buf: &Buf<'_>) -> Self {
        let sb = Self::read_from_prefix(buf.data().as_slice()).expect("superblock truncated");
        assert_eq!(sb.magic, FSMAGIC, "invalid file system");
        sb
    }

    #[allow(clippy::too_many_arguments)]
    pub fn for_format(
        size: u32,
        nblocks: u32,
        ninodes: u32,
        nlog: u32,
        logstart: u32,
        inodestart: u32,
        bmapstart: u32,
    ) -> Self {
        Self {
            magic: FSMAGIC,
            size,
            nblocks,
            ninodes,
            nlog,
            logstart,
            inodestart,
            bmapstart,
        }
    }

    pub fn write(&self, buf: &mut Buf<'_>) {
        buf.data_mut()[..core::mem::size_of::<Self>()].copy_from_slice(self.as_bytes());
    }

    /// Block containing inode `i`.
    pub fn iblock(&self, i: u32) -> u32 {
        i / IPB as u32 + self.inodestart
    }

    /// Block of the free bitmap containing the bit for block `b`.
    pub fn bblock(&self, b: u32) -> u32 {
        b / BPB + self.bmapstart
    }
}
