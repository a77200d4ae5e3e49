//! Block device contract (spec.md §6), standing in for the PIO IDE driver.
//!
//! The real driver (`iderw`) is a synchronous, blocking transfer of one
//! buffer between memory and disk, queued FIFO and serviced by an
//! interrupt handler (spec.md §5, §6). Since the device driver is an
//! out-of-scope collaborator here, `BlockDevice` exposes just that
//! contract — read/write one `BSIZE` block, blocking the caller until
//! done — and `RamDisk` is the in-crate implementation used by the block
//! cache and by tests, grounded in the teacher's `src/virtio_disk.rs`
//! (same read/write-one-block shape, minus the virtqueue/interrupt
//! plumbing that only matters on real hardware).

use std::sync::Mutex;

use crate::param::BSIZE;

/// Synchronous block transfer, matching the `iderw` contract: the call
/// blocks until the transfer completes.
pub trait BlockDevice: Send + Sync {
    fn read_block(&self, blockno: u32, buf: &mut [u8; BSIZE]);
    fn write_block(&self, blockno: u32, buf: &[u8; BSIZE]);

    /// Total number of addressable blocks, used by `Fs::format`.
    fn num_blocks(&self) -> u32;
}

/// An in-memory block device, fixed at construction to `nblocks` blocks of
/// `BSIZE` zeroed bytes. Stands in for a PIO IDE disk in tests and for
/// building filesystem images without real hardware.
pub struct RamDisk {
    blocks: Mutex<Vec<[u8; BSIZE]>>,
}

impl RamDisk {
    pub fn new(nblocks: u32) -> Self {
        Self {
            blocks: Mutex::new(vec![[0u8; BSIZE]; nblocks as usize]),
        }
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, blockno: u32, buf: &mut [u8; BSIZE]) {
        let blocks = self.blocks.lock().unwrap();
        let src = blocks
            .get(blockno as usize)
            .unwrap_or_else(|| panic!("RamDisk::read_block: blockno {} out of range", blockno));
        buf.copy_from_slice(src);
    }

    fn write_block(&self, blockno: u32, buf: &[u8; BSIZE]) {
        let mut blocks = self.blocks.lock().unwrap();
        let dst = blocks
            .get_mut(blockno as usize)
            .unwrap_or_else(|| panic!("RamDisk::write_block: blockno {} out of range", blockno));
        dst.copy_from_slice(buf);
    }

    fn num_blocks(&self) -> u32 {
        self.blocks.lock().unwrap().len() as u32
    }
}
