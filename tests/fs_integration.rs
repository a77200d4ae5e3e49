//! End-to-end scenarios driven only through the public API: format/mount,
//! file content across a block boundary and through the indirect block,
//! directory link/lookup, inode reclamation once nlink drops to zero, and
//! path resolution through nested directories — the scenarios spec.md §8
//! calls out, built on the crate's own `RamDisk` (`SPEC_FULL.md` §B).

use std::sync::Arc;

use corefs::device::RamDisk;
use corefs::file::{FileKind, Ftable};
use corefs::param::BSIZE;
use corefs::path::{FileName, Path};
use corefs::pipe::Pipe;
use corefs::proc::Proc;
use corefs::stat::FileType;
use corefs::Fs;

const NBLOCKS: u32 = 4000;
const NINODES: u32 = 200;
const DEV: u32 = 1;

fn new_disk() -> Arc<RamDisk> {
    Arc::new(RamDisk::new(NBLOCKS))
}

#[test]
fn format_then_mount_round_trip_preserves_root_directory() {
    let disk = new_disk();
    let root_inum = {
        let fs = Fs::format(disk.clone(), DEV, NINODES);
        let root = fs.itable.root(fs.dev());
        let mut guard = root.lock(&fs);
        assert_eq!(guard.typ(), FileType::Dir);
        assert_eq!(guard.nlink(), 1);

        let (dot, _) = guard.dirlookup(FileName::new("."), &fs.itable).unwrap();
        assert_eq!(dot.inum(), root.inum());
        let (dotdot, _) = guard.dirlookup(FileName::new(".."), &fs.itable).unwrap();
        assert_eq!(dotdot.inum(), root.inum());
        root.inum()
    };

    let fs = Fs::mount(disk, DEV);
    let root = fs.itable.root(fs.dev());
    assert_eq!(root.inum(), root_inum);
    let mut guard = root.lock(&fs);
    assert_eq!(guard.typ(), FileType::Dir);
}

#[test]
fn write_and_read_back_across_a_block_boundary() {
    let fs = Fs::format(new_disk(), DEV, NINODES);
    let ip = {
        let tx = fs.begin_tx();
        let ip = fs.itable.alloc_inode(fs.dev(), FileType::File, &tx);
        {
            let mut guard = ip.lock(&fs);
            guard.set_nlink(1);
            guard.update(&tx);
        }
        ip
    };

    let mut content = vec![0u8; BSIZE + 100];
    for (i, b) in content.iter_mut().enumerate() {
        *b = (i % 251) as u8;
    }

    {
        let tx = fs.begin_tx();
        let mut guard = ip.lock(&fs);
        let n = guard.write(&content, 0, &tx).unwrap();
        assert_eq!(n, content.len());
    }

    let mut readback = vec![0u8; content.len()];
    let n = {
        let mut guard = ip.lock(&fs);
        guard.read(&mut readback, 0)
    };
    assert_eq!(n, content.len());
    assert_eq!(readback, content);
}

#[test]
fn write_and_read_back_through_the_indirect_block() {
    let fs = Fs::format(new_disk(), DEV, NINODES);
    let ip = {
        let tx = fs.begin_tx();
        let ip = fs.itable.alloc_inode(fs.dev(), FileType::File, &tx);
        {
            let mut guard = ip.lock(&fs);
            guard.set_nlink(1);
            guard.update(&tx);
        }
        ip
    };

    // Block 14 is two blocks past NDIRECT (12), so this only resolves
    // through the single indirect block.
    let offset = 14 * BSIZE as u32;
    let payload = [0xCDu8; 64];

    {
        let tx = fs.begin_tx();
        let mut guard = ip.lock(&fs);
        let zeros = vec![0u8; offset as usize];
        guard.write(&zeros, 0, &tx).unwrap();
        let n = guard.write(&payload, offset, &tx).unwrap();
        assert_eq!(n, payload.len());
    }

    let mut readback = [0u8; 64];
    {
        let mut guard = ip.lock(&fs);
        guard.read(&mut readback, offset);
    }
    assert_eq!(readback, payload);
}

#[test]
fn write_past_maxfile_is_rejected() {
    use corefs::FsError;
    let fs = Fs::format(new_disk(), DEV, NINODES);
    let tx = fs.begin_tx();
    let ip = fs.itable.alloc_inode(fs.dev(), FileType::File, &tx);
    let mut guard = ip.lock(&fs);
    guard.set_nlink(1);
    guard.update(&tx);

    let past_end = (140 * BSIZE) as u32;
    let err = guard.write(&[1, 2, 3], past_end, &tx).unwrap_err();
    assert_eq!(err, FsError::OutOfRange);
}

#[test]
fn directory_link_then_lookup_round_trips_and_rejects_duplicates() {
    let fs = Fs::format(new_disk(), DEV, NINODES);
    let root = fs.itable.root(fs.dev());

    let tx = fs.begin_tx();
    let child = fs.itable.alloc_inode(fs.dev(), FileType::File, &tx);
    {
        let mut cguard = child.lock(&fs);
        cguard.set_nlink(1);
        cguard.update(&tx);
    }

    let mut rguard = root.lock(&fs);
    rguard
        .dirlink(FileName::new("foo"), child.inum(), &tx, &fs.itable)
        .unwrap();

    let (found, off) = rguard.dirlookup(FileName::new("foo"), &fs.itable).unwrap();
    assert_eq!(found.inum(), child.inum());
    assert_eq!(off, 32); // past the "." and ".." entries (16 bytes each)

    let err = rguard
        .dirlink(FileName::new("foo"), child.inum(), &tx, &fs.itable)
        .unwrap_err();
    assert_eq!(err, corefs::FsError::NameExists);
}

#[test]
fn releasing_the_last_reference_to_an_unlinked_inode_truncates_it() {
    let fs = Fs::format(new_disk(), DEV, NINODES);

    let ip = {
        let tx = fs.begin_tx();
        let ip = fs.itable.alloc_inode(fs.dev(), FileType::File, &tx);
        let mut guard = ip.lock(&fs);
        guard.set_nlink(1);
        guard.update(&tx);
        guard.write(&[0xFFu8; BSIZE + 10], 0, &tx).unwrap();
        drop(guard);
        ip
    };
    let inum = ip.inum();

    {
        let tx = fs.begin_tx();
        let mut guard = ip.lock(&fs);
        guard.set_nlink(0);
        guard.update(&tx);
        drop(guard);
        // `ip` plus the table's own slot clone makes two references: this
        // is the "last external reference" case `Itable::put` reclaims.
        fs.itable.put(&tx, ip);
    }

    // The slot is now free; a lookup for the same inum finds a fresh,
    // never-valid inode rather than the reused one. Locking it would be
    // fatal (an on-disk type of zero means there is no inode there to
    // lock), so the freed state is checked directly off disk instead.
    let recycled = fs.itable.get_inode(fs.dev(), inum);
    assert_eq!(Arc::strong_count(&recycled), 1);

    let iblock = fs.superblock.iblock(inum);
    let buf = fs.bcache.bread(fs.dev(), iblock);
    let offset = (inum as usize % corefs::superblock::IPB) * core::mem::size_of::<corefs::inode::Dinode>();
    let typ = u16::from_ne_bytes(buf.data()[offset..offset + 2].try_into().unwrap());
    assert_eq!(typ, 0);
    let size = u32::from_ne_bytes(buf.data()[offset + 8..offset + 12].try_into().unwrap());
    assert_eq!(size, 0);
}

#[test]
fn path_resolution_walks_nested_relative_and_absolute_paths() {
    let fs = Fs::format(new_disk(), DEV, NINODES);
    let root = fs.itable.root(fs.dev());

    let sub = {
        let tx = fs.begin_tx();
        let sub = fs.itable.alloc_inode(fs.dev(), FileType::Dir, &tx);
        {
            let mut sguard = sub.lock(&fs);
            sguard.set_nlink(1);
            sguard.update(&tx);
            sguard
                .dirlink(FileName::new("."), sub.inum(), &tx, &fs.itable)
                .unwrap();
            sguard
                .dirlink(FileName::new(".."), root.inum(), &tx, &fs.itable)
                .unwrap();
        }
        let mut rguard = root.lock(&fs);
        rguard
            .dirlink(FileName::new("sub"), sub.inum(), &tx, &fs.itable)
            .unwrap();
        sub
    };

    let leaf = {
        let tx = fs.begin_tx();
        let leaf = fs.itable.alloc_inode(fs.dev(), FileType::File, &tx);
        {
            let mut lguard = leaf.lock(&fs);
            lguard.set_nlink(1);
            lguard.update(&tx);
        }
        let mut sguard = sub.lock(&fs);
        sguard
            .dirlink(FileName::new("leaf"), leaf.inum(), &tx, &fs.itable)
            .unwrap();
        leaf
    };

    let found = fs.itable.namei(Path::new("/sub/leaf"), &root, &fs).unwrap();
    assert_eq!(found.inum(), leaf.inum());

    let found_relative = fs.itable.namei(Path::new("sub/leaf"), &root, &fs).unwrap();
    assert_eq!(found_relative.inum(), leaf.inum());

    let (parent, name) = fs.itable.nameiparent(Path::new("/sub/leaf"), &root, &fs).unwrap();
    assert_eq!(parent.inum(), sub.inum());
    assert_eq!(name.as_str(), "leaf");

    let missing = fs.itable.namei(Path::new("/sub/nope"), &root, &fs);
    assert_eq!(missing.unwrap_err(), corefs::FsError::NotFound);
}

#[test]
fn file_descriptor_layer_round_trips_a_pipe_and_reports_eof() {
    let fs = Fs::format(new_disk(), DEV, NINODES);
    let proc = Proc::new();
    let ftable = Ftable::new();
    let pipe = Arc::new(Pipe::new());

    let reader = ftable
        .alloc(FileKind::Pipe(Arc::clone(&pipe)), true, false)
        .unwrap();
    let writer = ftable
        .alloc(FileKind::Pipe(Arc::clone(&pipe)), false, true)
        .unwrap();

    let n = writer.write(b"hi", &fs, &proc).unwrap();
    assert_eq!(n, 2);

    let mut buf = [0u8; 2];
    let n = reader.read(&mut buf, &fs, &proc).unwrap();
    assert_eq!(n, 2);
    assert_eq!(&buf, b"hi");

    {
        let tx = fs.begin_tx();
        ftable.close(&tx, &fs.itable, writer);
    }

    // The write end is closed and the buffer drained, so a further read
    // reports end of file instead of blocking.
    let n = reader.read(&mut buf, &fs, &proc).unwrap();
    assert_eq!(n, 0);

    let tx = fs.begin_tx();
    ftable.close(&tx, &fs.itable, reader);
}
