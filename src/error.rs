//! Recoverable failure modes, per spec.md §7.
//!
//! The teacher represents every recoverable failure as `Result<_, ()>` or a
//! sentinel (`-1`, `null`), since it is `no_std` and has no room for an error
//! enum. A hosted crate can afford one without drifting from the teacher's
//! split between "recoverable" (returned) and "fatal" (`panic!`/`assert!`,
//! reserved for invariant violations and never reachable from user input).

use core::fmt;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum FsError {
    /// `dirlink` found an existing entry with that name.
    NameExists,
    /// A path element did not resolve to an existing directory entry.
    NotFound,
    /// The resolved inode is not a directory where one was required.
    NotADirectory,
    /// `nameiparent` was given a path with no parent component.
    NoParent,
    /// Read/write offset plus length overflowed or exceeded `MAXFILE`.
    OutOfRange,
    /// The file object does not permit this operation (e.g. write to a
    /// read-only descriptor).
    PermissionDenied,
    /// The system-wide file table or per-process descriptor table is full.
    TableFull,
    /// The pipe or file wait was interrupted because the calling process
    /// was killed.
    Interrupted,
    /// The peer end of a pipe has been closed.
    ClosedPipe,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FsError::NameExists => "name already exists in directory",
            FsError::NotFound => "no such file or directory",
            FsError::NotADirectory => "not a directory",
            FsError::NoParent => "path has no parent component",
            FsError::OutOfRange => "offset/length out of range",
            FsError::PermissionDenied => "operation not permitted on this descriptor",
            FsError::TableFull => "table exhausted",
            FsError::Interrupted => "interrupted",
            FsError::ClosedPipe => "pipe closed",
        };
        f.write_str(msg)
    }
}

pub type FsResult<T> = Result<T, FsError>;
