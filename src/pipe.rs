//! Anonymous pipes (spec.md §4.7).
//!
//! Grounded in the teacher's `src/pipe.rs`: a fixed ring buffer with
//! free-running `nread`/`nwrite` counters (so "empty" and "full" are both
//! expressible without a separate flag), one wait-channel for "became
//! non-empty" and one for "became non-full", and independent
//! `readopen`/`writeopen` flags so either end closing unblocks the other.
//! The teacher copies to/from user virtual addresses a byte at a time
//! through the process's page tables; this crate copies to/from plain
//! `&[u8]` slices, since there is no virtual-memory layer here.

use std::sync::Mutex;

use crate::error::{FsError, FsResult};
use crate::param::PIPESIZE;
use crate::proc::Proc;
use crate::wait_channel::WaitChannel;

struct PipeInner {
    data: [u8; PIPESIZE],
    /// Total bytes read since creation.
    nread: u32,
    /// Total bytes written since creation.
    nwrite: u32,
    readopen: bool,
    writeopen: bool,
}

pub struct Pipe {
    inner: Mutex<PipeInner>,
    /// Signaled when the pipe becomes non-empty.
    has_data: WaitChannel,
    /// Signaled when the pipe becomes non-full, or either end closes.
    has_space: WaitChannel,
}

impl Pipe {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PipeInner {
                data: [0; PIPESIZE],
                nread: 0,
                nwrite: 0,
                readopen: true,
                writeopen: true,
            }),
            has_data: WaitChannel::new(),
            has_space: WaitChannel::new(),
        }
    }

    /// Writes `src` into the pipe, blocking while it is full. Returns once
    /// every byte has been written, the read end closed, or `proc` was
    /// killed while waiting.
    pub fn write(&self, src: &[u8], proc: &Proc) -> FsResult<usize> {
        let mut inner = self.inner.lock().unwrap();
        let mut written = 0;
        while written < src.len() {
            if inner.nwrite == inner.nread.wrapping_add(PIPESIZE as u32) {
                if !inner.readopen {
                    return Err(FsError::ClosedPipe);
                }
                if proc.killed() {
                    return Err(FsError::Interrupted);
                }
                self.has_data.wakeup();
                inner = self.has_space.sleep(inner);
                continue;
            }
            let slot = inner.nwrite as usize % PIPESIZE;
            inner.data[slot] = src[written];
            inner.nwrite = inner.nwrite.wrapping_add(1);
            written += 1;
            self.has_data.wakeup();
        }
        Ok(written)
    }

    /// Reads up to `dst.len()` bytes, blocking while the pipe is empty and
    /// the write end is still open. Returns `Ok(0)` once the pipe is empty
    /// and the write end has closed (end of file).
    pub fn read(&self, dst: &mut [u8], proc: &Proc) -> FsResult<usize> {
        let mut inner = self.inner.lock().unwrap();
        while inner.nread == inner.nwrite && inner.writeopen {
            if proc.killed() {
                return Err(FsError::Interrupted);
            }
            inner = self.has_data.sleep(inner);
        }

        let mut n = 0;
        while n < dst.len() && inner.nread != inner.nwrite {
            dst[n] = inner.data[inner.nread as usize % PIPESIZE];
            inner.nread = inner.nread.wrapping_add(1);
            n += 1;
        }
        self.has_space.wakeup();
        Ok(n)
    }

    /// Closes one end of the pipe. Returns `true` once both ends have
    /// closed, meaning the pipe itself can be dropped.
    pub fn close(&self, writable: bool) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if writable {
            inner.writeopen = false;
            self.has_data.wakeup();
        } else {
            inner.readopen = false;
            self.has_space.wakeup();
        }
        !inner.readopen && !inner.writeopen
    }
}

impl Default for Pipe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn read_after_write_preserves_order() {
        let pipe = Arc::new(Pipe::new());
        let proc = Proc::new();
        pipe.write(b"hello", &proc).unwrap();
        let mut buf = [0u8; 5];
        let n = pipe.read(&mut buf, &proc).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn read_blocks_until_writer_produces_data() {
        let pipe = Arc::new(Pipe::new());
        let writer_pipe = Arc::clone(&pipe);
        let writer = thread::spawn(move || {
            let proc = Proc::new();
            thread::sleep(std::time::Duration::from_millis(20));
            writer_pipe.write(b"x", &proc).unwrap();
        });

        let proc = Proc::new();
        let mut buf = [0u8; 1];
        let n = pipe.read(&mut buf, &proc).unwrap();
        assert_eq!(n, 1);
        assert_eq!(buf[0], b'x');
        writer.join().unwrap();
    }

    #[test]
    fn read_returns_eof_once_writer_closes() {
        let pipe = Pipe::new();
        let proc = Proc::new();
        assert!(pipe.close(true));
        let mut buf = [0u8; 4];
        let n = pipe.read(&mut buf, &proc).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn write_still_succeeds_after_reader_closes_while_space_remains() {
        let pipe = Pipe::new();
        let proc = Proc::new();
        pipe.close(false);
        // The read end closing doesn't fail a write that the ring buffer
        // still has room for; only a write that would have to block does.
        assert_eq!(pipe.write(b"x", &proc), Ok(1));
    }

    #[test]
    fn write_fails_once_reader_closes_and_the_pipe_is_full() {
        let pipe = Pipe::new();
        let proc = Proc::new();
        pipe.write(&[0u8; PIPESIZE], &proc).unwrap();
        pipe.close(false);
        assert_eq!(pipe.write(b"x", &proc), Err(FsError::ClosedPipe));
    }

    #[test]
    fn close_reports_when_both_ends_done() {
        let pipe = Pipe::new();
        assert!(!pipe.close(true));
        assert!(pipe.close(false));
    }
}
