//! OS bindings: SysV shared memory and process signals.
//!
//! This is the only module in the workspace that contains `unsafe` code.

#![allow(unsafe_code)]

use std::io;
use std::ptr;

use tracing::{debug, error};

use crate::error::{CoverageError, Result};

/// An attached SysV shared-memory segment.
///
/// The creating side owns the segment and removes it on [`release`]; a side
/// that only attaches by id detaches but leaves the segment alive.
///
/// [`release`]: SharedSegment::release
#[derive(Debug)]
pub struct SharedSegment {
    id: libc::c_int,
    ptr: *mut u8,
    len: usize,
    owner: bool,
    released: bool,
}

// SAFETY: the mapping is process-wide and not tied to the creating thread.
// All access goes through `&self`/`&mut self`, so Rust's aliasing rules hold
// for the local side.
unsafe impl Send for SharedSegment {}

impl SharedSegment {
    /// Allocates a private segment of `len` bytes, attaches it and zeroes it.
    ///
    /// On any failure after allocation the segment is removed again.
    pub fn create(len: usize) -> Result<Self> {
        if len == 0 {
            return Err(CoverageError::InvalidMapSize(len));
        }

        // SAFETY: plain syscall, no pointers involved.
        let id = unsafe { libc::shmget(libc::IPC_PRIVATE, len, libc::IPC_CREAT | 0o600) };
        if id < 0 {
            return Err(CoverageError::SharedMemory {
                op: "shmget",
                source: io::Error::last_os_error(),
            });
        }

        match Self::attach_raw(id, len, true) {
            Ok(segment) => {
                segment.zero();
                debug!(shm_id = id, len, "created shared segment");
                Ok(segment)
            }
            Err(e) => {
                remove(id);
                Err(e)
            }
        }
    }

    /// Attaches to an existing segment by id without taking ownership.
    pub fn attach(id: i32, len: usize) -> Result<Self> {
        if len == 0 {
            return Err(CoverageError::InvalidMapSize(len));
        }
        Self::attach_raw(id, len, false)
    }

    fn attach_raw(id: libc::c_int, len: usize, owner: bool) -> Result<Self> {
        // SAFETY: a null address lets the kernel choose the mapping.
        let addr = unsafe { libc::shmat(id, ptr::null(), 0) };
        if addr as isize == -1 {
            return Err(CoverageError::SharedMemory {
                op: "shmat",
                source: io::Error::last_os_error(),
            });
        }
        Ok(Self {
            id,
            ptr: addr.cast::<u8>(),
            len,
            owner,
            released: false,
        })
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copies the live segment into `buf` (truncated to the shorter length).
    ///
    /// The target keeps writing while we read; each counter is a single
    /// byte, so a value is never torn.
    pub fn read_into(&self, buf: &mut [u8]) {
        if self.released {
            return;
        }
        let n = buf.len().min(self.len);
        // SAFETY: `ptr` is valid for `len` bytes while attached and `buf` is
        // a distinct local allocation.
        unsafe { ptr::copy_nonoverlapping(self.ptr, buf.as_mut_ptr(), n) };
    }

    pub fn zero(&self) {
        if self.released {
            return;
        }
        // SAFETY: `ptr` is valid for `len` bytes while attached.
        unsafe { ptr::write_bytes(self.ptr, 0, self.len) };
    }

    /// Writes one counter, as the instrumented target would.
    pub fn write_byte(&self, index: usize, value: u8) -> Result<()> {
        if index >= self.len || self.released {
            return Err(CoverageError::EdgeOutOfRange {
                index,
                len: self.len,
            });
        }
        // SAFETY: bounds checked above.
        unsafe { self.ptr.add(index).write_volatile(value) };
        Ok(())
    }

    /// Detaches, and removes the segment when we own it. Idempotent.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        // SAFETY: `ptr` came from a successful `shmat` and is detached once.
        let rc = unsafe { libc::shmdt(self.ptr.cast::<libc::c_void>()) };
        let detach = if rc == 0 {
            Ok(())
        } else {
            Err(CoverageError::SharedMemory {
                op: "shmdt",
                source: io::Error::last_os_error(),
            })
        };

        if self.owner {
            remove(self.id);
            debug!(shm_id = self.id, "removed shared segment");
        }
        detach
    }
}

impl Drop for SharedSegment {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            error!(shm_id = self.id, error = %e, "failed to release shared segment");
        }
    }
}

fn remove(id: libc::c_int) {
    // SAFETY: IPC_RMID ignores the buffer argument.
    let rc = unsafe { libc::shmctl(id, libc::IPC_RMID, ptr::null_mut()) };
    if rc != 0 {
        error!(
            shm_id = id,
            error = %io::Error::last_os_error(),
            "shmctl(IPC_RMID) failed"
        );
    }
}

/// Sends SIGTERM to `pid`.
pub(crate) fn send_sigterm(pid: u32) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: plain syscall on a pid we spawned.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_zeroes_segment() {
        let segment = SharedSegment::create(4096).unwrap();
        let mut buf = vec![0xAA; 4096];
        segment.read_into(&mut buf);
        assert!(buf.iter().all(|b| *b == 0));
    }

    #[test]
    fn zero_size_is_rejected() {
        assert!(matches!(
            SharedSegment::create(0),
            Err(CoverageError::InvalidMapSize(0))
        ));
    }

    #[test]
    fn second_attachment_sees_writes() {
        let owner = SharedSegment::create(128).unwrap();
        let writer = SharedSegment::attach(owner.id(), owner.len()).unwrap();
        writer.write_byte(7, 3).unwrap();

        let mut buf = vec![0; 128];
        owner.read_into(&mut buf);
        assert_eq!(buf[7], 3);
        assert!(writer.write_byte(128, 1).is_err());
    }

    #[test]
    fn release_is_idempotent() {
        let mut segment = SharedSegment::create(64).unwrap();
        segment.release().unwrap();
        segment.release().unwrap();
        assert!(segment.write_byte(0, 1).is_err());
    }
}
