//! Shared-memory segments carrying the result schema.
//!
//! A segment is attached only long enough to copy its bytes out. Detachment
//! is tied to [`ShmGuard`], so it happens exactly once on every exit path.

use std::fmt;

use tracing::{debug, warn};

use crate::error::MemoryError;

/// Identifier of a shared-memory segment, as issued by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShmHandle(pub i32);

impl fmt::Display for ShmHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shm#{}", self.0)
    }
}

/// A live attachment. `token` is whatever the backend needs to detach it
/// again (the mapped address for System V segments).
#[derive(Debug, PartialEq, Eq)]
pub struct Segment {
    handle: ShmHandle,
    token: usize,
}

impl Segment {
    pub fn new(handle: ShmHandle, token: usize) -> Self {
        Self { handle, token }
    }

    pub fn handle(&self) -> ShmHandle {
        self.handle
    }

    pub fn token(&self) -> usize {
        self.token
    }
}

/// Attach/detach primitive for shared-memory segments.
pub trait SharedMemory: Send + Sync {
    fn attach(&self, handle: ShmHandle) -> Result<Segment, MemoryError>;

    /// Copy `size` bytes from the start of an attached segment.
    fn copy_out(&self, segment: &Segment, size: usize) -> Result<Vec<u8>, MemoryError>;

    fn detach(&self, segment: Segment) -> Result<(), MemoryError>;
}

/// Scoped attachment; detaches on [`release`](ShmGuard::release) or drop.
pub struct ShmGuard<'a> {
    shm: &'a dyn SharedMemory,
    handle: ShmHandle,
    segment: Option<Segment>,
}

impl<'a> ShmGuard<'a> {
    pub fn attach(shm: &'a dyn SharedMemory, handle: ShmHandle) -> Result<Self, MemoryError> {
        let segment = shm.attach(handle)?;
        debug!("Attached {} (token {:#x})", handle, segment.token());
        Ok(Self { shm, handle, segment: Some(segment) })
    }

    pub fn handle(&self) -> ShmHandle {
        self.handle
    }

    pub fn copy_out(&self, size: usize) -> Result<Vec<u8>, MemoryError> {
        let segment = self.segment.as_ref().ok_or_else(|| MemoryError::AttachFailure {
            handle: self.handle,
            reason: "segment already detached".into(),
        })?;
        self.shm.copy_out(segment, size)
    }

    /// Detach now and report failure instead of logging it.
    pub fn release(mut self) -> Result<(), MemoryError> {
        match self.segment.take() {
            Some(segment) => self.detach(segment),
            None => Ok(()),
        }
    }

    fn detach(&self, segment: Segment) -> Result<(), MemoryError> {
        let handle = segment.handle();
        self.shm.detach(segment)?;
        debug!("Detached {}", handle);
        Ok(())
    }
}

impl Drop for ShmGuard<'_> {
    fn drop(&mut self) {
        if let Some(segment) = self.segment.take() {
            if let Err(e) = self.detach(segment) {
                warn!("{}", e);
            }
        }
    }
}

/// Attach `handle`, copy `size` bytes into a local buffer and hand back the
/// buffer together with the guard that will detach the segment.
pub fn load_schema_bytes(
    shm: &dyn SharedMemory,
    handle: ShmHandle,
    size: usize,
) -> Result<(Vec<u8>, ShmGuard<'_>), MemoryError> {
    let guard = ShmGuard::attach(shm, handle)?;
    let bytes = guard.copy_out(size)?;
    debug!("Copied {} schema bytes out of {}", bytes.len(), handle);
    Ok((bytes, guard))
}

/// System V shared memory, as used by the server to publish result schemas.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SysVSharedMemory;

#[cfg(unix)]
impl SysVSharedMemory {
    fn segment_size(handle: ShmHandle) -> Result<usize, MemoryError> {
        // SAFETY: shmid_ds is plain old data and IPC_STAT only writes into it.
        let mut ds: libc::shmid_ds = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::shmctl(handle.0, libc::IPC_STAT, &mut ds) };
        if rc == -1 {
            return Err(MemoryError::AttachFailure {
                handle,
                reason: std::io::Error::last_os_error().to_string(),
            });
        }
        Ok(ds.shm_segsz as usize)
    }
}

#[cfg(unix)]
impl SharedMemory for SysVSharedMemory {
    fn attach(&self, handle: ShmHandle) -> Result<Segment, MemoryError> {
        // SAFETY: shmat validates the id itself and signals failure with (void*)-1.
        let addr = unsafe { libc::shmat(handle.0, std::ptr::null(), libc::SHM_RDONLY) };
        if addr as isize == -1 {
            return Err(MemoryError::AttachFailure {
                handle,
                reason: std::io::Error::last_os_error().to_string(),
            });
        }
        Ok(Segment::new(handle, addr as usize))
    }

    fn copy_out(&self, segment: &Segment, size: usize) -> Result<Vec<u8>, MemoryError> {
        let available = Self::segment_size(segment.handle())?;
        if size > available {
            return Err(MemoryError::OutOfBounds { offset: 0, len: size, size: available });
        }
        // SAFETY: the segment stays attached for the borrow of `segment` and is
        // at least `size` bytes long.
        let bytes = unsafe { std::slice::from_raw_parts(segment.token() as *const u8, size) };
        Ok(bytes.to_vec())
    }

    fn detach(&self, segment: Segment) -> Result<(), MemoryError> {
        // SAFETY: the token is the address returned by shmat for this segment,
        // and Segment is consumed so it cannot be detached twice.
        let rc = unsafe { libc::shmdt(segment.token() as *const libc::c_void) };
        if rc == -1 {
            return Err(MemoryError::DetachFailure {
                handle: segment.handle(),
                reason: std::io::Error::last_os_error().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostSharedMemory;

    #[test]
    fn load_copies_requested_prefix() {
        let shm = HostSharedMemory::new();
        let handle = shm.create(vec![1u8, 2, 3, 4, 5]);
        let (bytes, guard) = load_schema_bytes(&shm, handle, 3).unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert_eq!(shm.live_attachments(), 1);
        guard.release().unwrap();
        assert_eq!(shm.live_attachments(), 0);
    }

    #[test]
    fn guard_detaches_on_drop() {
        let shm = HostSharedMemory::new();
        let handle = shm.create(vec![0u8; 8]);
        {
            let _guard = ShmGuard::attach(&shm, handle).unwrap();
            assert_eq!(shm.live_attachments(), 1);
        }
        let stats = shm.stats();
        assert_eq!((stats.attaches, stats.detaches), (1, 1));
    }

    #[test]
    fn oversized_copy_still_detaches() {
        let shm = HostSharedMemory::new();
        let handle = shm.create(vec![0u8; 4]);
        let err = load_schema_bytes(&shm, handle, 16).err().unwrap();
        assert!(matches!(err, MemoryError::OutOfBounds { .. }));
        assert_eq!(shm.live_attachments(), 0);
        assert_eq!(shm.stats().detaches, 1);
    }

    #[test]
    fn removed_segment_fails_to_attach() {
        let shm = HostSharedMemory::new();
        let handle = shm.create(vec![0u8; 4]);
        assert!(shm.remove(handle));
        let err = load_schema_bytes(&shm, handle, 4).err().unwrap();
        assert!(matches!(err, MemoryError::AttachFailure { .. }));
        assert_eq!(shm.stats().detaches, 0);
    }

    #[cfg(unix)]
    #[test]
    fn sysv_invalid_id_is_attach_failure() {
        let err = SysVSharedMemory.attach(ShmHandle(-1)).unwrap_err();
        assert!(matches!(err, MemoryError::AttachFailure { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn sysv_round_trip() {
        let payload = b"schema bytes";
        // SAFETY: a private segment created and removed within this test.
        let id = unsafe { libc::shmget(libc::IPC_PRIVATE, 64, libc::IPC_CREAT | 0o600) };
        if id == -1 {
            // System V IPC is unavailable in this environment.
            return;
        }
        unsafe {
            let addr = libc::shmat(id, std::ptr::null(), 0);
            assert_ne!(addr as isize, -1);
            std::ptr::copy_nonoverlapping(payload.as_ptr(), addr as *mut u8, payload.len());
            libc::shmdt(addr);
        }

        let shm = SysVSharedMemory;
        let result = load_schema_bytes(&shm, ShmHandle(id), payload.len())
            .and_then(|(bytes, guard)| guard.release().map(|_| bytes));

        unsafe {
            libc::shmctl(id, libc::IPC_RMID, std::ptr::null_mut());
        }
        assert_eq!(result.unwrap(), payload.to_vec());
    }
}
