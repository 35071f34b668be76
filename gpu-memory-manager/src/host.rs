//! In-process stand-ins for the shared-memory and device IPC primitives.
//!
//! Both keep counters so attach/detach and open/synchronize activity can be
//! observed, which is what tests and CPU-only demos need.

use std::sync::atomic::{AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::MemoryError;
use crate::ipc_mapping::{DeviceIpc, DeviceMapping, IPC_HANDLE_SIZE};
use crate::shared_memory::{Segment, SharedMemory, ShmHandle};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShmStats {
    pub attaches: usize,
    pub detaches: usize,
}

/// Shared-memory segments held in process memory.
#[derive(Debug, Default)]
pub struct HostSharedMemory {
    segments: DashMap<ShmHandle, Arc<[u8]>>,
    attached: DashMap<usize, ShmHandle>,
    next_id: AtomicI32,
    next_token: AtomicUsize,
    stats: Mutex<ShmStats>,
}

impl HostSharedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `bytes` as a new segment.
    pub fn create(&self, bytes: impl Into<Vec<u8>>) -> ShmHandle {
        let bytes: Vec<u8> = bytes.into();
        let handle = ShmHandle(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.segments.insert(handle, Arc::from(bytes));
        handle
    }

    /// Remove a segment; later attaches fail. Existing attachments stay valid.
    pub fn remove(&self, handle: ShmHandle) -> bool {
        self.segments.remove(&handle).is_some()
    }

    pub fn live_attachments(&self) -> usize {
        self.attached.len()
    }

    pub fn stats(&self) -> ShmStats {
        *self.stats.lock()
    }
}

impl SharedMemory for HostSharedMemory {
    fn attach(&self, handle: ShmHandle) -> Result<Segment, MemoryError> {
        if !self.segments.contains_key(&handle) {
            return Err(MemoryError::AttachFailure {
                handle,
                reason: "no such segment".into(),
            });
        }
        let token = self.next_token.fetch_add(1, Ordering::Relaxed) + 1;
        self.attached.insert(token, handle);
        self.stats.lock().attaches += 1;
        Ok(Segment::new(handle, token))
    }

    fn copy_out(&self, segment: &Segment, size: usize) -> Result<Vec<u8>, MemoryError> {
        let bytes = self
            .segments
            .get(&segment.handle())
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| MemoryError::AttachFailure {
                handle: segment.handle(),
                reason: "segment removed while attached".into(),
            })?;
        bytes
            .get(..size)
            .map(<[u8]>::to_vec)
            .ok_or(MemoryError::OutOfBounds { offset: 0, len: size, size: bytes.len() })
    }

    fn detach(&self, segment: Segment) -> Result<(), MemoryError> {
        if self.attached.remove(&segment.token()).is_none() {
            return Err(MemoryError::DetachFailure {
                handle: segment.handle(),
                reason: "not attached".into(),
            });
        }
        self.stats.lock().detaches += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub opens: usize,
    pub synchronizes: usize,
}

#[derive(Debug)]
struct HostAllocation {
    bytes: Vec<u8>,
    base: u64,
}

/// Device allocations emulated in host memory, addressed by exported IPC
/// handles.
#[derive(Debug, Default)]
pub struct HostDeviceIpc {
    allocations: DashMap<Vec<u8>, Arc<HostAllocation>>,
    next_id: AtomicU64,
    stats: Arc<Mutex<DeviceStats>>,
}

impl HostDeviceIpc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` as a device allocation and return its IPC handle.
    pub fn export(&self, bytes: impl Into<Vec<u8>>) -> Vec<u8> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut handle = vec![0u8; IPC_HANDLE_SIZE];
        handle[..8].copy_from_slice(&id.to_le_bytes());
        let allocation = HostAllocation { bytes: bytes.into(), base: id << 32 };
        self.allocations.insert(handle.clone(), Arc::new(allocation));
        handle
    }

    /// Release an allocation on the producer side; its handle goes stale.
    pub fn revoke(&self, handle: &[u8]) -> bool {
        self.allocations.remove(handle).is_some()
    }

    pub fn stats(&self) -> DeviceStats {
        *self.stats.lock()
    }
}

impl DeviceIpc for HostDeviceIpc {
    fn open_ipc_handle(&self, handle: &[u8]) -> Result<Arc<dyn DeviceMapping>, MemoryError> {
        if handle.len() != IPC_HANDLE_SIZE {
            return Err(MemoryError::IpcOpenFailure(format!(
                "handle is {} bytes, expected {}",
                handle.len(),
                IPC_HANDLE_SIZE
            )));
        }
        let allocation = self
            .allocations
            .get(handle)
            .map(|a| Arc::clone(a.value()))
            .ok_or_else(|| {
                MemoryError::IpcOpenFailure("handle is stale or was never exported".into())
            })?;
        self.stats.lock().opens += 1;
        debug!("Opened host allocation at {:#x}", allocation.base);
        Ok(Arc::new(HostMapping { allocation, stats: Arc::clone(&self.stats) }))
    }
}

#[derive(Debug)]
struct HostMapping {
    allocation: Arc<HostAllocation>,
    stats: Arc<Mutex<DeviceStats>>,
}

impl DeviceMapping for HostMapping {
    fn size(&self) -> usize {
        self.allocation.bytes.len()
    }

    fn device_ptr(&self) -> u64 {
        self.allocation.base
    }

    fn synchronize(&self) -> Result<(), MemoryError> {
        self.stats.lock().synchronizes += 1;
        Ok(())
    }

    fn copy_to_host(&self, offset: usize, len: usize) -> Result<Vec<u8>, MemoryError> {
        self.allocation
            .bytes
            .get(offset..offset.saturating_add(len))
            .map(<[u8]>::to_vec)
            .ok_or(MemoryError::OutOfBounds { offset, len, size: self.size() })
    }
}
