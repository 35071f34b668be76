use gpu_memory_manager::ShmHandle;

/// Opaque references carried by a GPU-delivered query result.
///
/// Single use: every handle is tied to one allocation on the producing side,
/// so the bundle is consumed by materialization and then kept only as
/// provenance on the resulting frame.
#[derive(Debug, PartialEq, Eq)]
pub struct HandleBundle {
    /// Device IPC memory handle of the result buffer.
    pub device_handle: Vec<u8>,
    /// Shared-memory segment holding the schema stream.
    pub shm_handle: ShmHandle,
    /// Bytes of the schema stream in the segment.
    pub shm_size: usize,
}

impl HandleBundle {
    pub fn new(device_handle: impl Into<Vec<u8>>, shm_handle: ShmHandle, shm_size: usize) -> Self {
        Self { device_handle: device_handle.into(), shm_handle, shm_size }
    }
}
