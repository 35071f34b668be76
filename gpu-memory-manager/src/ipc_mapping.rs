//! Device memory reached through IPC handles.
//!
//! The producing process exports an allocation as an opaque handle; opening it
//! here maps the same device memory into this process without a copy. The
//! allocation stays owned by the producer.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::MemoryError;

/// Size in bytes of a device IPC memory handle.
pub const IPC_HANDLE_SIZE: usize = 64;

/// Opens device IPC memory handles.
pub trait DeviceIpc: Send + Sync {
    fn open_ipc_handle(&self, handle: &[u8]) -> Result<Arc<dyn DeviceMapping>, MemoryError>;
}

/// A device region mapped into this process.
pub trait DeviceMapping: Send + Sync + fmt::Debug {
    fn size(&self) -> usize;

    fn device_ptr(&self) -> u64;

    /// Block until outstanding device work on this mapping has completed.
    /// There is no way to cancel the wait.
    fn synchronize(&self) -> Result<(), MemoryError>;

    fn copy_to_host(&self, offset: usize, len: usize) -> Result<Vec<u8>, MemoryError>;
}

/// One-dimensional, byte-addressable view over a whole mapping.
#[derive(Debug, Clone)]
pub struct DeviceArray {
    mapping: Arc<dyn DeviceMapping>,
    len: usize,
}

impl DeviceArray {
    pub fn new(mapping: Arc<dyn DeviceMapping>) -> Self {
        let len = mapping.size();
        Self { mapping, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Element stride in bytes; always 1 for a byte array.
    pub fn stride(&self) -> usize {
        1
    }

    pub fn device_ptr(&self) -> u64 {
        self.mapping.device_ptr()
    }

    pub fn mapping(&self) -> &Arc<dyn DeviceMapping> {
        &self.mapping
    }

    /// Copy `len` bytes starting at `offset` to the host.
    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, MemoryError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => self.mapping.copy_to_host(offset, len),
            _ => Err(MemoryError::OutOfBounds { offset, len, size: self.len }),
        }
    }
}

/// Open `handle`, wait for the device to finish producing it and wrap the
/// mapping as a byte array.
pub fn open_device_array(ipc: &dyn DeviceIpc, handle: &[u8]) -> Result<DeviceArray, MemoryError> {
    let mapping = ipc.open_ipc_handle(handle)?;
    debug!("Mapped {} device bytes at {:#x}", mapping.size(), mapping.device_ptr());

    mapping.synchronize()?;
    let array = DeviceArray::new(mapping);
    info!("Device buffer ready: {} bytes", array.len());
    Ok(array)
}
