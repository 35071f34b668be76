//! CUDA driver backend for device IPC handles.

use std::sync::Arc;

use cudarc::driver::{result, sys, CudaDevice};
use tracing::{debug, info, warn};

use crate::error::MemoryError;
use crate::ipc_mapping::{DeviceIpc, DeviceMapping, IPC_HANDLE_SIZE};

fn device_error(e: impl std::fmt::Display) -> MemoryError {
    MemoryError::Device(e.to_string())
}

pub struct CudaIpc {
    device: Arc<CudaDevice>,
}

impl CudaIpc {
    pub fn new(ordinal: usize) -> Result<Self, MemoryError> {
        let device = CudaDevice::new(ordinal).map_err(device_error)?;
        info!("Opened CUDA device {} for IPC", ordinal);
        Ok(Self { device })
    }
}

impl DeviceIpc for CudaIpc {
    fn open_ipc_handle(&self, handle: &[u8]) -> Result<Arc<dyn DeviceMapping>, MemoryError> {
        if handle.len() != IPC_HANDLE_SIZE {
            return Err(MemoryError::IpcOpenFailure(format!(
                "handle is {} bytes, expected {}",
                handle.len(),
                IPC_HANDLE_SIZE
            )));
        }
        self.device.bind_to_thread().map_err(device_error)?;

        let mut raw = sys::CUipcMemHandle { reserved: [0; IPC_HANDLE_SIZE] };
        for (dst, src) in raw.reserved.iter_mut().zip(handle) {
            *dst = *src as _;
        }

        let mut dptr: sys::CUdeviceptr = 0;
        // SAFETY: the device context is current on this thread and `raw` is a
        // full-size handle.
        unsafe {
            sys::lib()
                .cuIpcOpenMemHandle_v2(
                    &mut dptr,
                    raw,
                    sys::CUipcMem_flags::CU_IPC_MEM_LAZY_ENABLE_PEER_ACCESS as u32,
                )
                .result()
        }
        .map_err(|e| MemoryError::IpcOpenFailure(e.to_string()))?;

        let mut base: sys::CUdeviceptr = 0;
        let mut size = 0usize;
        // SAFETY: `dptr` was just mapped by cuIpcOpenMemHandle.
        unsafe { sys::lib().cuMemGetAddressRange_v2(&mut base, &mut size, dptr).result() }
            .map_err(device_error)?;
        let size = size - (dptr - base) as usize;

        debug!("Opened IPC allocation at {:#x} ({} bytes)", dptr, size);
        Ok(Arc::new(CudaMapping { device: Arc::clone(&self.device), dptr, size }))
    }
}

#[derive(Debug)]
struct CudaMapping {
    device: Arc<CudaDevice>,
    dptr: sys::CUdeviceptr,
    size: usize,
}

impl DeviceMapping for CudaMapping {
    fn size(&self) -> usize {
        self.size
    }

    fn device_ptr(&self) -> u64 {
        self.dptr
    }

    fn synchronize(&self) -> Result<(), MemoryError> {
        self.device.synchronize().map_err(device_error)
    }

    fn copy_to_host(&self, offset: usize, len: usize) -> Result<Vec<u8>, MemoryError> {
        if offset.saturating_add(len) > self.size {
            return Err(MemoryError::OutOfBounds { offset, len, size: self.size });
        }
        self.device.bind_to_thread().map_err(device_error)?;
        let mut host = vec![0u8; len];
        // SAFETY: the range was bounds-checked against the mapped allocation.
        unsafe { result::memcpy_dtoh_sync(&mut host, self.dptr + offset as u64) }
            .map_err(device_error)?;
        Ok(host)
    }
}

impl Drop for CudaMapping {
    fn drop(&mut self) {
        // Unmaps only; the allocation itself belongs to the producer.
        let closed = self
            .device
            .bind_to_thread()
            .map_err(device_error)
            .and_then(|_| unsafe { sys::lib().cuIpcCloseMemHandle(self.dptr).result() }.map_err(device_error));
        if let Err(e) = closed {
            warn!("Failed to close IPC mapping at {:#x}: {}", self.dptr, e);
        }
    }
}
