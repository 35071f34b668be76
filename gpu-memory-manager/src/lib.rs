pub mod error;
pub mod host;
pub mod ipc_mapping;
pub mod shared_memory;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use error::MemoryError;
pub use host::{DeviceStats, HostDeviceIpc, HostSharedMemory, ShmStats};
pub use ipc_mapping::{open_device_array, DeviceArray, DeviceIpc, DeviceMapping, IPC_HANDLE_SIZE};
pub use shared_memory::{load_schema_bytes, Segment, SharedMemory, ShmGuard, ShmHandle};

#[cfg(unix)]
pub use shared_memory::SysVSharedMemory;

#[cfg(feature = "cuda")]
pub use cuda::CudaIpc;
