use thiserror::Error;

use crate::shared_memory::ShmHandle;

#[derive(Debug, Error)]
pub enum MemoryError {
    /// The segment does not exist, was already removed, or may not be attached.
    #[error("failed to attach shared memory segment {handle}: {reason}")]
    AttachFailure { handle: ShmHandle, reason: String },

    #[error("failed to detach shared memory segment {handle}: {reason}")]
    DetachFailure { handle: ShmHandle, reason: String },

    /// The device handle is stale, foreign, malformed or already closed.
    #[error("failed to open device IPC handle: {0}")]
    IpcOpenFailure(String),

    #[error("read of {len} bytes at offset {offset} exceeds region of {size} bytes")]
    OutOfBounds { offset: usize, len: usize, size: usize },

    #[error("device error: {0}")]
    Device(String),
}
