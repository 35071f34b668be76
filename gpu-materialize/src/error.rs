use arrow_interop::InteropError;
use gpu_memory_manager::MemoryError;
use thiserror::Error;

pub type Result<T, E = MaterializeError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Interop(#[from] InteropError),

    /// Raised only when the dictionary fallback policy is `Error`.
    #[error("dictionary recovery failed: {0}")]
    DictionaryRecovery(String),

    #[error("shared memory size {size} exceeds the limit of {limit} bytes")]
    SchemaTooLarge { size: usize, limit: usize },

    #[error("column '{0}' not found")]
    ColumnNotFound(String),

    #[error("materialization task failed: {0}")]
    Task(String),
}

impl MaterializeError {
    pub fn is_attach_failure(&self) -> bool {
        matches!(self, Self::Memory(MemoryError::AttachFailure { .. }))
    }

    pub fn is_ipc_open_failure(&self) -> bool {
        matches!(self, Self::Memory(MemoryError::IpcOpenFailure(_)))
    }
}
