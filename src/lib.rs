//! Client-side materialization of GPU IPC query results.
//!
//! Re-exports the workspace crates under one roof:
//!
//! * [`arrow_interop`]: schema and dictionary recovery, device column layout,
//!   null sentinels, temporal codecs and row-wise decoding;
//! * [`gpu_memory_manager`]: shared-memory segments and device IPC mappings;
//! * [`gpu_materialize`]: the materialization pipeline and result frame.

pub use arrow_interop;
pub use gpu_materialize;
pub use gpu_memory_manager;

pub use gpu_materialize::{
    DictionaryFallback, GpuDataFrame, HandleBundle, MaterializeConfig, MaterializeError,
    MaterializedColumn, Materializer,
};
